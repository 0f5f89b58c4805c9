//! # rain-net
//!
//! A length-prefixed, asynchronous TCP message framework: a [`client::Client`]
//! that connects to a single server, and a [`server::Server`] that accepts
//! many concurrent clients. Both sides exchange discrete, typed binary
//! [`message::Message`]s over a reliable byte stream; message payload
//! serialization policy, host-name resolution, and application message
//! semantics are left to the caller.
//!
//! The crate carries no authentication, encryption, compression, channel
//! multiplexing, automatic reconnection, or flow control beyond what TCP
//! already provides, and no state persists between runs.
//!
//! A dedicated I/O worker thread per [`client::Client`]/[`server::Server`]
//! drives all asynchronous completions; application threads only ever touch
//! thread-safe queues or post tasks onto that worker, so the public API never
//! blocks on I/O.

pub mod client;
pub mod connection;
pub mod error;
pub mod logging;
pub mod message;
pub mod pool;
pub mod queue;
pub mod server;
mod worker;

pub use client::Client;
pub use connection::ConnectionOptions;
pub use error::{ClientError, MessageError, ServerError};
pub use message::{Message, MessageReader};
pub use pool::ClientId;
pub use queue::SyncQueue;
pub use server::{ClientConnection, Server};

/// The current version of the crate, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
