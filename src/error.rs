//! Error types for the framing layer, the client session, and the server session.
//!
//! Each Session-facing API in [`crate::client`] and [`crate::server`] fails with one
//! of these enums rather than a generic `anyhow::Error`; `anyhow` is still pulled in
//! by the demo binary, where an ad-hoc error chain is the right shape.

use std::net::SocketAddr;

/// Errors that can occur while building or reading a [`crate::message::Message`].
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// `append()`/`push()` would grow the payload past `u16::MAX` bytes.
    #[error("payload would exceed {limit} bytes (have {have}, adding {adding})")]
    PayloadTooLarge {
        have: usize,
        adding: usize,
        limit: usize,
    },

    /// `read()`/`pop()` asked for more bytes than remain before the cursor.
    #[error("attempted to read {requested} bytes, only {available} available")]
    ShortRead { requested: usize, available: usize },
}

/// Errors surfaced by [`crate::client::Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `host:port` could not be resolved by the platform resolver.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The async connect attempt failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A read or write on the established connection failed.
    #[error("I/O error on connection: {0}")]
    Io(#[source] std::io::Error),
}

/// Errors surfaced by [`crate::server::Server`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Bind/listen on the requested port failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A read or write on some client connection failed.
    ///
    /// The core never latches this kind onto the server (per-connection I/O
    /// errors are handled through disconnection reconciliation); it exists so
    /// internal plumbing has a single error type to move around.
    #[error("I/O error on connection: {0}")]
    Io(#[source] std::io::Error),
}
