//! The client session: one connection to one server, driven by its own I/O worker.
//!
//! Mirrors `original_source/rain_net/client/src/client.cpp` and its
//! `ServerConnection`: [`Client::connect`] resolves synchronously (the
//! original's `resolver.resolve()` call happens on the caller's thread too)
//! and then hands the async connect attempt and the reader/writer tasks off
//! to a dedicated single-threaded Tokio runtime running on its own OS thread,
//! so the application-facing API never blocks on I/O.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};

use crate::connection::{connect_any, spawn_io_tasks, ConnectionOptions, ConnectionShared, IoStage};
use crate::error::ClientError;
use crate::message::Message;
use crate::queue::SyncQueue;
use crate::worker::IoWorker;

/// One outbound connection to a server.
///
/// `Client` is not `Clone`: a single connection is exclusively owned by the
/// session, matching the Connection Engine's ownership rule (§3).
pub struct Client {
    options: ConnectionOptions,
    worker: Option<IoWorker>,
    connection: Option<Arc<ConnectionShared>>,
    incoming: Arc<SyncQueue<Message>>,
    latched_error: Arc<Mutex<Option<ClientError>>>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_options(ConnectionOptions::default())
    }

    pub fn with_options(options: ConnectionOptions) -> Self {
        Self {
            options,
            worker: None,
            connection: None,
            incoming: Arc::new(SyncQueue::new()),
            latched_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Resolve `host:port` and begin connecting.
    ///
    /// Resolution happens synchronously and fails the call directly; the TCP
    /// connect itself is handed to the I/O worker and completes in the
    /// background, so `connect` returning `Ok` does not yet imply
    /// [`Client::connection_established`] is true (§4.D, §8 scenario 3).
    /// A no-op if already connected — call [`Client::disconnect`] first to
    /// reconnect.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let endpoints: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| ClientError::Resolve {
                host: host.to_string(),
                port,
                source,
            })?
            .collect();

        if endpoints.is_empty() {
            return Err(ClientError::Resolve {
                host: host.to_string(),
                port,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "resolver returned no addresses",
                ),
            });
        }

        let worker = IoWorker::spawn("rain-net-client-io");
        let shared = ConnectionShared::new(false);
        self.connection = Some(Arc::clone(&shared));

        let options = self.options;
        let incoming = Arc::clone(&self.incoming);
        let latched_error = Arc::clone(&self.latched_error);
        let first_endpoint = endpoints[0];

        worker.handle.spawn(async move {
            match connect_any(&endpoints, options).await {
                Ok((stream, _addr)) => {
                    shared.set_established();
                    let (read_half, write_half) = stream.into_split();
                    let deliver_incoming = Arc::clone(&incoming);
                    let error_latch = Arc::clone(&latched_error);
                    spawn_io_tasks(
                        read_half,
                        write_half,
                        shared,
                        move |message| deliver_incoming.push_back(message),
                        move |_stage: IoStage, err| {
                            *error_latch.lock().unwrap() = Some(ClientError::Io(err));
                        },
                    );
                }
                Err(err) => {
                    shared.mark_closed();
                    *latched_error.lock().unwrap() = Some(ClientError::Connect {
                        addr: first_endpoint,
                        source: err,
                    });
                }
            }
        });

        self.worker = Some(worker);
        Ok(())
    }

    /// Close the connection, stop the I/O worker, and clear all session state.
    ///
    /// Idempotent, and safe to call on a session that never connected.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.mark_closed();
        }
        self.worker = None; // IoWorker::drop joins the thread.
        self.incoming.clear();
        *self.latched_error.lock().unwrap() = None;
    }

    /// True once the async connect has completed; propagates a latched error first.
    pub fn connection_established(&self) -> Result<bool, ClientError> {
        self.take_latched_error()?;
        Ok(self
            .connection
            .as_ref()
            .map(|conn| conn.established())
            .unwrap_or(false))
    }

    /// Pop the oldest inbound message, or `None` if the queue is empty.
    pub fn next_message(&self) -> Result<Option<Message>, ClientError> {
        self.take_latched_error()?;
        Ok(self.incoming.pop_front())
    }

    pub fn available_messages(&self) -> bool {
        !self.incoming.is_empty()
    }

    /// Enqueue `message` for transmission.
    ///
    /// Silently dropped if the session is not connected, mirroring the
    /// no-raise policy for sends on a closed socket (§4.C edge case).
    pub fn send_message(&self, message: &Message) {
        if let Some(connection) = &self.connection {
            connection.enqueue(message);
        }
    }

    fn take_latched_error(&self) -> Result<(), ClientError> {
        if let Some(err) = self.latched_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn connect_to_unresolvable_host_fails_synchronously() {
        let mut client = Client::new();
        let err = client.connect("this host has spaces", 1).unwrap_err();
        assert!(matches!(err, ClientError::Resolve { .. }));
    }

    #[test]
    fn send_before_connect_is_silently_dropped() {
        let client = Client::new();
        client.send_message(&Message::new(1)); // must not panic
    }

    #[test]
    fn disconnect_before_connect_is_idempotent() {
        let mut client = Client::new();
        client.disconnect();
        client.disconnect();
    }

    #[test]
    fn connect_and_exchange_one_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server_thread = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut header = [0u8; 4];
            stream.read_exact(&mut header).unwrap();
            let id = u16::from_le_bytes([header[0], header[1]]);
            let payload_size = u16::from_le_bytes([header[2], header[3]]) as usize;
            let mut payload = vec![0u8; payload_size];
            stream.read_exact(&mut payload).unwrap();

            // Echo the same frame straight back.
            stream.write_all(&header).unwrap();
            stream.write_all(&payload).unwrap();

            id
        });

        let mut client = Client::new();
        client.connect(&addr.ip().to_string(), addr.port()).unwrap();

        assert!(wait_until(
            || client.connection_established().unwrap(),
            Duration::from_secs(2)
        ));

        let mut outbound = Message::new(3);
        outbound.append(b"ping").unwrap();
        client.send_message(&outbound);

        assert!(wait_until(|| client.available_messages(), Duration::from_secs(2)));
        let reply = client.next_message().unwrap().unwrap();
        assert_eq!(reply.id(), 3);
        assert_eq!(reply.payload(), b"ping");

        assert_eq!(server_thread.join().unwrap(), 3);
        client.disconnect();
    }
}
