//! Scenario 5 (spec §8): two clients are connected; one disconnects. A
//! subsequent `send_message_broadcast` reconciles the departed client
//! exactly once and the remaining client still receives the broadcast.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rain_net::{Client, Message, Server};

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
fn broadcast_reconciles_a_departed_client_exactly_once() {
    let disconnect_count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disconnect_count);

    let mut server = Server::new();
    server.on_client_disconnected(move |_conn| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    server.start(17005, 8).unwrap();

    let mut staying = Client::new();
    let mut leaving = Client::new();
    staying.connect("127.0.0.1", 17005).unwrap();
    leaving.connect("127.0.0.1", 17005).unwrap();

    assert!(wait_until(
        || {
            server.accept_connections().unwrap();
            staying.connection_established().unwrap() && leaving.connection_established().unwrap()
        },
        Duration::from_secs(2)
    ));

    leaving.disconnect();

    // Give the server's reader task a chance to observe the peer EOF.
    std::thread::sleep(Duration::from_millis(100));

    let mut broadcast = Message::new(42);
    broadcast.append(b"still here").unwrap();
    server.send_message_broadcast(&broadcast, None);

    assert!(wait_until(|| staying.available_messages(), Duration::from_secs(2)));
    let received = staying.next_message().unwrap().unwrap();
    assert_eq!(received.id(), 42);
    assert_eq!(received.payload(), b"still here");

    assert_eq!(disconnect_count.load(Ordering::SeqCst), 1);

    staying.disconnect();
    server.stop();
}
