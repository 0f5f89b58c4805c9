//! Scenario 2 (spec §8): three clients connect; the server broadcasts to all
//! but one excluded client. The excluded client must receive nothing.

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
fn broadcast_skips_excluded_client() {
    let mut server = Server::new();
    server.start(17002, 8).unwrap();

    let mut a = Client::new();
    let mut b = Client::new();
    let mut c = Client::new();
    a.connect("127.0.0.1", 17002).unwrap();
    b.connect("127.0.0.1", 17002).unwrap();
    c.connect("127.0.0.1", 17002).unwrap();

    assert!(wait_until(
        || a.connection_established().unwrap()
            && b.connection_established().unwrap()
            && c.connection_established().unwrap(),
        Duration::from_secs(2)
    ));

    // Identify each client's connection by having it send one tagged ping
    // first, then reading the registry through the (message, conn) pairs
    // that produces.
    a.send_message(&Message::new(100));
    b.send_message(&Message::new(101));
    c.send_message(&Message::new(102));

    let mut by_id = std::collections::HashMap::new();
    assert!(wait_until(
        || {
            server.accept_connections().unwrap();
            while let Some((msg, conn)) = server.next_message().unwrap() {
                by_id.insert(msg.id(), conn);
            }
            by_id.len() == 3
        },
        Duration::from_secs(2)
    ));

    let b_conn = by_id.get(&101).unwrap().clone();

    let mut broadcast = Message::new(7);
    broadcast.append(&[0xDE, 0xAD]).unwrap();
    server.send_message_broadcast(&broadcast, Some(&b_conn));

    assert!(wait_until(|| a.available_messages(), Duration::from_secs(1)));
    assert!(wait_until(|| c.available_messages(), Duration::from_secs(1)));

    let a_msg = a.next_message().unwrap().unwrap();
    assert_eq!(a_msg.id(), 7);
    assert_eq!(a_msg.payload(), &[0xDE, 0xAD]);

    let c_msg = c.next_message().unwrap().unwrap();
    assert_eq!(c_msg.id(), 7);
    assert_eq!(c_msg.payload(), &[0xDE, 0xAD]);

    // B must receive nothing within a generous window.
    std::thread::sleep(Duration::from_secs(1));
    assert!(!b.available_messages());

    a.disconnect();
    b.disconnect();
    c.disconnect();
    server.stop();
}
