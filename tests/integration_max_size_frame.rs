//! Scenario 6 (spec §8): a full 65535-byte payload round-trips intact, and
//! appending one more byte past the limit fails at construction time rather
//! than on the wire.

use std::time::{Duration, Instant};

use rain_net::message::MAX_PAYLOAD_SIZE;
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

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[test]
fn appending_past_the_limit_fails_before_touching_the_wire() {
    let mut msg = Message::new(1);
    msg.append(&pattern(MAX_PAYLOAD_SIZE)).unwrap();
    assert!(msg.append(&[0u8]).is_err());
}

#[test]
fn max_size_frame_round_trips_intact() {
    let mut server = Server::new();
    server.start(17006, 4).unwrap();

    let mut client = Client::new();
    client.connect("127.0.0.1", 17006).unwrap();

    assert!(wait_until(
        || client.connection_established().unwrap(),
        Duration::from_secs(2)
    ));

    let payload = pattern(MAX_PAYLOAD_SIZE);
    let mut outbound = Message::new(1);
    outbound.append(&payload).unwrap();
    client.send_message(&outbound);

    assert!(wait_until(
        || {
            server.accept_connections().unwrap();
            server.available_messages()
        },
        Duration::from_secs(5)
    ));

    let (received, _conn) = server.next_message().unwrap().unwrap();
    assert_eq!(received.id(), 1);
    assert_eq!(received.payload(), payload.as_slice());

    client.disconnect();
    server.stop();
}
