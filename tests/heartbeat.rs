//! Heartbeat publishing over the dedicated endpoint.

use std::time::Instant;

use query_gateway::transport::{Endpoint, SubSocket};

mod common;

#[tokio::test]
async fn heartbeat_counter_increases_at_the_configured_interval() {
    // spawn_backend configures a 100 ms heartbeat interval.
    let backend = common::spawn_backend().await;
    let endpoint: Endpoint = backend.heartbeat_endpoint.parse().unwrap();

    let mut subscriber = SubSocket::connect(&endpoint).await.unwrap();

    let first_frame = subscriber.recv().await.unwrap().unwrap();
    let first_at = Instant::now();
    let second_frame = subscriber.recv().await.unwrap().unwrap();
    let elapsed = first_at.elapsed();

    let first = parse_counter(&first_frame[0]);
    let second = parse_counter(&second_frame[0]);

    // Strictly increasing, modulo wraparound.
    assert_eq!(second, first.wrapping_add(1));

    // Not emitted before the interval elapses; generous lower bound to
    // keep the test stable under load.
    assert!(
        elapsed.as_millis() >= 80,
        "heartbeats only {}ms apart",
        elapsed.as_millis()
    );
}

fn parse_counter(frame: &[u8]) -> u32 {
    let bytes: [u8; 4] = frame.try_into().expect("heartbeat frame is 4 bytes");
    u32::from_le_bytes(bytes)
}
