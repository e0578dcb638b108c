//! `/video_feed` over real sockets: clients that stop reading must not slow
//! down one that keeps up.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::Instant;

use common::TestApp;
use lookout::Frame;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const BOUNDARY_LINE: &[u8] = b"--frame\r\n";

/// Noise compresses badly, so every part is large and a client that never
/// reads fills its socket buffers quickly.
fn noise_frame(sequence: u64) -> Frame {
    let mut state = sequence.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let pixels: Vec<u8> = (0..WIDTH * HEIGHT * 3)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        })
        .collect();
    Frame::rgb24(sequence, WIDTH, HEIGHT, pixels)
}

async fn open_feed(addr: std::net::SocketAddr, recv_buffer: Option<u32>) -> TcpStream {
    let socket = TcpSocket::new_v4().unwrap();
    if let Some(size) = recv_buffer {
        socket.set_recv_buffer_size(size).unwrap();
    }
    let mut socket = socket.connect(addr).await.unwrap();
    socket
        .write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    socket
}

fn count_boundaries(carry: &mut Vec<u8>, chunk: &[u8]) -> usize {
    carry.extend_from_slice(chunk);
    let found = carry
        .windows(BOUNDARY_LINE.len())
        .filter(|window| *window == BOUNDARY_LINE)
        .count();
    let keep = carry.len().min(BOUNDARY_LINE.len() - 1);
    carry.drain(..carry.len() - keep);
    found
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_sockets_do_not_slow_an_active_client() {
    let app = TestApp::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    // Camera stand-in: a fresh frame every 25ms
    let frames = app.frames.clone();
    let publisher = tokio::spawn(async move {
        let mut sequence = 0;
        let mut tick = tokio::time::interval(Duration::from_millis(25));
        loop {
            tick.tick().await;
            sequence += 1;
            frames.publish(noise_frame(sequence));
        }
    });

    // Connected with tiny receive windows and never read from
    let mut stalled = Vec::new();
    for _ in 0..3 {
        stalled.push(open_feed(addr, Some(4096)).await);
    }

    let mut active = open_feed(addr, None).await;
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut buf = vec![0u8; 64 * 1024];
    let mut carry = Vec::new();
    let mut parts = 0;
    while let Ok(read) = tokio::time::timeout_at(deadline, active.read(&mut buf)).await {
        let n = read.unwrap();
        assert!(n > 0, "server closed the active stream");
        parts += count_boundaries(&mut carry, &buf[..n]);
    }
    publisher.abort();

    // About 120 frames were published while the stalled sockets sat full
    assert!(parts >= 40, "active client received only {parts} parts");
    drop(stalled);
}

#[test]
fn boundaries_split_across_reads_are_counted_once() {
    let mut carry = Vec::new();
    assert_eq!(count_boundaries(&mut carry, b"xx--fra"), 0);
    assert_eq!(count_boundaries(&mut carry, b"me\r\nyy--frame\r\n"), 2);
    assert_eq!(count_boundaries(&mut carry, b"zz"), 0);
}
