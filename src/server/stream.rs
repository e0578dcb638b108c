//! `multipart/x-mixed-replace` MJPEG feed.
//!
//! Every connection gets its own worker task. It waits for a frame newer than
//! the last one it sent, encodes it and hands one multipart part to the
//! response body through a single-slot channel. hyper only drains that
//! channel when the client's socket can take more data, so a slow or stalled
//! client parks nothing but its own worker. When the client goes away the
//! body and its receiver are dropped and the worker ends with
//! [`StreamError::ClientDisconnected`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures_core::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::AppState;
use crate::capture::encoder::encode_frame;
use crate::error::StreamError;
use crate::pipeline::FrameBus;

pub const BOUNDARY: &str = "frame";

static CLIENT_IDS: AtomicU64 = AtomicU64::new(1);

type Part = Result<Bytes, StreamError>;

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    pub frame_poll: Duration,
}

pub async fn video_feed(State(state): State<AppState>) -> impl IntoResponse {
    let parts = mjpeg_stream(state.frames.clone(), state.stream);
    (
        [
            (CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame"),
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (PRAGMA, "no-cache"),
            (EXPIRES, "0"),
        ],
        Body::from_stream(parts),
    )
}

/// Spawn a worker for one client and return the stream of its parts.
///
/// Must be called from within a Tokio runtime.
pub fn mjpeg_stream(
    frames: Arc<FrameBus>,
    settings: StreamSettings,
) -> impl Stream<Item = Part> + Send + 'static {
    let (tx, mut rx) = mpsc::channel(1);
    let client = CLIENT_IDS.fetch_add(1, Ordering::Relaxed);

    tokio::spawn(async move {
        metrics::gauge!("stream_clients").increment(1.0);
        debug!(client, "Stream client connected");

        match stream_worker(frames, settings, tx).await {
            StreamError::ClientDisconnected => debug!(client, "Stream client disconnected"),
            err => warn!(client, error = %err, "Stream worker stopped"),
        }
        metrics::gauge!("stream_clients").decrement(1.0);
    });

    stream! {
        while let Some(part) = rx.recv().await {
            yield part;
        }
    }
}

/// Feed one client until it disconnects or encoding breaks down. Returns why
/// it stopped.
pub async fn stream_worker(
    frames: Arc<FrameBus>,
    settings: StreamSettings,
    parts: mpsc::Sender<Part>,
) -> StreamError {
    let mut last_sent = 0;
    loop {
        let published = tokio::select! {
            published = frames.wait_newer(last_sent, settings.frame_poll) => published,
            _ = parts.closed() => return StreamError::ClientDisconnected,
        };
        last_sent = published.version;
        metrics::histogram!("stream_frame_age_seconds").record(published.frame.age().as_secs_f64());

        let frame = published.frame.clone();
        let quality = settings.jpeg_quality;
        match tokio::task::spawn_blocking(move || encode_frame(&frame, quality)).await {
            Ok(Ok(jpeg)) => {
                if parts.send(Ok(multipart_part(&jpeg))).await.is_err() {
                    return StreamError::ClientDisconnected;
                }
            }
            Ok(Err(err)) => {
                warn!(version = last_sent, error = %err, "Skipping frame that failed to encode");
            }
            Err(err) => {
                let message = err.to_string();
                let _ = parts.send(Err(StreamError::Encode(message.clone()))).await;
                return StreamError::Encode(message);
            }
        }
    }
}

/// One body part: boundary, part headers, payload and trailing CRLF.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
