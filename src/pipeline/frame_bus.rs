//! Single-slot, versioned frame holder shared by the capture thread and all
//! readers.
//!
//! The slot is an `ArcSwapOption`: publishing swaps in a new immutable
//! `Published` and readers load whichever one is current. Readers never hold
//! anything the writer has to wait for, and a reader can never see a frame
//! paired with another frame's version.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Notify;

use crate::capture::Frame;

/// A frame as published on the bus
pub struct Published {
    pub frame: Frame,
    /// Starts at 1 and increases by one on every publish
    pub version: u64,
}

#[derive(Default)]
pub struct FrameBus {
    slot: ArcSwapOption<Published>,
    notify: Notify,
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and wake waiting readers. Returns the new version.
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut version = 0;
        self.slot.rcu(|current| {
            version = current.as_ref().map_or(1, |published| published.version + 1);
            Some(Arc::new(Published {
                frame: frame.clone(),
                version,
            }))
        });
        self.notify.notify_waiters();
        metrics::counter!("frame_bus_published_total").increment(1);
        version
    }

    /// Latest frame, or `None` before the first publish.
    pub fn snapshot(&self) -> Option<Arc<Published>> {
        self.slot.load_full()
    }

    /// Version of the latest frame, 0 while empty.
    pub fn version(&self) -> u64 {
        self.slot.load().as_ref().map_or(0, |published| published.version)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }

    /// Wait for a frame with a version greater than `after`.
    ///
    /// Woken by every publish; `poll` bounds how long a missed wake-up can
    /// delay the reader.
    pub async fn wait_newer(&self, after: u64, poll: Duration) -> Arc<Published> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(published) = self.snapshot() {
                if published.version > after {
                    return published;
                }
            }

            let _ = tokio::time::timeout(poll, notified).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(sequence: u64) -> Frame {
        Frame::rgb24(sequence, 1, 1, vec![sequence as u8; 3])
    }

    #[test]
    fn empty_before_first_publish() {
        let bus = FrameBus::new();
        assert!(bus.snapshot().is_none());
        assert!(bus.is_empty());
        assert_eq!(bus.version(), 0);
    }

    #[test]
    fn versions_increase_on_every_publish() {
        let bus = FrameBus::new();
        assert_eq!(bus.publish(frame(10)), 1);
        assert_eq!(bus.publish(frame(11)), 2);

        let latest = bus.snapshot().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.frame.meta.sequence, 11);
    }

    #[test]
    fn readers_never_see_versions_go_backwards() {
        let bus = Arc::new(FrameBus::new());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    let mut observed = 0;
                    while last < 5_000 {
                        if let Some(published) = bus.snapshot() {
                            assert!(published.version >= last);
                            // Frame and version travel together
                            assert_eq!(published.frame.meta.sequence, published.version);
                            last = published.version;
                            observed += 1;
                        }
                    }
                    observed
                })
            })
            .collect();

        for sequence in 1..=5_000 {
            bus.publish(frame(sequence));
        }

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn wait_newer_wakes_on_publish() {
        let bus = Arc::new(FrameBus::new());
        bus.publish(frame(1));

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait_newer(1, Duration::from_secs(60)).await.version })
        };

        tokio::task::yield_now().await;
        let publisher = {
            let bus = bus.clone();
            thread::spawn(move || bus.publish(frame(2)))
        };
        publisher.join().unwrap();

        let version = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn wait_newer_returns_immediately_when_already_newer() {
        let bus = FrameBus::new();
        bus.publish(frame(1));
        bus.publish(frame(2));

        let published = bus.wait_newer(0, Duration::from_secs(60)).await;
        assert_eq!(published.version, 2);
    }
}
