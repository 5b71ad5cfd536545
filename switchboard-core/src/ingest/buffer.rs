//! Single-slot latest-wins frame buffer

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::Frame;

struct Slot {
    frame: Arc<Frame>,
    received_at: Instant,
}

/// Holds the most recent frame of one source
///
/// Writes replace the slot with a single atomic pointer swap, so a reader
/// sees either the previous frame or the new one, never a mix. There is
/// no queue: an unread frame is simply replaced.
#[derive(Default)]
pub struct FrameBuffer {
    slot: ArcSwapOption<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame
    pub fn publish(&self, frame: Arc<Frame>) {
        self.slot.store(Some(Arc::new(Slot {
            frame,
            received_at: Instant::now(),
        })));
    }

    /// Most recent frame, regardless of age
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slot.load_full().map(|slot| slot.frame.clone())
    }

    /// Most recent frame if it arrived no more than `max_age` ago
    pub fn latest_within(&self, max_age: Duration) -> Option<Arc<Frame>> {
        self.latest_at(Instant::now(), max_age)
    }

    /// Most recent frame if it is no older than `max_age` at `now`
    pub fn latest_at(&self, now: Instant, max_age: Duration) -> Option<Arc<Frame>> {
        let slot = self.slot.load_full()?;
        (now.saturating_duration_since(slot.received_at) <= max_age).then(|| slot.frame.clone())
    }

    /// Time since the held frame arrived
    pub fn age(&self) -> Option<Duration> {
        self.slot
            .load_full()
            .map(|slot| slot.received_at.elapsed())
    }

    /// Drop the held frame
    pub fn clear(&self) {
        self.slot.store(None);
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.load_full();
        f.debug_struct("FrameBuffer")
            .field("sequence", &slot.as_ref().map(|s| s.frame.sequence()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::PixelFormat;

    fn solid(value: u8, sequence: u64) -> Arc<Frame> {
        Arc::new(
            Frame::new(vec![value; 64 * 64 * 4], 64, 64, PixelFormat::Bgra)
                .unwrap()
                .with_sequence(sequence),
        )
    }

    #[test]
    fn test_latest_wins() {
        let buffer = FrameBuffer::new();
        assert!(buffer.latest().is_none());

        buffer.publish(solid(1, 1));
        buffer.publish(solid(2, 2));
        assert_eq!(buffer.latest().unwrap().sequence(), 2);
    }

    #[test]
    fn test_clear() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(1, 1));
        assert!(!buffer.is_empty());
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_staleness() {
        let buffer = FrameBuffer::new();
        buffer.publish(solid(1, 1));
        let now = Instant::now();
        assert!(buffer.latest_at(now, Duration::from_millis(100)).is_some());
        let later = now + Duration::from_millis(500);
        assert!(buffer.latest_at(later, Duration::from_millis(100)).is_none());
        // Stale frames are still held
        assert!(buffer.latest().is_some());
    }

    #[test]
    fn test_no_torn_reads_under_concurrent_writes() {
        let buffer = Arc::new(FrameBuffer::new());
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for seq in 1..=2000u64 {
                    buffer.publish(solid((seq % 251) as u8, seq));
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    let mut last_seq = 0;
                    for _ in 0..5000 {
                        if let Some(frame) = buffer.latest() {
                            let expected = (frame.sequence() % 251) as u8;
                            assert!(frame.pixels().iter().all(|&b| b == expected));
                            assert!(frame.sequence() >= last_seq, "went backwards");
                            last_seq = frame.sequence();
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.latest().unwrap().sequence(), 2000);
    }
}
