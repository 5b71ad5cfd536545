//! Per-path output counters
//!
//! Provides:
//! - Tick outcome counters (sent, skipped, dropped, failed)
//! - Rolling average of conversion latency

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Maximum number of samples to keep for rolling averages
const MAX_SAMPLES: usize = 120;

/// Rolling average calculator for timing data
#[derive(Debug)]
struct RollingAverage {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl RollingAverage {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn add(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    fn average_ms(&self) -> f64 {
        self.average().as_secs_f64() * 1000.0
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Counters for one output path
///
/// Updated from the path's own task, read from anywhere.
#[derive(Debug)]
pub struct PathStats {
    sent: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    conversion: RwLock<RollingAverage>,
}

impl Default for PathStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStats {
    pub fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            conversion: RwLock::new(RollingAverage::new(MAX_SAMPLES)),
        }
    }

    /// A frame was handed to the transmitter
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A tick had nothing new to send
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was dropped under backpressure
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Conversion or transmission failed
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one conversion took
    pub fn record_conversion(&self, duration: Duration) {
        self.conversion.write().add(duration);
    }

    pub fn snapshot(&self) -> PathStatsSnapshot {
        PathStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            conversion_ms: self.conversion.read().average_ms(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.conversion.write().clear();
    }
}

/// Point-in-time copy of [`PathStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathStatsSnapshot {
    pub sent: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub failed: u64,
    /// Average conversion latency in milliseconds
    pub conversion_ms: f64,
}

impl std::fmt::Display for PathStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent={} skipped={} dropped={} failed={} convert={:.2}ms",
            self.sent, self.skipped, self.dropped, self.failed, self.conversion_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average() {
        let mut avg = RollingAverage::new(3);
        avg.add(Duration::from_millis(10));
        avg.add(Duration::from_millis(20));
        avg.add(Duration::from_millis(30));
        assert!((avg.average_ms() - 20.0).abs() < 0.1);

        // Oldest sample falls out
        avg.add(Duration::from_millis(40));
        assert!((avg.average_ms() - 30.0).abs() < 0.1);
    }

    #[test]
    fn test_counters() {
        let stats = PathStats::new();
        stats.record_sent();
        stats.record_sent();
        stats.record_skipped();
        stats.record_dropped();
        stats.record_failed();
        stats.record_conversion(Duration::from_millis(4));

        let snap = stats.snapshot();
        assert_eq!((snap.sent, snap.skipped, snap.dropped, snap.failed), (2, 1, 1, 1));
        assert!((snap.conversion_ms - 4.0).abs() < 0.1);
    }

    #[test]
    fn test_reset() {
        let stats = PathStats::new();
        stats.record_sent();
        stats.record_conversion(Duration::from_millis(1));
        stats.reset();
        assert_eq!(stats.snapshot(), PathStatsSnapshot::default());
    }

    #[test]
    fn test_display() {
        let snap = PathStatsSnapshot {
            sent: 10,
            dropped: 2,
            conversion_ms: 1.5,
            ..Default::default()
        };
        let line = snap.to_string();
        assert!(line.contains("sent=10"));
        assert!(line.contains("dropped=2"));
        assert!(line.contains("1.50ms"));
    }
}
