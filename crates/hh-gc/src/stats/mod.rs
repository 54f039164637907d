//! Per-worker collection statistics.
//!
//! `GcStats` is the thing `world::WorkerGc` updates after every
//! `collect_local` pass: cycle count, bytes copied/moved, and a pause
//! histogram — narrowed from the teacher's generational `GcStats` (which
//! also tracked minor/major cycle splits and a separate `GcMetrics`
//! exporter this crate has no counterpart for) down to the fields a
//! single-pass local collector actually produces.

pub mod histogram;
pub mod timer;

pub use histogram::Histogram;
pub use timer::GcTimer;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Accumulates collection statistics for one worker. Cheap to update on
/// the hot path (`HhConfig::stats_enabled` gates whether callers bother
/// at all); every field is an independent atomic, so no lock is needed
/// even though a worker's own collector is the only writer.
pub struct GcStats {
    total_cycles: AtomicU64,
    skipped_cycles: AtomicU64,
    bytes_copied: AtomicUsize,
    bytes_moved: AtomicUsize,
    pause_stats: Arc<Histogram>,
    start_time: std::time::Instant,
}

impl GcStats {
    pub fn new() -> Self {
        GcStats {
            total_cycles: AtomicU64::new(0),
            skipped_cycles: AtomicU64::new(0),
            bytes_copied: AtomicUsize::new(0),
            bytes_moved: AtomicUsize::new(0),
            pause_stats: Arc::new(Histogram::new()),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn pause_histogram(&self) -> Arc<Histogram> {
        self.pause_stats.clone()
    }

    /// Records one completed local collection: `(bytes_copied,
    /// bytes_moved)` from `collect::CollectStats`, and the wall time the
    /// pass took.
    pub fn record_collection(&self, bytes_copied: usize, bytes_moved: usize, duration: Duration) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes_copied, Ordering::Relaxed);
        self.bytes_moved.fetch_add(bytes_moved, Ordering::Relaxed);
        self.pause_stats.record(duration.as_nanos() as u64);
    }

    /// Records a `CollectOutcome::Skipped` — doesn't touch the pause
    /// histogram since no collection actually ran.
    pub fn record_skip(&self) {
        self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> GcSummary {
        GcSummary {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            bytes_moved: self.bytes_moved.load(Ordering::Relaxed),
            avg_pause_ms: self.pause_stats.mean() as f64 / 1_000_000.0,
            max_pause_ms: self.pause_stats.max() as f64 / 1_000_000.0,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        self.total_cycles.store(0, Ordering::Relaxed);
        self.skipped_cycles.store(0, Ordering::Relaxed);
        self.bytes_copied.store(0, Ordering::Relaxed);
        self.bytes_moved.store(0, Ordering::Relaxed);
        self.pause_stats.clear();
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct GcSummary {
    pub total_cycles: u64,
    pub skipped_cycles: u64,
    pub bytes_copied: usize,
    pub bytes_moved: usize,
    pub avg_pause_ms: f64,
    pub max_pause_ms: f64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_collection_updates_summary() {
        let stats = GcStats::new();
        stats.record_collection(128, 64, Duration::from_micros(50));
        let summary = stats.summary();
        assert_eq!(summary.total_cycles, 1);
        assert_eq!(summary.bytes_copied, 128);
        assert_eq!(summary.bytes_moved, 64);
    }

    #[test]
    fn test_record_skip_does_not_touch_pause_histogram() {
        let stats = GcStats::new();
        stats.record_skip();
        let summary = stats.summary();
        assert_eq!(summary.skipped_cycles, 1);
        assert_eq!(summary.total_cycles, 0);
        assert_eq!(summary.max_pause_ms, 0.0);
    }

    #[test]
    fn test_reset_clears_all_counters() {
        let stats = GcStats::new();
        stats.record_collection(10, 10, Duration::from_micros(1));
        stats.reset();
        let summary = stats.summary();
        assert_eq!(summary.total_cycles, 0);
        assert_eq!(summary.bytes_copied, 0);
    }
}
