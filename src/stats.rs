//! Statistics tracking for the forwarder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::resolver::Resolution;

/// Atomic per-outcome counters.
pub struct Stats {
    started: Instant,
    pub requests: AtomicU64,
    pub hijacked: AtomicU64,
    pub local: AtomicU64,
    pub cached: AtomicU64,
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            hijacked: AtomicU64::new(0),
            local: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record(&self, resolution: Resolution, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match resolution {
            Resolution::Hijacked => &self.hijacked,
            Resolution::Local => &self.local,
            Resolution::Cached => &self.cached,
            Resolution::Forwarded => &self.forwarded,
            Resolution::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let hijacked = self.hijacked.swap(0, Ordering::Relaxed);
        let local = self.local.swap(0, Ordering::Relaxed);
        let cached = self.cached.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let failed = self.failed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            hijacked,
            local,
            cached,
            forwarded,
            failed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub hijacked: u64,
    pub local: u64,
    pub cached: u64,
    pub forwarded: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}
