//! Progress tracking

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use sweep_common::HostResult;

pub struct ScanProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    up: AtomicUsize,
    failed: AtomicUsize,
}

impl ScanProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total: AtomicUsize::new(total),
            completed: AtomicUsize::new(0),
            up: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn record_result(&self, result: &HostResult) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if result.is_up() {
            self.up.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn up(&self) -> usize {
        self.up.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        debug!(
            hosts = self.total(),
            completed = self.completed(),
            up = self.up(),
            failed = self.failed(),
            "scan summary"
        );
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new(0)
    }
}
