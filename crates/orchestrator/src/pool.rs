//! Fixed-size worker pool fed by a bounded queue
//!
//! The queue's capacity equals the pool width and is the only hand-off point
//! between producers and workers, so the number of probes running at once
//! never exceeds the width no matter how many hosts and ports are queued.

use async_trait::async_trait;
use parking_lot::Mutex as SlotMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::job::ScanJob;

/// Strategy-specific execution of one job.
#[async_trait]
pub trait JobHandler<W: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, job: ScanJob<W>);
}

#[derive(Debug, Error)]
#[error("worker pool is closed")]
pub struct PoolClosed;

enum Dispatch<W> {
    Run(ScanJob<W>),
    Stop,
}

type SharedQueue<W> = Arc<Mutex<mpsc::Receiver<Dispatch<W>>>>;

pub struct WorkerPool<W: Send + 'static> {
    width: usize,
    tx: mpsc::Sender<Dispatch<W>>,
    rx: SlotMutex<Option<mpsc::Receiver<Dispatch<W>>>>,
    handler: Arc<dyn JobHandler<W>>,
    started: AtomicBool,
    stats: Arc<PoolStats>,
}

impl<W: Send + 'static> WorkerPool<W> {
    /// Create a pool of `width` workers; nothing runs until `start`.
    pub fn new(width: usize, handler: Arc<dyn JobHandler<W>>) -> Self {
        let width = width.max(1);
        let (tx, rx) = mpsc::channel(width);
        Self {
            width,
            tx,
            rx: SlotMutex::new(Some(rx)),
            handler,
            started: AtomicBool::new(false),
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Spawn the workers. Must run inside a tokio runtime; repeat calls are no-ops.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(rx) = self.rx.lock().take() else {
            return;
        };

        let queue: SharedQueue<W> = Arc::new(Mutex::new(rx));
        for id in 0..self.width {
            tokio::spawn(run_worker(
                id,
                Arc::clone(&queue),
                Arc::clone(&self.handler),
                Arc::clone(&self.stats),
            ));
        }
        debug!(workers = self.width, "worker pool started");
    }

    /// Enqueue a job, waiting while the queue is full.
    pub async fn submit(&self, job: ScanJob<W>) -> Result<(), PoolClosed> {
        self.tx.send(Dispatch::Run(job)).await.map_err(|_| PoolClosed)
    }

    /// Queue one stop sentinel per worker.
    pub async fn shutdown(&self) {
        for _ in 0..self.width {
            if self.tx.send(Dispatch::Stop).await.is_err() {
                break;
            }
        }
        debug!(workers = self.width, "worker pool stopping");
    }

    pub fn stats(&self) -> PoolSnapshot {
        self.stats.snapshot()
    }
}

async fn run_worker<W: Send + 'static>(
    id: usize,
    queue: SharedQueue<W>,
    handler: Arc<dyn JobHandler<W>>,
    stats: Arc<PoolStats>,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let job = match next {
            Some(Dispatch::Run(job)) => job,
            Some(Dispatch::Stop) | None => break,
        };

        if job.is_cancelled() {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            trace!(worker = id, target = %job.target, "skipping job after cancellation");
            continue;
        }

        // The completion fires only after the job is counted as finished.
        let mut job = job;
        let completion = job.take_completion();
        {
            let _active = stats.enter();
            handler.handle(job).await;
        }
        drop(completion);
    }
    trace!(worker = id, "worker exiting");
}

/// Live counters for the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicU64,
    skipped: AtomicU64,
}

impl PoolStats {
    fn enter(&self) -> ActiveJob<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        ActiveJob { stats: self }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak: self.peak.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
        }
    }
}

struct ActiveJob<'a> {
    stats: &'a PoolStats,
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of `PoolStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    pub in_flight: usize,
    pub peak: usize,
    pub completed: u64,
    pub skipped: u64,
}
