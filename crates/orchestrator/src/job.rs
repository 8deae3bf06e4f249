//! Scan jobs and the per-host completion barrier

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One unit of work handed to the pool.
///
/// `W` is strategy specific: a single port for connect probes, a whole port
/// list for SYN host scans. The job's completion (if any) fires when the job
/// is dropped, so a worker that finishes, skips, or panics on a job always
/// signals it exactly once.
pub struct ScanJob<W> {
    pub target: Ipv4Addr,
    pub work: W,
    pub cancel: CancellationToken,
    completion: Option<Completion>,
}

impl<W> ScanJob<W> {
    #[must_use]
    pub fn new(target: Ipv4Addr, work: W, cancel: CancellationToken) -> Self {
        Self {
            target,
            work,
            cancel,
            completion: None,
        }
    }

    /// Tie this job to a completion group.
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Wait-group style barrier: one `enter` per dispatched job, released as
/// each job's `Completion` drops.
#[derive(Clone, Default)]
pub struct CompletionGroup {
    inner: Arc<GroupInner>,
}

#[derive(Default)]
struct GroupInner {
    pending: AtomicUsize,
    notify: Notify,
}

impl CompletionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more outstanding job.
    pub fn enter(&self) -> Completion {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        Completion {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Resolve once every registered job has completed.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Completion signal for one job.
pub struct Completion {
    inner: Arc<GroupInner>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}
