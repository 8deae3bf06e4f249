//! Orchestrator - worker pool, scan jobs and per-host collection

mod aggregator;
mod job;
mod orchestrator;
mod pool;
mod progress;

pub use aggregator::HostAggregator;
pub use job::{Completion, CompletionGroup, ScanJob};
pub use orchestrator::Orchestrator;
pub use pool::{JobHandler, PoolClosed, PoolSnapshot, PoolStats, WorkerPool};
pub use progress::ScanProgress;
