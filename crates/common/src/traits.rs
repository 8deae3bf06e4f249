//! Core traits for sweep scanner components

use crate::error::SweepResult;
use crate::types::HostResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Scanner contract shared by every probing strategy.
///
/// Callers pick a strategy by constructing the implementation, call
/// `start()` once, then `scan()` over the scanner's targets.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Launch the worker pool. Calling it again is a no-op.
    fn start(&self);

    /// Scan every target on `ports`, returning results in completion order.
    ///
    /// Cancelling `cancel` stops new probes from being dispatched; whatever
    /// was gathered so far is still returned. Errors are reserved for
    /// scan-wide failures such as calling this before `start()`.
    async fn scan(&self, cancel: CancellationToken, ports: &[u16]) -> SweepResult<Vec<HostResult>>;

    /// Stop the workers once the queue drains.
    async fn shutdown(&self) {}

    /// Scanner name/identifier
    fn name(&self) -> &str;

    /// Whether this scanner requires root/CAP_NET_RAW
    fn requires_root(&self) -> bool {
        false
    }
}

/// Port to service-name table used when rendering reports.
pub trait ServiceLookup: Send + Sync {
    fn service_name(&self, port: u16) -> Option<&str>;
}
