//! Orchestrator - per-host fan-out and result collection

use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use sweep_common::{HostFailurePolicy, HostResult, SweepResult};

use crate::progress::ScanProgress;

/// Fans a scan out into one sub-scan per host and collects the results.
pub struct Orchestrator {
    policy: HostFailurePolicy,
    progress: Arc<ScanProgress>,
}

impl Orchestrator {
    pub fn new(policy: HostFailurePolicy) -> Self {
        Self {
            policy,
            progress: Arc::new(ScanProgress::default()),
        }
    }

    pub fn progress(&self) -> Arc<ScanProgress> {
        Arc::clone(&self.progress)
    }

    /// Run `scan_host` for every target concurrently.
    ///
    /// Results come back in completion order. A host whose sub-scan fails is
    /// either dropped or reported as an empty result carrying the reason,
    /// depending on the failure policy.
    #[instrument(skip(self, targets, scan_host), fields(hosts = targets.len()))]
    pub async fn run<F, Fut>(&mut self, targets: &[Ipv4Addr], scan_host: F) -> Vec<HostResult>
    where
        F: Fn(Ipv4Addr) -> Fut,
        Fut: Future<Output = SweepResult<HostResult>> + Send + 'static,
    {
        self.progress = Arc::new(ScanProgress::new(targets.len()));

        // Rendezvous channel: a host task hands over its result only once the
        // collector is ready for it.
        let (tx, mut rx) = mpsc::channel::<(Ipv4Addr, SweepResult<HostResult>)>(1);

        let policy = self.policy;
        let progress = Arc::clone(&self.progress);
        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some((host, outcome)) = rx.recv().await {
                match outcome {
                    Ok(result) => {
                        progress.record_result(&result);
                        debug!(%host, up = result.is_up(), open = result.open.len(), "host finished");
                        results.push(result);
                    }
                    Err(e) => {
                        progress.record_failure();
                        match policy {
                            HostFailurePolicy::Drop => debug!(%host, error = %e, "dropping failed host"),
                            HostFailurePolicy::Report => {
                                warn!(%host, error = %e, "host scan failed");
                                results.push(HostResult::failed(host, e.to_string()));
                            }
                        }
                    }
                }
            }
            results
        });

        for &host in targets {
            let tx = tx.clone();
            let sub_scan = scan_host(host);
            tokio::spawn(async move {
                let outcome = sub_scan.await;
                let _ = tx.send((host, outcome)).await;
            });
        }
        drop(tx);

        let results = match collector.await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "result collector aborted");
                Vec::new()
            }
        };
        self.progress.log_summary();
        results
    }
}
