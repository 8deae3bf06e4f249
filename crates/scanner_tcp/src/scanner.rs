// crates/scanner_tcp/src/scanner.rs
//! TCP connect scanner implementation

use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use sweep_common::{
    CancellationToken, HostResult, PortEvent, PortState, Scanner, ScannerConfig, SweepError,
    SweepResult,
};
use sweep_orchestrator::{
    CompletionGroup, HostAggregator, JobHandler, Orchestrator, PoolSnapshot, ScanJob, WorkerPool,
};

/// Work carried by one connect job: the port, and where to report it.
struct PortProbe {
    port: u16,
    events: mpsc::UnboundedSender<PortEvent>,
}

/// Executes a single connect attempt per job.
struct ConnectProbe {
    timeout: Duration,
}

impl ConnectProbe {
    /// Open a connection bounded by the timeout and classify the outcome.
    ///
    /// `None` means the attempt failed in a way that says nothing about the
    /// port (timeout, unreachable, ...).
    async fn classify(&self, addr: SocketAddr) -> Option<PortState> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Some(PortState::Open)
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Some(PortState::Closed),
            Ok(Err(e)) => {
                trace!(%addr, error = %e, "connect failed, dropping probe");
                None
            }
            Err(_) => {
                trace!(%addr, "connect timed out, dropping probe");
                None
            }
        }
    }
}

#[async_trait]
impl JobHandler<PortProbe> for ConnectProbe {
    async fn handle(&self, job: ScanJob<PortProbe>) {
        let addr = SocketAddr::from((job.target, job.work.port));
        if let Some(state) = self.classify(addr).await {
            // The aggregator may already be gone if the host was abandoned.
            let _ = job.work.events.send(PortEvent::new(job.work.port, state));
        }
    }
}

/// Connect scanner over a fixed set of targets.
pub struct ConnectScanner {
    targets: Vec<Ipv4Addr>,
    config: ScannerConfig,
    pool: Arc<WorkerPool<PortProbe>>,
}

impl ConnectScanner {
    pub fn new(targets: Vec<Ipv4Addr>, config: ScannerConfig) -> Self {
        let handler = Arc::new(ConnectProbe {
            timeout: config.timeout,
        });
        let pool = Arc::new(WorkerPool::new(config.concurrency, handler));
        Self {
            targets,
            config,
            pool,
        }
    }

    pub fn targets(&self) -> &[Ipv4Addr] {
        &self.targets
    }

    pub fn pool_stats(&self) -> PoolSnapshot {
        self.pool.stats()
    }
}

/// Dispatch one job per port for `host` and wait for all of them.
#[instrument(skip(pool, ports, cancel), fields(ports = ports.len()))]
async fn scan_host(
    pool: Arc<WorkerPool<PortProbe>>,
    host: Ipv4Addr,
    ports: Arc<[u16]>,
    cancel: CancellationToken,
) -> HostResult {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (finish_tx, finish_rx) = oneshot::channel();
    let aggregator = HostAggregator::new(host).spawn(events_rx, finish_rx);

    let group = CompletionGroup::new();
    for &port in ports.iter() {
        let probe = PortProbe {
            port,
            events: events_tx.clone(),
        };
        let job = ScanJob::new(host, probe, cancel.clone()).with_completion(group.enter());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%host, "cancelled, no further ports dispatched");
                break;
            }
            sent = pool.submit(job) => {
                if sent.is_err() {
                    warn!(%host, "worker pool closed mid-scan");
                    break;
                }
            }
        }
    }
    drop(events_tx);

    group.wait().await;
    let _ = finish_tx.send(());
    match aggregator.await {
        Ok(result) => result,
        Err(e) => {
            warn!(%host, error = %e, "aggregator task failed");
            HostResult::new(host)
        }
    }
}

#[async_trait]
impl Scanner for ConnectScanner {
    fn start(&self) {
        self.pool.start();
    }

    async fn scan(&self, cancel: CancellationToken, ports: &[u16]) -> SweepResult<Vec<HostResult>> {
        if !self.pool.is_started() {
            return Err(SweepError::NotStarted);
        }

        let ports: Arc<[u16]> = ports.into();
        let mut orchestrator = Orchestrator::new(self.config.failure_policy);
        let results = orchestrator
            .run(&self.targets, |host| {
                let pool = Arc::clone(&self.pool);
                let ports = Arc::clone(&ports);
                let cancel = cancel.clone();
                async move { Ok::<_, SweepError>(scan_host(pool, host, ports, cancel).await) }
            })
            .await;
        Ok(results)
    }

    async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn name(&self) -> &str {
        "TCP Connect Scanner"
    }

    fn requires_root(&self) -> bool {
        false
    }
}
