//! SYN scanner
//!
//! One pool job per host. A job opens its own transport handle on the
//! outbound interface, resolves the next hop's MAC, sends one SYN per port
//! and keeps classifying replies until the timeout after the last send.

use async_trait::async_trait;
use pnet::util::MacAddr;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task;
use tracing::{debug, instrument, trace, warn};

use sweep_common::{CancellationToken, HostResult, Scanner, ScannerConfig, SweepError, SweepResult};
use sweep_orchestrator::{HostAggregator, JobHandler, Orchestrator, PoolSnapshot, ScanJob, WorkerPool};

use crate::arp::{AddressResolver, NeighborCache, ProcNeighborCache};
use crate::error::SynError;
use crate::packet::{ReplyFlow, SynTemplate};
use crate::route::{RouteTable, SystemRoutes};
use crate::transport::{DatalinkTransport, FrameReceiver, FrameSender, Frames, PacketTransport};

/// Pick a local port nobody is using right now.
fn ephemeral_port() -> Result<u16, SynError> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| SynError::NoEphemeralPort(e.to_string()))?;
    let port = listener
        .local_addr()
        .map_err(|e| SynError::NoEphemeralPort(e.to_string()))?
        .port();
    Ok(port)
}

fn join_error(e: task::JoinError) -> SynError {
    SynError::Transport(format!("host task failed: {e}"))
}

/// Everything a host scan needs once setup has succeeded.
struct HostSession {
    tx: Box<dyn FrameSender>,
    rx: Box<dyn FrameReceiver>,
    template: SynTemplate,
    flow: ReplyFlow,
}

/// Per-host SYN scan logic, independent of the pool.
pub struct SynEngine {
    transport: Arc<dyn PacketTransport>,
    routes: Arc<dyn RouteTable>,
    resolver: AddressResolver,
    timeout: Duration,
}

impl SynEngine {
    pub fn new(
        transport: Arc<dyn PacketTransport>,
        routes: Arc<dyn RouteTable>,
        neighbors: Arc<dyn NeighborCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            routes,
            resolver: AddressResolver::new(neighbors, timeout),
            timeout,
        }
    }

    /// Route, open the transport, resolve the MAC, pick a source port.
    /// Blocks for up to the timeout while waiting on ARP.
    fn prepare(&self, host: Ipv4Addr) -> Result<HostSession, SynError> {
        let route = self.routes.route(host)?;
        debug!(
            %host,
            interface = %route.interface.name,
            source = %route.source,
            next_hop = %route.next_hop(),
            "route selected"
        );

        let (mut tx, mut rx) = self.transport.open(&route.interface)?;
        let dst_mac = self.resolver.resolve(&route, tx.as_mut(), rx.as_mut())?;
        let src_port = ephemeral_port()?;
        let src_mac = route.interface.mac.unwrap_or_else(MacAddr::zero);

        Ok(HostSession {
            tx,
            rx,
            template: SynTemplate {
                src_mac,
                dst_mac,
                src_ip: route.source,
                dst_ip: host,
                src_port,
            },
            flow: ReplyFlow {
                remote: host,
                local: route.source,
                local_port: src_port,
            },
        })
    }

    /// Scan `ports` on `host`. Setup failures abort this host only.
    ///
    /// Cancelling `cancel` cuts the reply window short; replies already
    /// captured are kept.
    #[instrument(skip(self, ports, cancel), fields(ports = ports.len()))]
    pub async fn scan_host(
        self: Arc<Self>,
        host: Ipv4Addr,
        ports: Arc<[u16]>,
        cancel: CancellationToken,
    ) -> Result<HostResult, SynError> {
        let engine = Arc::clone(&self);
        let HostSession {
            mut tx,
            mut rx,
            template,
            flow,
        } = task::spawn_blocking(move || engine.prepare(host))
            .await
            .map_err(join_error)??;

        // Sends and capture share one blocking thread per host.
        let close = CancellationToken::new();
        let (sent_tx, sent_rx) = oneshot::channel();
        let mut aggregator = HostAggregator::new(host);
        let session = {
            let close = close.clone();
            task::spawn_blocking(move || {
                let mut sent = 0usize;
                for &port in ports.iter() {
                    let outcome = template.build(port).and_then(|frame| tx.send(&frame));
                    match outcome {
                        Ok(()) => sent += 1,
                        Err(e) => trace!(%host, port, error = %e, "probe not sent"),
                    }
                }
                let _ = sent_tx.send(sent);

                for frame in Frames::until_closed(rx.as_mut(), close) {
                    if let Some(event) = flow.classify(&frame) {
                        aggregator.record(event);
                    }
                }
                aggregator.finish()
            })
        };

        let window = async {
            match sent_rx.await {
                Ok(sent) => debug!(%host, sent, "probes sent"),
                Err(_) => warn!(%host, "SYN sender stopped early"),
            }
            tokio::time::sleep(self.timeout).await;
        };
        tokio::select! {
            _ = window => {}
            _ = cancel.cancelled() => debug!(%host, "cancelled, closing reply window early"),
        }
        close.cancel();
        session.await.map_err(join_error)
    }
}

struct HostWork {
    ports: Arc<[u16]>,
    reply: oneshot::Sender<Result<HostResult, SynError>>,
}

struct SynProbe {
    engine: Arc<SynEngine>,
}

#[async_trait]
impl JobHandler<HostWork> for SynProbe {
    async fn handle(&self, job: ScanJob<HostWork>) {
        let host = job.target;
        let HostWork { ports, reply } = job.work;
        let outcome = Arc::clone(&self.engine)
            .scan_host(host, ports, job.cancel)
            .await;
        let _ = reply.send(outcome);
    }
}

/// SYN scanner over a fixed set of targets.
pub struct SynScanner {
    targets: Vec<Ipv4Addr>,
    config: ScannerConfig,
    pool: Arc<WorkerPool<HostWork>>,
}

impl SynScanner {
    /// Scanner on the system's interfaces, routes and neighbor table.
    ///
    /// Fails with `SynError::NotPermitted` when raw handles cannot be opened.
    pub fn new(targets: Vec<Ipv4Addr>, config: ScannerConfig) -> Result<Self, SynError> {
        Self::with_parts(
            targets,
            config,
            Arc::new(DatalinkTransport::default()),
            Arc::new(SystemRoutes),
            Arc::new(ProcNeighborCache::default()),
        )
    }

    pub fn with_parts(
        targets: Vec<Ipv4Addr>,
        config: ScannerConfig,
        transport: Arc<dyn PacketTransport>,
        routes: Arc<dyn RouteTable>,
        neighbors: Arc<dyn NeighborCache>,
    ) -> Result<Self, SynError> {
        transport.check_access()?;

        let engine = Arc::new(SynEngine::new(transport, routes, neighbors, config.timeout));
        let pool = Arc::new(WorkerPool::new(config.concurrency, Arc::new(SynProbe { engine })));
        Ok(Self {
            targets,
            config,
            pool,
        })
    }

    pub fn targets(&self) -> &[Ipv4Addr] {
        &self.targets
    }

    pub fn pool_stats(&self) -> PoolSnapshot {
        self.pool.stats()
    }
}

/// Queue `host` on the pool and wait for its result.
async fn dispatch_host(
    pool: Arc<WorkerPool<HostWork>>,
    host: Ipv4Addr,
    ports: Arc<[u16]>,
    cancel: CancellationToken,
) -> SweepResult<HostResult> {
    let (reply_tx, reply_rx) = oneshot::channel();
    let job = ScanJob::new(
        host,
        HostWork {
            ports,
            reply: reply_tx,
        },
        cancel.clone(),
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(HostResult::new(host)),
        sent = pool.submit(job) => {
            if sent.is_err() {
                return Err(SweepError::HostFailed {
                    host,
                    reason: "worker pool closed".into(),
                });
            }
        }
    }

    match reply_rx.await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.into()),
        // Dropped without a reply: the job was skipped after cancellation.
        Err(_) => Ok(HostResult::new(host)),
    }
}

#[async_trait]
impl Scanner for SynScanner {
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
                dispatch_host(Arc::clone(&self.pool), host, Arc::clone(&ports), cancel.clone())
            })
            .await;
        Ok(results)
    }

    async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn name(&self) -> &str {
        "SYN Scanner"
    }

    fn requires_root(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, NoRoute, OnLink, StaticNeighbors};
    use crate::packet::SegmentKind;
    use sweep_common::{HostFailurePolicy, ScanType};

    fn config(policy: HostFailurePolicy) -> ScannerConfig {
        ScannerConfig::default()
            .with_scan_type(ScanType::Syn)
            .with_timeout(Duration::from_millis(150))
            .with_concurrency(2)
            .with_failure_policy(policy)
    }

    fn scanner(net: &FakeNetwork, routes: Arc<dyn RouteTable>, policy: HostFailurePolicy) -> SynScanner {
        let scanner = SynScanner::with_parts(
            vec![net.remote_ip()],
            config(policy),
            Arc::new(net.clone()),
            routes,
            Arc::new(StaticNeighbors::default()),
        )
        .unwrap();
        scanner.start();
        scanner
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn syn_ack_open_rst_closed_silence_absent() {
        let net = FakeNetwork::new()
            .replying(22, SegmentKind::SynAck)
            .replying(23, SegmentKind::RstAck);
        let scanner = scanner(&net, Arc::new(OnLink), HostFailurePolicy::Report);

        let results = scanner
            .scan(CancellationToken::new(), &[22, 23, 24])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.host, net.remote_ip());
        assert_eq!(r.open, vec![22]);
        assert_eq!(r.closed, vec![23]);
        assert!(r.filtered.is_empty());
        assert!(r.latency > Duration::ZERO);
        assert!(r.error.is_none());

        let mut probed = net.probed_ports();
        probed.sort_unstable();
        assert_eq!(probed, vec![22, 23, 24]);
        scanner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn silent_host_is_down() {
        let net = FakeNetwork::new();
        let scanner = scanner(&net, Arc::new(OnLink), HostFailurePolicy::Report);

        let results = scanner.scan(CancellationToken::new(), &[80, 443]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_up());
        assert_eq!(results[0].classified_count(), 0);
        assert!(!results[0].is_failed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn arp_failure_follows_policy() {
        let net = FakeNetwork::new().without_arp_replies();

        let reporting = scanner(&net, Arc::new(OnLink), HostFailurePolicy::Report);
        let results = reporting.scan(CancellationToken::new(), &[22]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_failed());
        assert!(results[0].error.as_deref().unwrap().contains("ARP"));

        let dropping = scanner(&net, Arc::new(OnLink), HostFailurePolicy::Drop);
        let results = dropping.scan(CancellationToken::new(), &[22]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn route_failure_aborts_only_that_host() {
        let net = FakeNetwork::new();
        let scanner = scanner(&net, Arc::new(NoRoute), HostFailurePolicy::Report);

        let results = scanner.scan(CancellationToken::new(), &[22]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].error.as_deref().unwrap().contains("network unreachable"));
        assert_eq!(net.sent_count(), 0);
    }

    #[test]
    fn construction_requires_raw_access() {
        let net = FakeNetwork::new().denied();
        let err = SynScanner::with_parts(
            vec![net.remote_ip()],
            config(HostFailurePolicy::Report),
            Arc::new(net),
            Arc::new(OnLink),
            Arc::new(StaticNeighbors::default()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SynError::NotPermitted));
    }

    #[tokio::test]
    async fn scan_before_start_fails() {
        let net = FakeNetwork::new();
        let scanner = SynScanner::with_parts(
            vec![net.remote_ip()],
            config(HostFailurePolicy::Report),
            Arc::new(net),
            Arc::new(OnLink),
            Arc::new(StaticNeighbors::default()),
        )
        .unwrap();
        assert!(scanner.requires_root());
        let err = scanner.scan(CancellationToken::new(), &[22]).await.unwrap_err();
        assert!(matches!(err, SweepError::NotStarted));
    }

    #[tokio::test]
    async fn cancelled_scan_probes_nothing() {
        let net = FakeNetwork::new().replying(22, SegmentKind::SynAck);
        let scanner = scanner(&net, Arc::new(OnLink), HostFailurePolicy::Report);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = scanner.scan(cancel, &[22]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].classified_count(), 0);
        assert_eq!(net.sent_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_closes_reply_window_early() {
        let net = FakeNetwork::new().replying(22, SegmentKind::SynAck);
        let scanner = SynScanner::with_parts(
            vec![net.remote_ip()],
            config(HostFailurePolicy::Report).with_timeout(Duration::from_secs(5)),
            Arc::new(net.clone()),
            Arc::new(OnLink),
            Arc::new(StaticNeighbors::default()),
        )
        .unwrap();
        scanner.start();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let results = scanner.scan(cancel, &[22]).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(results[0].open, vec![22]);
    }

    #[test]
    fn hosts_finish_on_a_two_thread_blocking_pool() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let second = Ipv4Addr::new(10, 0, 0, 6);
        let net = FakeNetwork::new()
            .with_host(second, MacAddr::new(0x02, 0, 0, 0, 0, 0x06))
            .replying(22, SegmentKind::SynAck);

        let outcome = runtime.block_on(async {
            let scanner = SynScanner::with_parts(
                vec![net.remote_ip(), second],
                config(HostFailurePolicy::Report).with_timeout(Duration::from_millis(100)),
                Arc::new(net.clone()),
                Arc::new(OnLink),
                Arc::new(StaticNeighbors::default()),
            )
            .unwrap();
            scanner.start();
            let outcome = tokio::time::timeout(
                Duration::from_secs(5),
                scanner.scan(CancellationToken::new(), &[22]),
            )
            .await;
            scanner.shutdown().await;
            outcome
        });

        let mut results = outcome.expect("scan did not finish").unwrap();
        results.sort_by_key(|r| r.host);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].host, net.remote_ip());
        assert_eq!(results[1].host, second);
        assert!(results.iter().all(|r| r.open == vec![22]));
    }

    #[test]
    fn ephemeral_ports_are_nonzero() {
        assert_ne!(ephemeral_port().unwrap(), 0);
    }
}
