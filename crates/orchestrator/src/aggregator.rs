//! Per-host result aggregation
//!
//! Each host gets exactly one aggregator, which is the only writer of that
//! host's `HostResult` for the whole scan.

use std::net::Ipv4Addr;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;

use sweep_common::{HostResult, PortEvent};

pub struct HostAggregator {
    result: HostResult,
    started: Instant,
}

impl HostAggregator {
    /// Start the host's latency clock now.
    pub fn new(host: Ipv4Addr) -> Self {
        Self {
            result: HostResult::new(host),
            started: Instant::now(),
        }
    }

    pub fn host(&self) -> Ipv4Addr {
        self.result.host
    }

    pub fn record(&mut self, event: PortEvent) -> bool {
        let accepted = self.result.record(event, self.started);
        if !accepted {
            trace!(host = %self.result.host, port = event.port, state = %event.state, "ignored event");
        }
        accepted
    }

    pub fn finish(self) -> HostResult {
        self.result
    }

    /// Run the aggregator as its own task.
    ///
    /// The task drains `events` until `finish` fires (or every sender is
    /// gone), then picks up anything already queued and returns the result.
    pub fn spawn(
        mut self,
        mut events: mpsc::UnboundedReceiver<PortEvent>,
        mut finish: oneshot::Receiver<()>,
    ) -> JoinHandle<HostResult> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = events.recv() => match event {
                        Some(event) => {
                            self.record(event);
                        }
                        None => break,
                    },
                    _ = &mut finish => {
                        while let Ok(event) = events.try_recv() {
                            self.record(event);
                        }
                        break;
                    }
                }
            }
            self.finish()
        })
    }
}
