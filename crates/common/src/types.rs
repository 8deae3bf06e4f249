//! Core data types for the sweep scanning engine
//!
//! `HostResult` keeps public fields so the report and output code can read
//! them directly. Mutation goes through `record`, which is what keeps the three
//! port sets duplicate-free and pairwise disjoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::SweepError;

/// Classification of a single probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    Unknown,
    Open,
    Closed,
    Filtered,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Unknown => "unknown",
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
        };
        f.write_str(s)
    }
}

/// One classification event emitted by a probe for the host's aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEvent {
    pub port: u16,
    pub state: PortState,
}

impl PortEvent {
    #[inline]
    #[must_use]
    pub const fn new(port: u16, state: PortState) -> Self {
        Self { port, state }
    }
}

/// Per-host aggregate of a scan.
///
/// `latency` stays zero until the first classification arrives; a zero
/// latency on a finished result means the host never answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    pub host: Ipv4Addr,
    pub open: Vec<u16>,
    pub filtered: Vec<u16>,
    pub closed: Vec<u16>,
    pub latency: Duration,
    /// Reason the host's sub-scan aborted, when failures are reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResult {
    #[inline]
    #[must_use]
    pub fn new(host: Ipv4Addr) -> Self {
        Self {
            host,
            open: Vec::new(),
            filtered: Vec::new(),
            closed: Vec::new(),
            latency: Duration::ZERO,
            error: None,
        }
    }

    /// Result standing in for a host whose sub-scan aborted.
    #[must_use]
    pub fn failed(host: Ipv4Addr, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(host)
        }
    }

    /// Record a classification observed `since` the host scan started.
    ///
    /// Returns false when the event was ignored: `Unknown` states, repeats,
    /// and ports already classified differently (first classification wins).
    pub fn record(&mut self, event: PortEvent, started: Instant) -> bool {
        if event.state == PortState::Unknown || self.state_of(event.port) != PortState::Unknown {
            return false;
        }

        if self.latency.is_zero() {
            self.latency = started.elapsed().max(Duration::from_nanos(1));
        }
        let set = match event.state {
            PortState::Open => &mut self.open,
            PortState::Closed => &mut self.closed,
            _ => &mut self.filtered,
        };
        set.push(event.port);
        true
    }

    /// State the port ended up in, `Unknown` when it is in no set.
    #[must_use]
    pub fn state_of(&self, port: u16) -> PortState {
        if self.open.contains(&port) {
            PortState::Open
        } else if self.closed.contains(&port) {
            PortState::Closed
        } else if self.filtered.contains(&port) {
            PortState::Filtered
        } else {
            PortState::Unknown
        }
    }

    #[inline]
    #[must_use]
    pub fn is_up(&self) -> bool {
        !self.latency.is_zero()
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    #[inline]
    #[must_use]
    pub fn classified_count(&self) -> usize {
        self.open.len() + self.closed.len() + self.filtered.len()
    }
}

/// Probing strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanType {
    Connect,
    Syn,
}

impl ScanType {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanType::Connect => "connect",
            ScanType::Syn => "syn",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connect" | "tcp" => Ok(ScanType::Connect),
            "syn" => Ok(ScanType::Syn),
            other => Err(SweepError::Config(format!("unknown scan type '{}'", other))),
        }
    }
}

/// What happens to a host whose sub-scan hits a structural failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostFailurePolicy {
    /// Produce no result for the host at all.
    Drop,
    /// Produce an empty result carrying the failure reason.
    #[default]
    Report,
}

/// Settings for one scan invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub timeout: Duration,
    pub concurrency: usize,
    pub scan_type: ScanType,
    pub failure_policy: HostFailurePolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            concurrency: 1000,
            scan_type: ScanType::Syn,
            failure_policy: HostFailurePolicy::Report,
        }
    }
}

impl ScannerConfig {
    /// Fast preset: short timeout, wide pool.
    #[inline]
    #[must_use]
    pub fn fast() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            concurrency: 2000,
            ..Self::default()
        }
    }

    /// Thorough preset: long timeout for slow links.
    #[inline]
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            concurrency: 500,
            ..Self::default()
        }
    }

    /// Stealth preset: narrow pool keeps the probe rate low.
    #[inline]
    #[must_use]
    pub fn stealth() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            concurrency: 100,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_scan_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = scan_type;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_failure_policy(mut self, policy: HostFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.concurrency == 0 {
            return Err(SweepError::Config("concurrency must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(SweepError::Config("timeout must be non-zero".into()));
        }
        Ok(())
    }
}
