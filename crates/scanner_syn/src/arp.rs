//! Link-layer address resolution
//!
//! The neighbor cache is only ever read. Addresses learned through an
//! active ARP exchange are handed back to the caller and not stored.

use pnet::util::MacAddr;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::SynError;
use crate::packet::{build_arp_request, parse_arp_reply};
use crate::route::Route;
use crate::transport::{FrameReceiver, FrameSender, Frames};

const PROC_ARP: &str = "/proc/net/arp";
const ATF_COM: u32 = 0x02;

pub trait NeighborCache: Send + Sync {
    fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr>;
}

/// The kernel neighbor table, re-read on every lookup.
#[derive(Debug, Clone)]
pub struct ProcNeighborCache {
    path: PathBuf,
}

impl Default for ProcNeighborCache {
    fn default() -> Self {
        Self {
            path: PathBuf::from(PROC_ARP),
        }
    }
}

impl ProcNeighborCache {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NeighborCache for ProcNeighborCache {
    fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_neighbor_table(&text)
                .into_iter()
                .find_map(|(addr, mac)| (addr == ip).then_some(mac)),
            Err(e) => {
                trace!(path = %self.path.display(), error = %e, "neighbor table unreadable");
                None
            }
        }
    }
}

/// Complete entries of `/proc/net/arp`.
pub fn parse_neighbor_table(text: &str) -> Vec<(Ipv4Addr, MacAddr)> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let ip: Ipv4Addr = fields[0].parse().ok()?;
            let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).ok()?;
            let mac: MacAddr = fields[3].parse().ok()?;
            (flags & ATF_COM != 0 && mac != MacAddr::zero()).then_some((ip, mac))
        })
        .collect()
}

/// Resolves a destination to the MAC its frames must carry.
#[derive(Clone)]
pub struct AddressResolver {
    cache: Arc<dyn NeighborCache>,
    timeout: Duration,
}

impl AddressResolver {
    pub fn new(cache: Arc<dyn NeighborCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Neighbor cache first (destination, then next hop), then one ARP
    /// request for the next hop, waiting up to the timeout for its reply.
    pub fn resolve(
        &self,
        route: &Route,
        tx: &mut dyn FrameSender,
        rx: &mut dyn FrameReceiver,
    ) -> Result<MacAddr, SynError> {
        if route.is_loopback() {
            return Ok(MacAddr::zero());
        }

        let next_hop = route.next_hop();
        let cached = self
            .cache
            .lookup(route.destination)
            .or_else(|| (next_hop != route.destination).then(|| self.cache.lookup(next_hop)).flatten());
        if let Some(mac) = cached {
            trace!(host = %route.destination, %mac, "neighbor cache hit");
            return Ok(mac);
        }

        let src_mac = route.interface.mac.ok_or_else(|| {
            SynError::Transport(format!("{} has no hardware address", route.interface.name))
        })?;
        tx.send(&build_arp_request(src_mac, route.source, next_hop)?)?;

        let deadline = Instant::now() + self.timeout;
        for frame in Frames::until(rx, deadline) {
            if let Some((sender, mac)) = parse_arp_reply(&frame) {
                if sender == next_hop {
                    debug!(%next_hop, %mac, "resolved via ARP");
                    return Ok(mac);
                }
            }
        }
        Err(SynError::ArpTimeout(next_hop))
    }
}
