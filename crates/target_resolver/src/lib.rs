//! Target Resolver - CIDR expansion and DNS resolution
//!
//! Takes a comma-separated target string and expands it into a
//! deduplicated list of IPv4 addresses in first-seen order. Supported
//! token forms:
//! - single IPv4 address: "1.2.3.4"
//! - CIDR: "192.168.1.0/24" (every address of the block)
//! - range: "192.168.1.1-192.168.1.10"
//! - hostname: "example.com" (IPv4 answers only)

use anyhow::{bail, Context, Result};
use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use tracing::debug;

/// Largest CIDR block expanded without an explicit override.
pub const MAX_CIDR_HOSTS: u64 = 4096;

/// Set to `1` to expand blocks larger than [`MAX_CIDR_HOSTS`].
pub const ALLOW_LARGE_CIDR_ENV: &str = "SWEEP_ALLOW_LARGE_CIDR";

#[derive(Debug, Clone)]
pub struct TargetResolver {
    max_cidr_hosts: Option<u64>,
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl TargetResolver {
    /// Guarded unless `SWEEP_ALLOW_LARGE_CIDR=1`.
    pub fn from_env() -> Self {
        let allow_large = std::env::var(ALLOW_LARGE_CIDR_ENV).is_ok_and(|v| v == "1");
        Self::with_limit((!allow_large).then_some(MAX_CIDR_HOSTS))
    }

    /// `None` expands blocks of any size.
    pub fn with_limit(max_cidr_hosts: Option<u64>) -> Self {
        Self { max_cidr_hosts }
    }

    /// Resolve a comma-separated target string into unique IPv4 addresses.
    /// Hostnames are resolved inside `spawn_blocking`.
    pub async fn resolve(&self, targets: &str) -> Result<Vec<Ipv4Addr>> {
        if targets.trim().is_empty() {
            bail!("No targets specified");
        }

        let mut found = Targets::default();
        let mut hostnames = Vec::new();

        for token in targets.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Ok(net) = token.parse::<Ipv4Net>() {
                self.expand_cidr(net, &mut found)?;
            } else if let Ok(ip) = token.parse::<IpAddr>() {
                match ip {
                    IpAddr::V4(v4) => found.push(v4),
                    IpAddr::V6(_) => bail!("IPv6 target {} is not supported", token),
                }
            } else if looks_like_range(token) {
                for ip in parse_ip_range(token)? {
                    found.push(ip);
                }
            } else {
                hostnames.push(token.to_string());
            }
        }

        if !hostnames.is_empty() {
            let resolved = tokio::task::spawn_blocking(move || {
                hostnames
                    .into_iter()
                    .map(|h| {
                        let addrs = lookup_ipv4(&h);
                        (h, addrs)
                    })
                    .collect::<Vec<_>>()
            })
            .await
            .context("Blocking DNS resolution failed")?;

            for (host, addrs) in resolved {
                let addrs = addrs.with_context(|| format!("Failed to resolve {}", host))?;
                debug!(%host, count = addrs.len(), "resolved hostname");
                for ip in addrs {
                    found.push(ip);
                }
            }
        }

        if found.ips.is_empty() {
            bail!("No valid IPv4 addresses found in targets");
        }
        Ok(found.ips)
    }

    fn expand_cidr(&self, net: Ipv4Net, found: &mut Targets) -> Result<()> {
        let count = 1u64 << (32 - u32::from(net.prefix_len()));
        if let Some(limit) = self.max_cidr_hosts {
            if count > limit {
                bail!(
                    "CIDR {} expands to {} hosts which exceeds the allowed limit of {}. Set {}=1 to override.",
                    net,
                    count,
                    limit,
                    ALLOW_LARGE_CIDR_ENV
                );
            }
        }
        let first = u32::from(net.network());
        let last = u32::from(net.broadcast());
        for raw in first..=last {
            found.push(Ipv4Addr::from(raw));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Targets {
    ips: Vec<Ipv4Addr>,
    seen: HashSet<Ipv4Addr>,
}

impl Targets {
    fn push(&mut self, ip: Ipv4Addr) {
        if self.seen.insert(ip) {
            self.ips.push(ip);
        }
    }
}

fn looks_like_range(token: &str) -> bool {
    token.contains('-') && token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

fn lookup_ipv4(host: &str) -> Result<Vec<Ipv4Addr>> {
    let addrs: Vec<Ipv4Addr> = (host, 0)
        .to_socket_addrs()?
        .filter_map(|a| match a.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect();
    if addrs.is_empty() {
        bail!("{} has no IPv4 address", host);
    }
    Ok(addrs)
}

fn parse_ip_range(range: &str) -> Result<Vec<Ipv4Addr>> {
    let (start, end) = range
        .split_once('-')
        .with_context(|| format!("Invalid IP range: {}", range))?;

    let start: Ipv4Addr = start
        .parse()
        .with_context(|| format!("Invalid start IP: {}", start))?;
    let end: Ipv4Addr = end
        .parse()
        .with_context(|| format!("Invalid end IP: {}", end))?;

    let (start, end) = (u32::from(start), u32::from(end));
    if start > end {
        bail!("Invalid IP range {}: start > end", range);
    }
    Ok((start..=end).map(Ipv4Addr::from).collect())
}
