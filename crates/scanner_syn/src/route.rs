//! Outbound route selection: interface, source address and next hop

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::trace;

use crate::error::SynError;

const PROC_ROUTE: &str = "/proc/net/route";
const RTF_UP: u32 = 0x0001;

/// Where frames for one destination leave the machine.
#[derive(Debug, Clone)]
pub struct Route {
    pub interface: NetworkInterface,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// `None` when the destination is on-link.
    pub gateway: Option<Ipv4Addr>,
}

impl Route {
    /// The address whose MAC the probes are framed for.
    pub fn next_hop(&self) -> Ipv4Addr {
        self.gateway.unwrap_or(self.destination)
    }

    pub fn is_loopback(&self) -> bool {
        self.interface.is_loopback() || self.source.is_loopback()
    }
}

pub trait RouteTable: Send + Sync {
    fn route(&self, destination: Ipv4Addr) -> Result<Route, SynError>;
}

/// Routes from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRoutes;

impl RouteTable for SystemRoutes {
    fn route(&self, destination: Ipv4Addr) -> Result<Route, SynError> {
        let source = source_address(destination)?;
        let table = match fs::read_to_string(PROC_ROUTE) {
            Ok(text) => Some(parse_route_table(&text)),
            Err(e) => {
                trace!(error = %e, "no kernel route table, falling back to interface networks");
                None
            }
        };
        select_route(datalink::interfaces(), source, table.as_deref(), destination)
    }
}

/// Source address the kernel would pick for `destination`.
///
/// Connecting a UDP socket sends nothing but fixes its local address.
fn source_address(destination: Ipv4Addr) -> Result<Ipv4Addr, SynError> {
    let route_err = |e: std::io::Error| SynError::Route(destination, e.to_string());
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(route_err)?;
    sock.connect((destination, 9)).map_err(route_err)?;
    match sock.local_addr().map_err(route_err)?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(_) => Err(SynError::Route(destination, "source address is not IPv4".into())),
    }
}

/// One usable line of `/proc/net/route`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub iface: String,
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub metric: u32,
}

impl RouteEntry {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.destination)
    }

    fn prefix_len(&self) -> u32 {
        u32::from(self.mask).count_ones()
    }
}

/// Parse the kernel route table. Routes that are down are left out.
pub fn parse_route_table(text: &str) -> Vec<RouteEntry> {
    text.lines().skip(1).filter_map(parse_route_line).collect()
}

fn parse_route_line(line: &str) -> Option<RouteEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return None;
    }
    let flags = u32::from_str_radix(fields[3], 16).ok()?;
    if flags & RTF_UP == 0 {
        return None;
    }
    Some(RouteEntry {
        iface: fields[0].to_string(),
        destination: hex_addr(fields[1])?,
        gateway: hex_addr(fields[2])?,
        metric: fields[6].parse().ok()?,
        mask: hex_addr(fields[7])?,
    })
}

/// Addresses are printed as the host-order value of a network-order word.
fn hex_addr(field: &str) -> Option<Ipv4Addr> {
    u32::from_str_radix(field, 16)
        .ok()
        .map(|raw| Ipv4Addr::from(raw.to_ne_bytes()))
}

/// Longest-prefix match on `iface`; ties go to the lower metric.
fn gateway_for(table: &[RouteEntry], iface: &str, destination: Ipv4Addr) -> Option<Option<Ipv4Addr>> {
    table
        .iter()
        .filter(|e| e.iface == iface && e.matches(destination))
        .max_by(|a, b| {
            a.prefix_len()
                .cmp(&b.prefix_len())
                .then(b.metric.cmp(&a.metric))
        })
        .map(|e| (!e.gateway.is_unspecified()).then_some(e.gateway))
}

fn select_route(
    interfaces: Vec<NetworkInterface>,
    source: Ipv4Addr,
    table: Option<&[RouteEntry]>,
    destination: Ipv4Addr,
) -> Result<Route, SynError> {
    let interface = interfaces
        .into_iter()
        .find(|i| i.ips.iter().any(|net| net.ip() == IpAddr::V4(source)))
        .ok_or_else(|| SynError::Route(destination, format!("no interface owns {source}")))?;

    let mut route = Route {
        interface,
        source,
        destination,
        gateway: None,
    };
    if route.is_loopback() {
        return Ok(route);
    }

    if let Some(gateway) = table.and_then(|t| gateway_for(t, &route.interface.name, destination)) {
        route.gateway = gateway;
        return Ok(route);
    }

    let on_link = route.interface.ips.iter().any(|net| match net {
        IpNetwork::V4(v4) => v4.contains(destination),
        IpNetwork::V6(_) => false,
    });
    if on_link {
        Ok(route)
    } else {
        Err(SynError::Route(
            destination,
            format!("not on-link for {} and no matching route", route.interface.name),
        ))
    }
}
