//! SYN scanning over raw Ethernet frames
//!
//! Each host is scanned with its own capture/injection handle on the
//! outbound interface:
//! - `route` picks the interface, source address and next hop
//! - `arp` resolves the next hop's MAC (neighbor table, then active ARP)
//! - `packet` builds SYN/ARP frames and classifies replies
//! - `transport` wraps the datalink channel and the privilege check
//! - `syn` ties them together behind the shared `Scanner` contract

pub mod arp;
pub mod error;
pub mod packet;
pub mod route;
pub mod syn;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use arp::{AddressResolver, NeighborCache, ProcNeighborCache};
pub use error::SynError;
pub use route::{Route, RouteTable, SystemRoutes};
pub use syn::{SynEngine, SynScanner};
pub use transport::{DatalinkTransport, FrameReceiver, FrameSender, Frames, PacketTransport};

