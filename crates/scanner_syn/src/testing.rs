//! In-memory network pieces for unit tests

use pnet::datalink::{dummy, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use pnet::packet::arp::{ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::arp::NeighborCache;
use crate::error::SynError;
use crate::packet::{arp_frame, SegmentKind, SynTemplate};
use crate::route::{Route, RouteTable};
use crate::transport::{FrameReceiver, FrameSender, PacketTransport};

pub(crate) const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub(crate) const LOCAL_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x02);

pub(crate) fn test_interface() -> NetworkInterface {
    let mut intf = dummy::dummy_interface(0);
    intf.mac = Some(LOCAL_MAC);
    intf.ips = vec![IpNetwork::V4(Ipv4Network::new(LOCAL_IP, 24).unwrap())];
    intf
}

pub(crate) fn test_route(destination: Ipv4Addr, gateway: Option<Ipv4Addr>) -> Route {
    Route {
        interface: test_interface(),
        source: LOCAL_IP,
        destination,
        gateway,
    }
}

/// Every destination is on-link through the test interface.
pub(crate) struct OnLink;

impl RouteTable for OnLink {
    fn route(&self, destination: Ipv4Addr) -> Result<Route, SynError> {
        Ok(test_route(destination, None))
    }
}

pub(crate) struct NoRoute;

impl RouteTable for NoRoute {
    fn route(&self, destination: Ipv4Addr) -> Result<Route, SynError> {
        Err(SynError::Route(destination, "network unreachable".into()))
    }
}

#[derive(Default)]
pub(crate) struct StaticNeighbors(HashMap<Ipv4Addr, MacAddr>);

impl StaticNeighbors {
    pub(crate) fn with(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.0.insert(ip, mac);
        self
    }
}

impl NeighborCache for StaticNeighbors {
    fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.0.get(&ip).copied()
    }
}

type Inbox = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// Receiver fed from a shared queue; reports a read timeout when empty.
pub(crate) struct ScriptedReceiver {
    inbox: Inbox,
    current: Vec<u8>,
    failures: usize,
    reads: usize,
}

impl ScriptedReceiver {
    pub(crate) fn new(frames: Vec<Vec<u8>>) -> Self {
        Self::shared(Arc::new(Mutex::new(frames.into())))
    }

    fn shared(inbox: Inbox) -> Self {
        Self {
            inbox,
            current: Vec::new(),
            failures: 0,
            reads: 0,
        }
    }

    pub(crate) fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads
    }
}

impl FrameReceiver for ScriptedReceiver {
    fn next_frame(&mut self) -> io::Result<&[u8]> {
        self.reads += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "scripted failure"));
        }
        let next = self.inbox.lock().unwrap().pop_front();
        match next {
            Some(frame) => {
                self.current = frame;
                Ok(&self.current)
            }
            None => {
                std::thread::sleep(Duration::from_millis(2));
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            }
        }
    }
}

/// Remote hosts behind a fake link. Each answers ARP for its address and
/// answers SYNs on scripted ports. Every opened handle sees every reply.
#[derive(Clone)]
pub(crate) struct FakeNetwork {
    remote_ip: Ipv4Addr,
    remote_mac: MacAddr,
    others: HashMap<Ipv4Addr, MacAddr>,
    arp_replies: bool,
    permitted: bool,
    replies: HashMap<u16, SegmentKind>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    inboxes: Arc<Mutex<Vec<Inbox>>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self {
            remote_ip: Ipv4Addr::new(10, 0, 0, 5),
            remote_mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x05),
            arp_replies: true,
            permitted: true,
            others: HashMap::new(),
            replies: HashMap::new(),
            sent: Arc::default(),
            inboxes: Arc::default(),
        }
    }

    /// Another host on the same link, answering the same ports.
    pub(crate) fn with_host(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.others.insert(ip, mac);
        self
    }

    pub(crate) fn replying(mut self, port: u16, kind: SegmentKind) -> Self {
        self.replies.insert(port, kind);
        self
    }

    pub(crate) fn without_arp_replies(mut self) -> Self {
        self.arp_replies = false;
        self
    }

    pub(crate) fn denied(mut self) -> Self {
        self.permitted = false;
        self
    }

    pub(crate) fn remote_ip(&self) -> Ipv4Addr {
        self.remote_ip
    }

    pub(crate) fn remote_mac(&self) -> MacAddr {
        self.remote_mac
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Destination ports of every SYN sent so far.
    pub(crate) fn probed_ports(&self) -> Vec<u16> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|frame| {
                let eth = EthernetPacket::new(frame)?;
                let ip = Ipv4Packet::new(eth.payload())?;
                let seg = TcpPacket::new(ip.payload())?;
                Some(seg.get_destination())
            })
            .collect()
    }

    fn mac_of(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        if ip == self.remote_ip {
            Some(self.remote_mac)
        } else {
            self.others.get(&ip).copied()
        }
    }

    fn answer(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let eth = EthernetPacket::new(frame)?;
        match eth.get_ethertype() {
            EtherTypes::Arp => {
                let arp = ArpPacket::new(eth.payload())?;
                if !self.arp_replies {
                    return None;
                }
                let target = arp.get_target_proto_addr();
                arp_frame(
                    ArpOperations::Reply,
                    self.mac_of(target)?,
                    arp.get_sender_hw_addr(),
                    target,
                    arp.get_sender_hw_addr(),
                    arp.get_sender_proto_addr(),
                )
                .ok()
            }
            EtherTypes::Ipv4 => {
                let ip = Ipv4Packet::new(eth.payload())?;
                let seg = TcpPacket::new(ip.payload())?;
                if seg.get_flags() != TcpFlags::SYN {
                    return None;
                }
                let remote_mac = self.mac_of(ip.get_destination())?;
                let kind = *self.replies.get(&seg.get_destination())?;
                SynTemplate {
                    src_mac: remote_mac,
                    dst_mac: eth.get_source(),
                    src_ip: ip.get_destination(),
                    dst_ip: ip.get_source(),
                    src_port: seg.get_destination(),
                }
                .build_segment(seg.get_source(), kind, 1, 1)
                .ok()
            }
            _ => None,
        }
    }
}

struct FakeSender {
    net: FakeNetwork,
}

impl FrameSender for FakeSender {
    fn send(&mut self, frame: &[u8]) -> Result<(), SynError> {
        self.net.sent.lock().unwrap().push(frame.to_vec());
        if let Some(reply) = self.net.answer(frame) {
            for inbox in self.net.inboxes.lock().unwrap().iter() {
                inbox.lock().unwrap().push_back(reply.clone());
            }
        }
        Ok(())
    }
}

impl PacketTransport for FakeNetwork {
    fn check_access(&self) -> Result<(), SynError> {
        if self.permitted {
            Ok(())
        } else {
            Err(SynError::NotPermitted)
        }
    }

    fn open(
        &self,
        _interface: &NetworkInterface,
    ) -> Result<(Box<dyn FrameSender>, Box<dyn FrameReceiver>), SynError> {
        let inbox = Inbox::default();
        self.inboxes.lock().unwrap().push(Arc::clone(&inbox));
        Ok((
            Box::new(FakeSender { net: self.clone() }),
            Box::new(ScriptedReceiver::shared(inbox)),
        ))
    }
}
