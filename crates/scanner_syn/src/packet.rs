//! Frame building and parsing for SYN probes and ARP
//!
//! Everything here works on whole Ethernet frames so the same bytes can go
//! straight to a datalink channel.

use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

use sweep_common::{PortEvent, PortState};

use crate::error::SynError;

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;
pub const ARP_LEN: usize = 28;
/// Shortest Ethernet frame on the wire, FCS excluded.
pub const MIN_ETH_FRAME: usize = 60;
pub const SYN_FRAME_LEN: usize = ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN;

const PROBE_TTL: u8 = 255;
const PROBE_WINDOW: u16 = 1024;

fn too_small(layer: &str) -> SynError {
    SynError::Packet(format!("buffer too small for {layer} header"))
}

/// Control bits a built segment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Syn,
    SynAck,
    RstAck,
    Ack,
}

impl SegmentKind {
    fn apply(self, seg: &mut MutableTcpPacket<'_>) {
        match self {
            SegmentKind::Syn => seg.set_flags(TcpFlags::SYN),
            SegmentKind::SynAck => seg.set_flags(TcpFlags::SYN | TcpFlags::ACK),
            SegmentKind::RstAck => seg.set_flags(TcpFlags::RST | TcpFlags::ACK),
            SegmentKind::Ack => seg.set_flags(TcpFlags::ACK),
        }
    }
}

/// Fixed addressing for every probe sent to one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynTemplate {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
}

impl SynTemplate {
    /// SYN frame for `dst_port` with a random sequence number and IP id.
    pub fn build(&self, dst_port: u16) -> Result<Vec<u8>, SynError> {
        self.build_segment(dst_port, SegmentKind::Syn, rand::random(), rand::random())
    }

    /// Segment with explicit control bits, sequence number and IP id.
    pub fn build_segment(
        &self,
        dst_port: u16,
        kind: SegmentKind,
        seq: u32,
        ip_id: u16,
    ) -> Result<Vec<u8>, SynError> {
        let mut buf = vec![0u8; SYN_FRAME_LEN];

        {
            let mut eth = MutableEthernetPacket::new(&mut buf).ok_or_else(|| too_small("ethernet"))?;
            eth.set_destination(self.dst_mac);
            eth.set_source(self.src_mac);
            eth.set_ethertype(EtherTypes::Ipv4);
        }

        {
            let mut seg = MutableTcpPacket::new(&mut buf[ETH_HDR_LEN + IPV4_HDR_LEN..])
                .ok_or_else(|| too_small("tcp"))?;
            seg.set_source(self.src_port);
            seg.set_destination(dst_port);
            seg.set_sequence(seq);
            seg.set_acknowledgement(0);
            seg.set_data_offset(5);
            kind.apply(&mut seg);
            seg.set_window(PROBE_WINDOW);
            seg.set_urgent_ptr(0);
            let checksum = tcp::ipv4_checksum(&seg.to_immutable(), &self.src_ip, &self.dst_ip);
            seg.set_checksum(checksum);
        }

        {
            let mut ip = MutableIpv4Packet::new(&mut buf[ETH_HDR_LEN..ETH_HDR_LEN + IPV4_HDR_LEN])
                .ok_or_else(|| too_small("ipv4"))?;
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((IPV4_HDR_LEN + TCP_HDR_LEN) as u16);
            ip.set_identification(ip_id);
            ip.set_flags(Ipv4Flags::DontFragment);
            ip.set_ttl(PROBE_TTL);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
            ip.set_source(self.src_ip);
            ip.set_destination(self.dst_ip);
            let checksum = ipv4::checksum(&ip.to_immutable());
            ip.set_checksum(checksum);
        }

        Ok(buf)
    }
}

/// Broadcast "who has `target_ip`" from the given interface addresses.
pub fn build_arp_request(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) -> Result<Vec<u8>, SynError> {
    arp_frame(
        ArpOperations::Request,
        src_mac,
        MacAddr::broadcast(),
        src_ip,
        MacAddr::zero(),
        target_ip,
    )
}

pub(crate) fn arp_frame(
    operation: ArpOperation,
    sender_mac: MacAddr,
    eth_dst: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Result<Vec<u8>, SynError> {
    let mut buf = vec![0u8; MIN_ETH_FRAME];

    {
        let mut eth = MutableEthernetPacket::new(&mut buf).ok_or_else(|| too_small("ethernet"))?;
        eth.set_destination(eth_dst);
        eth.set_source(sender_mac);
        eth.set_ethertype(EtherTypes::Arp);
    }

    let mut arp = MutableArpPacket::new(&mut buf[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN])
        .ok_or_else(|| too_small("arp"))?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(operation);
    arp.set_sender_hw_addr(sender_mac);
    arp.set_sender_proto_addr(sender_ip);
    arp.set_target_hw_addr(target_mac);
    arp.set_target_proto_addr(target_ip);

    Ok(buf)
}

/// Sender protocol and hardware address of an ARP reply. Requests and
/// other frames yield `None`.
pub fn parse_arp_reply(frame: &[u8]) -> Option<(Ipv4Addr, MacAddr)> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    Some((arp.get_sender_proto_addr(), arp.get_sender_hw_addr()))
}

/// The reverse direction of one host's probes: remote host back to our
/// source address and ephemeral port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyFlow {
    pub remote: Ipv4Addr,
    pub local: Ipv4Addr,
    pub local_port: u16,
}

impl ReplyFlow {
    /// Classify a captured frame.
    ///
    /// Frames outside the flow, and in-flow segments that are neither
    /// SYN+ACK nor RST, yield `None`.
    pub fn classify(&self, frame: &[u8]) -> Option<PortEvent> {
        let eth = EthernetPacket::new(frame)?;
        if eth.get_ethertype() != EtherTypes::Ipv4 {
            return None;
        }

        let ip = Ipv4Packet::new(eth.payload())?;
        if ip.get_source() != self.remote
            || ip.get_destination() != self.local
            || ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
        {
            return None;
        }

        let seg = TcpPacket::new(ip.payload())?;
        if seg.get_destination() != self.local_port {
            return None;
        }

        let flags = seg.get_flags();
        let port = seg.get_source();
        if flags & TcpFlags::SYN != 0 && flags & TcpFlags::ACK != 0 {
            Some(PortEvent::new(port, PortState::Open))
        } else if flags & TcpFlags::RST != 0 {
            Some(PortEvent::new(port, PortState::Closed))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> SynTemplate {
        SynTemplate {
            src_mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x01),
            dst_mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x02),
            src_ip: Ipv4Addr::new(192, 168, 1, 1),
            dst_ip: Ipv4Addr::new(192, 168, 1, 2),
            src_port: 40123,
        }
    }

    /// The reply `template().dst_ip` would send back from `port`.
    fn reply(port: u16, kind: SegmentKind) -> Vec<u8> {
        let t = template();
        SynTemplate {
            src_mac: t.dst_mac,
            dst_mac: t.src_mac,
            src_ip: t.dst_ip,
            dst_ip: t.src_ip,
            src_port: port,
        }
        .build_segment(t.src_port, kind, 7, 1)
        .unwrap()
    }

    fn flow() -> ReplyFlow {
        let t = template();
        ReplyFlow {
            remote: t.dst_ip,
            local: t.src_ip,
            local_port: t.src_port,
        }
    }

    #[test]
    fn syn_frame_layout_and_checksums() {
        let t = template();
        let frame = t.build(443).unwrap();
        assert_eq!(frame.len(), SYN_FRAME_LEN);

        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_source(), t.src_mac);
        assert_eq!(eth.get_destination(), t.dst_mac);
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv4);

        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_version(), 4);
        assert_eq!(ip.get_total_length(), 40);
        assert_eq!(ip.get_ttl(), PROBE_TTL);
        assert_eq!(ip.get_source(), t.src_ip);
        assert_eq!(ip.get_destination(), t.dst_ip);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let seg = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(seg.get_source(), 40123);
        assert_eq!(seg.get_destination(), 443);
        assert_eq!(seg.get_flags(), TcpFlags::SYN);
        assert_eq!(seg.get_data_offset(), 5);
        assert_eq!(
            seg.get_checksum(),
            tcp::ipv4_checksum(&seg, &t.src_ip, &t.dst_ip)
        );
    }

    #[test]
    fn syn_ack_is_open_and_rst_is_closed() {
        let f = flow();
        assert_eq!(
            f.classify(&reply(22, SegmentKind::SynAck)),
            Some(PortEvent::new(22, PortState::Open))
        );
        assert_eq!(
            f.classify(&reply(23, SegmentKind::RstAck)),
            Some(PortEvent::new(23, PortState::Closed))
        );
        assert_eq!(f.classify(&reply(24, SegmentKind::Ack)), None);
    }

    #[test]
    fn frames_outside_the_flow_are_ignored() {
        let mut other_port = flow();
        other_port.local_port = 1;
        assert_eq!(other_port.classify(&reply(22, SegmentKind::SynAck)), None);

        let mut other_host = flow();
        other_host.remote = Ipv4Addr::new(192, 168, 1, 99);
        assert_eq!(other_host.classify(&reply(22, SegmentKind::SynAck)), None);

        // Our own outgoing probe travels the opposite way.
        assert_eq!(flow().classify(&template().build(22).unwrap()), None);

        assert_eq!(flow().classify(&[0u8; 10]), None);
    }

    #[test]
    fn arp_request_targets_broadcast() {
        let src_mac = MacAddr::new(0x02, 0xaa, 0, 0, 0, 1);
        let frame = build_arp_request(src_mac, Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();
        assert_eq!(frame.len(), MIN_ETH_FRAME);

        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_ethertype(), EtherTypes::Arp);

        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(arp.get_target_hw_addr(), MacAddr::zero());
    }

    #[test]
    fn only_arp_replies_are_parsed() {
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let gateway_mac = MacAddr::new(0x02, 0, 0, 0, 0, 1);
        let local_mac = MacAddr::new(0x02, 0xaa, 0, 0, 0, 1);

        let answer = arp_frame(
            ArpOperations::Reply,
            gateway_mac,
            local_mac,
            gateway,
            local_mac,
            Ipv4Addr::new(10, 0, 0, 2),
        )
        .unwrap();
        assert_eq!(parse_arp_reply(&answer), Some((gateway, gateway_mac)));

        // The gateway asking about someone else names itself as sender too.
        let question = build_arp_request(gateway_mac, gateway, Ipv4Addr::new(10, 0, 0, 9)).unwrap();
        assert_eq!(parse_arp_reply(&question), None);

        assert_eq!(parse_arp_reply(&template().build(80).unwrap()), None);
    }
}
