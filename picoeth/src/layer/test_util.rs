//! Addresses, frame builders and a stack fixture for the layer tests.
#![allow(dead_code)]
use crate::config::Config;
use crate::wire::{arp, ethernet, icmpv4, ipv4, tcp, udp, EthernetAddress, Ipv4Address};
use crate::wire::arp::Operation;
use crate::wire::ethernet::EtherType;
use crate::wire::ipv4::Protocol;

pub(crate) const MAC_ADDR_HOST: EthernetAddress = EthernetAddress([2, 0, 0, 0, 0, 1]);
pub(crate) const MAC_ADDR_PEER: EthernetAddress = EthernetAddress([2, 0, 0, 0, 0, 2]);
pub(crate) const MAC_ADDR_GATEWAY: EthernetAddress = EthernetAddress([2, 0, 0, 0, 0, 0xfe]);

pub(crate) const IP_ADDR_HOST: Ipv4Address = Ipv4Address::new(192, 168, 1, 20);
pub(crate) const IP_ADDR_PEER: Ipv4Address = Ipv4Address::new(192, 168, 1, 77);
pub(crate) const IP_ADDR_GATEWAY: Ipv4Address = Ipv4Address::new(192, 168, 1, 1);
/// Outside of the local subnet.
pub(crate) const IP_ADDR_REMOTE: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
pub(crate) const NETMASK: Ipv4Address = Ipv4Address::new(255, 255, 255, 0);

/// The configuration of the host under test.
pub(crate) fn config() -> Config {
    Config::new(IP_ADDR_HOST, NETMASK, IP_ADDR_GATEWAY).with_random_seed(0x5eed)
}

/// A stack on an `External` nic with a 600 byte buffer and four entries in every table.
///
/// The delay advances the ticker, so blocking operations see time pass.
macro_rules! test_stack {
    ($stack:ident, $nic:ident, $config:expr) => {
        let ticker = $crate::time::Ticker::new();
        let mut delay = |_: u32| ticker.tick_millisecond();
        let mut buffer = [0u8; 600];
        let mut neighbors = [None; 4];
        let mut udp_sessions = [None; 4];
        let mut udp_applications: [Option<&mut dyn $crate::layer::udp::Application<_>>; 4] =
            Default::default();
        let mut udp_ports = [None; 4];
        let mut tcp_sessions = [None; 4];
        let mut tcp_applications: [Option<&mut dyn $crate::layer::tcp::Application<_>>; 4] =
            Default::default();
        let mut tcp_ports = [None; 4];
        let $nic = $crate::nic::external::External::new(MAC_ADDR_HOST);
        #[allow(unused_mut)]
        let mut $stack = $crate::layer::Stack::new($nic, $config, $crate::layer::Storage {
            buffer: &mut buffer[..],
            neighbors: &mut neighbors[..],
            udp_sessions: &mut udp_sessions[..],
            udp_applications: &mut udp_applications[..],
            udp_ports: &mut udp_ports[..],
            tcp_sessions: &mut tcp_sessions[..],
            tcp_applications: &mut tcp_applications[..],
            tcp_ports: &mut tcp_ports[..],
            ticker: &ticker,
            delay: &mut delay,
        });
    };
}

fn ipv4_frame(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    protocol: Protocol,
    transport: impl FnOnce(&mut [u8]),
    transport_len: usize,
) -> Vec<u8> {
    let mut frame = vec![0; ethernet::HEADER_LEN + ipv4::HEADER_LEN + transport_len];
    ethernet::Repr {
        src_addr: src_mac,
        dst_addr: dst_mac,
        ethertype: EtherType::Ipv4,
    }.emit(ethernet::ethernet::new_unchecked_mut(&mut frame[..]));

    let ip = &mut frame[ethernet::HEADER_LEN..];
    transport(&mut ip[ipv4::HEADER_LEN..]);
    ipv4::Repr {
        src_addr,
        dst_addr,
        protocol,
        payload_len: transport_len,
        ttl: 64,
        ident: 0x1234,
    }.emit(ipv4::ipv4::new_unchecked_mut(ip));
    frame
}

/// An arp packet from a peer, broadcast if it is a request.
pub(crate) fn arp_frame(
    operation: Operation,
    source_hardware_addr: EthernetAddress,
    source_protocol_addr: Ipv4Address,
    target_hardware_addr: EthernetAddress,
    target_protocol_addr: Ipv4Address,
) -> Vec<u8> {
    let dst_addr = match operation {
        Operation::Request => EthernetAddress::BROADCAST,
        _ => target_hardware_addr,
    };
    let repr = arp::Repr {
        operation,
        source_hardware_addr,
        source_protocol_addr,
        target_hardware_addr,
        target_protocol_addr,
    };

    let mut frame = vec![0; ethernet::HEADER_LEN + repr.buffer_len()];
    ethernet::Repr {
        src_addr: source_hardware_addr,
        dst_addr,
        ethertype: EtherType::Arp,
    }.emit(ethernet::ethernet::new_unchecked_mut(&mut frame[..]));
    repr.emit(arp::arp::new_unchecked_mut(&mut frame[ethernet::HEADER_LEN..]));
    frame
}

pub(crate) fn udp_frame(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let repr = udp::Repr { src_port, dst_port, payload_len: payload.len() };
    ipv4_frame(src_mac, dst_mac, src_addr, dst_addr, Protocol::Udp, |bytes| {
        bytes[udp::HEADER_LEN..].copy_from_slice(payload);
        repr.emit(udp::udp::new_unchecked_mut(bytes), src_addr, dst_addr);
    }, repr.buffer_len())
}

/// A segment from the peer to the host, `payload_len` of the repr is taken from the payload.
pub(crate) fn tcp_frame(repr: tcp::Repr, src_addr: Ipv4Address, payload: &[u8]) -> Vec<u8> {
    tcp_frame_to(repr, src_addr, MAC_ADDR_HOST, IP_ADDR_HOST, payload)
}

pub(crate) fn tcp_frame_to(
    mut repr: tcp::Repr,
    src_addr: Ipv4Address,
    dst_mac: EthernetAddress,
    dst_addr: Ipv4Address,
    payload: &[u8],
) -> Vec<u8> {
    repr.payload_len = payload.len();
    ipv4_frame(MAC_ADDR_PEER, dst_mac, src_addr, dst_addr, Protocol::Tcp, |bytes| {
        bytes[repr.header_len()..].copy_from_slice(payload);
        repr.emit(tcp::tcp::new_unchecked_mut(bytes), src_addr, dst_addr);
    }, repr.buffer_len())
}

/// A tcp header from the peer, with everything but ports, flags and numbers at defaults.
pub(crate) fn tcp_repr(src_port: u16, dst_port: u16, flags: tcp::Flags, seq_number: u32, ack_number: u32)
    -> tcp::Repr
{
    tcp::Repr {
        src_port,
        dst_port,
        flags,
        seq_number,
        ack_number,
        window_len: 1024,
        max_seg_size: None,
        payload_len: 0,
    }
}

pub(crate) fn icmp_echo(src_addr: Ipv4Address, ident: u16, seq_no: u16, data: &[u8]) -> Vec<u8> {
    icmp_echo_to(src_addr, MAC_ADDR_HOST, IP_ADDR_HOST, ident, seq_no, data)
}

pub(crate) fn icmp_echo_to(
    src_addr: Ipv4Address,
    dst_mac: EthernetAddress,
    dst_addr: Ipv4Address,
    ident: u16,
    seq_no: u16,
    data: &[u8],
) -> Vec<u8> {
    let repr = icmpv4::Repr::EchoRequest { ident, seq_no, data_len: data.len() };
    ipv4_frame(MAC_ADDR_PEER, dst_mac, src_addr, dst_addr, Protocol::Icmp, |bytes| {
        bytes[repr.buffer_len() - data.len()..].copy_from_slice(data);
        repr.emit(icmpv4::icmpv4::new_unchecked_mut(bytes));
    }, repr.buffer_len())
}

pub(crate) fn parse_ipv4(frame: &[u8]) -> Option<(ethernet::Repr, ipv4::Repr, &[u8])> {
    let eth = ethernet::ethernet::new_checked(frame).ok()?;
    let eth_repr = ethernet::Repr::parse(eth).ok()?;
    if eth_repr.ethertype != EtherType::Ipv4 {
        return None;
    }
    let ip = ipv4::ipv4::new_checked(&frame[ethernet::HEADER_LEN..]).ok()?;
    let ip_repr = ipv4::Repr::parse(ip).ok()?;
    Some((eth_repr, ip_repr, ip.payload_slice()))
}

pub(crate) fn parse_udp(frame: &[u8]) -> Option<(ipv4::Repr, udp::Repr, &[u8])> {
    let (_, ip, transport) = parse_ipv4(frame)?;
    if ip.protocol != Protocol::Udp {
        return None;
    }
    let packet = udp::udp::new_checked(transport).ok()?;
    let repr = udp::Repr::parse(packet, ip.src_addr, ip.dst_addr).ok()?;
    Some((ip, repr, packet.payload_slice()))
}

pub(crate) fn parse_tcp(frame: &[u8]) -> Option<(ipv4::Repr, tcp::Repr, &[u8])> {
    let (_, ip, transport) = parse_ipv4(frame)?;
    if ip.protocol != Protocol::Tcp {
        return None;
    }
    let packet = tcp::tcp::new_checked(transport).ok()?;
    let repr = tcp::Repr::parse(packet, ip.src_addr, ip.dst_addr).ok()?;
    Some((ip, repr, packet.payload_slice()))
}

pub(crate) fn parse_arp(frame: &[u8]) -> Option<(ethernet::Repr, arp::Repr)> {
    let eth = ethernet::ethernet::new_checked(frame).ok()?;
    let eth_repr = ethernet::Repr::parse(eth).ok()?;
    if eth_repr.ethertype != EtherType::Arp {
        return None;
    }
    let packet = arp::arp::new_checked(&frame[ethernet::HEADER_LEN..]).ok()?;
    Some((eth_repr, arp::Repr::parse(packet).ok()?))
}
