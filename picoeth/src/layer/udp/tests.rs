use core::cell::Cell;

use crate::layer::test_util::*;
use crate::layer::Error;
use crate::nic::Device;
use crate::wire::{arp, EthernetAddress, Ipv4Address};
use super::*;

#[derive(Default)]
struct Counters {
    opened: Cell<usize>,
    closed: Cell<usize>,
    handled: Cell<usize>,
}

/// Sends every datagram back.
struct Echo<'c>(&'c Counters);

impl<D: Device> Application<D> for Echo<'_> {
    fn on_open(&mut self, _: Socket, _: Ipv4Address) {
        self.0.opened.set(self.0.opened.get() + 1);
    }

    fn on_close(&mut self, _: Socket) {
        self.0.closed.set(self.0.closed.get() + 1);
    }

    fn on_handle(&mut self, packet: Packet<'_, '_, D>) {
        self.0.handled.set(self.0.handled.get() + 1);
        let len = packet.payload().len();
        packet.reply(len).unwrap();
    }
}

fn datagram(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    udp_frame(MAC_ADDR_PEER, MAC_ADDR_HOST, IP_ADDR_PEER, IP_ADDR_HOST, 5000, dst_port, payload)
}

#[test]
fn echo() {
    let counters = Counters::default();
    let mut echo = Echo(&counters);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();
    assert_eq!(stack.udp_open_port(7, 100, echo), Ok(()));

    stack.device_mut().push_frame(datagram(7, b"hello"));
    stack.update();

    assert_eq!(counters.opened.get(), 1);
    assert_eq!(counters.handled.get(), 1);
    assert_eq!(stack.udp().session_count(), 1);
    assert!(stack.udp().find(IP_ADDR_PEER, 7, 5000).is_some());

    let sent = stack.device_mut().take_sent();
    assert_eq!(sent.len(), 1);
    let (ip, repr, payload) = parse_udp(&sent[0]).unwrap();
    assert_eq!(ip.src_addr, IP_ADDR_HOST);
    assert_eq!(ip.dst_addr, IP_ADDR_PEER);
    assert_eq!((repr.src_port, repr.dst_port), (7, 5000));
    assert_eq!(payload, b"hello");

    // Same tuple, same session.
    stack.device_mut().push_frame(datagram(7, b"again"));
    stack.update();
    assert_eq!(counters.opened.get(), 1);
    assert_eq!(counters.handled.get(), 2);
    assert_eq!(stack.udp().session_count(), 1);
}

#[test]
fn port_collision() {
    let first = Counters::default();
    let second = Counters::default();
    let mut echo = Echo(&first);
    let mut other = Echo(&second);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();
    let other = stack.udp_register(&mut other).unwrap();

    assert_eq!(stack.udp_open_port(7, 100, echo), Ok(()));
    assert_eq!(stack.udp_open_port(7, 100, other), Err(Error::InUse));

    stack.device_mut().push_frame(datagram(7, b"x"));
    stack.update();
    assert_eq!(first.handled.get(), 1);
    assert_eq!(second.handled.get(), 0);
}

#[test]
fn closed_port_drops() {
    let counters = Counters::default();
    let mut echo = Echo(&counters);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();
    assert_eq!(stack.udp_open_port(7, 100, echo), Ok(()));
    assert!(stack.udp_close_port(7));
    assert!(!stack.udp_close_port(7));

    stack.device_mut().push_frame(datagram(7, b"x"));
    stack.update();
    assert_eq!(counters.handled.get(), 0);
    assert_eq!(stack.udp().session_count(), 0);
    assert!(stack.device().sent().is_empty());
}

#[test]
fn accepts_broadcast() {
    let counters = Counters::default();
    let mut echo = Echo(&counters);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();
    assert_eq!(stack.udp_open_port(7, 100, echo), Ok(()));

    stack.device_mut().push_frame(udp_frame(
        MAC_ADDR_PEER, EthernetAddress::BROADCAST,
        IP_ADDR_PEER, Ipv4Address::BROADCAST,
        5000, 7, b"anyone"));
    // Unicast to someone else.
    stack.device_mut().push_frame(udp_frame(
        MAC_ADDR_PEER, MAC_ADDR_HOST,
        IP_ADDR_PEER, IP_ADDR_GATEWAY,
        5000, 7, b"not you"));
    stack.update();

    assert_eq!(counters.handled.get(), 1);
    let (ip, _, payload) = parse_udp(&stack.device().sent()[0]).unwrap();
    assert_eq!(ip.dst_addr, IP_ADDR_PEER);
    assert_eq!(payload, b"anyone");
}

#[test]
fn connect_and_disconnect() {
    let counters = Counters::default();
    let mut echo = Echo(&counters);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();
    stack.arp_mut().add(MAC_ADDR_PEER, IP_ADDR_PEER);

    let socket = stack.udp_connect(IP_ADDR_PEER, 53, 100, Some(echo)).unwrap();
    let session = *stack.udp().get(socket).unwrap();
    assert_ne!(session.local_port, 0);
    assert!(session.close_port_on_termination);
    assert!(stack.udp().is_open(session.local_port));
    assert_eq!(counters.opened.get(), 0);

    assert_eq!(stack.udp_send_slice(socket, b"query"), Ok(()));
    let (_, repr, payload) = parse_udp(&stack.device().sent()[0]).unwrap();
    assert_eq!((repr.src_port, repr.dst_port), (session.local_port, 53));
    assert_eq!(payload, b"query");

    assert_eq!(stack.udp_disconnect(socket), Ok(()));
    assert_eq!(counters.closed.get(), 1);
    assert!(!stack.udp().is_open(session.local_port));
    assert!(stack.udp().get(socket).is_none());
    assert_eq!(stack.udp_disconnect(socket), Err(Error::Illegal));
}

#[test]
fn handles_are_reused() {
    test_stack!(stack, nic, config());
    stack.arp_mut().add(MAC_ADDR_PEER, IP_ADDR_PEER);

    let first = stack.udp_connect(IP_ADDR_PEER, 9, 100, None).unwrap();
    let second = stack.udp_connect(IP_ADDR_PEER, 10, 100, None).unwrap();
    assert_ne!(first, second);
    assert_eq!(stack.udp().get(first).map(|session| session.local_port), Some(0));

    assert_eq!(stack.udp_disconnect(first), Ok(()));
    let third = stack.udp_connect(IP_ADDR_PEER, 11, 100, None).unwrap();
    assert_eq!(third.index(), first.index());
    assert_eq!(stack.udp().get(first).map(|session| session.remote_port), Some(11));

    // Tuples are unique.
    assert_eq!(stack.udp_connect(IP_ADDR_PEER, 10, 100, None), Err(Error::InUse));
}

#[test]
fn unreachable_connect_rolls_back() {
    let counters = Counters::default();
    let mut echo = Echo(&counters);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();

    let result = stack.udp_connect_ex(IP_ADDR_PEER, 9, 10, Some(echo), 4000);
    assert_eq!(result, Err(Error::Unreachable));
    assert!(!stack.udp().is_open(4000));
    assert_eq!(stack.udp().session_count(), 0);
    assert_eq!(counters.closed.get(), 0);

    // Only arp requests went out.
    assert!(stack.device().sent().iter().all(|frame| parse_arp(frame).is_some()));
}

#[test]
fn send_requires_staged_packet() {
    test_stack!(stack, nic, config());
    stack.arp_mut().add(MAC_ADDR_PEER, IP_ADDR_PEER);
    let socket = stack.udp_connect(IP_ADDR_PEER, 9, 100, None).unwrap();

    assert_eq!(stack.udp_send(3), Err(Error::Illegal));

    // A received frame overwrites the staged one.
    stack.udp_start_packet(socket).unwrap()[..3].copy_from_slice(b"abc");
    stack.device_mut().push_frame(arp_frame(
        arp::Operation::Request,
        MAC_ADDR_GATEWAY, IP_ADDR_GATEWAY,
        EthernetAddress::UNSPECIFIED, IP_ADDR_PEER));
    stack.update();
    assert_eq!(stack.udp_send(3), Err(Error::Illegal));

    stack.udp_start_packet(socket).unwrap()[..3].copy_from_slice(b"abc");
    assert_eq!(stack.udp_send(3), Ok(()));
    assert_eq!(stack.udp_send(3), Err(Error::Illegal));

    let (_, repr, payload) = parse_udp(&stack.device().sent()[0]).unwrap();
    assert_eq!(repr.dst_port, 9);
    assert_eq!(payload, b"abc");
}

#[test]
fn oversized_datagram() {
    test_stack!(stack, nic, config());
    stack.arp_mut().add(MAC_ADDR_PEER, IP_ADDR_PEER);
    let socket = stack.udp_connect(IP_ADDR_PEER, 9, 100, None).unwrap();

    let data = [0u8; 600];
    assert_eq!(stack.udp_send_slice(socket, &data), Err(Error::BadSize));
    assert!(stack.device().sent().is_empty());
}

/// Answers a single datagram per peer, then frees the session.
struct Oneshot<'c>(&'c Counters);

impl<D: Device> Application<D> for Oneshot<'_> {
    fn on_open(&mut self, _: Socket, _: Ipv4Address) {
        self.0.opened.set(self.0.opened.get() + 1);
    }

    fn on_close(&mut self, _: Socket) {
        self.0.closed.set(self.0.closed.get() + 1);
    }

    fn on_handle(&mut self, mut packet: Packet<'_, '_, D>) {
        self.0.handled.set(self.0.handled.get() + 1);
        let socket = packet.socket();
        let len = packet.payload().len();
        let stack = packet.stack();
        stack.udp_start_packet(socket).unwrap();
        stack.udp_send(len).unwrap();
        stack.udp_disconnect(socket).unwrap();
    }
}

#[test]
fn disconnect_after_reply() {
    let counters = Counters::default();
    let mut oneshot = Oneshot(&counters);
    test_stack!(stack, nic, config());
    let oneshot = stack.udp_register(&mut oneshot).unwrap();
    assert_eq!(stack.udp_open_port(7, 100, oneshot), Ok(()));

    // More peers than session slots.
    for src_port in 5000..5006 {
        stack.device_mut().push_frame(udp_frame(
            MAC_ADDR_PEER, MAC_ADDR_HOST, IP_ADDR_PEER, IP_ADDR_HOST, src_port, 7, b"ping"));
        stack.update();
        assert_eq!(stack.udp().session_count(), 0);
    }

    assert_eq!(counters.opened.get(), 6);
    assert_eq!(counters.handled.get(), 6);
    assert_eq!(counters.closed.get(), 0);
    assert!(stack.udp().is_open(7));

    let sent = stack.device().sent();
    assert_eq!(sent.len(), 6);
    for (frame, src_port) in sent.iter().zip(5000..) {
        let (_, repr, payload) = parse_udp(frame).unwrap();
        assert_eq!((repr.src_port, repr.dst_port), (7, src_port));
        assert_eq!(payload, b"ping");
    }
}

#[test]
fn reconnects_with_same_application() {
    let counters = Counters::default();
    let mut echo = Echo(&counters);
    test_stack!(stack, nic, config());
    let echo = stack.udp_register(&mut echo).unwrap();
    stack.arp_mut().add(MAC_ADDR_PEER, IP_ADDR_PEER);

    for round in 1..=6 {
        let socket = stack.udp_connect(IP_ADDR_PEER, 53, 100, Some(echo)).unwrap();
        assert_eq!(stack.udp_disconnect(socket), Ok(()));
        assert_eq!(counters.closed.get(), round);
    }
    assert_eq!(stack.udp().session_count(), 0);
}
