use crate::config::Config;
use crate::layer::test_util::*;
use crate::wire::{icmpv4, EthernetAddress, Ipv4Address};
use crate::wire::ipv4::Protocol;

#[test]
fn answers_echo() {
    test_stack!(stack, nic, config());
    stack.device_mut().push_frame(icmp_echo(IP_ADDR_PEER, 0x4242, 7, b"ping data"));
    stack.update();

    let sent = stack.device_mut().take_sent();
    assert_eq!(sent.len(), 1);
    let (eth, ip, payload) = parse_ipv4(&sent[0]).unwrap();
    assert_eq!(eth.dst_addr, MAC_ADDR_PEER);
    assert_eq!(ip.src_addr, IP_ADDR_HOST);
    assert_eq!(ip.dst_addr, IP_ADDR_PEER);
    assert_eq!(ip.protocol, Protocol::Icmp);

    let packet = icmpv4::icmpv4::new_checked(payload).unwrap();
    assert_eq!(icmpv4::Repr::parse(packet), Ok(icmpv4::Repr::EchoReply {
        ident: 0x4242,
        seq_no: 7,
        data_len: 9,
    }));
    assert_eq!(packet.echo_data(), b"ping data");
}

#[test]
fn answers_remote_through_gateway() {
    test_stack!(stack, nic, config());
    stack.device_mut().push_frame(icmp_echo(IP_ADDR_REMOTE, 1, 1, &[]));
    stack.update();

    // The sender's hardware address is learned for the gateway.
    assert_eq!(stack.arp().lookup(IP_ADDR_GATEWAY), Some(MAC_ADDR_PEER));
    let (eth, ip, _) = parse_ipv4(&stack.device().sent()[0]).unwrap();
    assert_eq!(eth.dst_addr, MAC_ADDR_PEER);
    assert_eq!(ip.dst_addr, IP_ADDR_REMOTE);
}

#[test]
fn ignores_other_destinations() {
    let config = Config { ip: IP_ADDR_GATEWAY, ..config() };
    test_stack!(stack, nic, config);
    stack.device_mut().push_frame(icmp_echo(IP_ADDR_PEER, 1, 1, b"x"));
    stack.update();

    assert!(stack.device().sent().is_empty());
    assert!(stack.arp().lookup(IP_ADDR_PEER).is_none());
}

#[test]
fn ignores_bad_checksum() {
    test_stack!(stack, nic, config());
    let mut frame = icmp_echo(IP_ADDR_PEER, 1, 1, b"abc");
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    stack.device_mut().push_frame(frame);
    stack.update();

    assert!(stack.device().sent().is_empty());
}

#[test]
fn ignores_broadcast() {
    test_stack!(stack, nic, config());
    stack.device_mut().push_frame(icmp_echo_to(
        IP_ADDR_PEER, EthernetAddress::BROADCAST, Ipv4Address::BROADCAST, 1, 1, b"anyone"));
    stack.update();

    assert!(stack.device().sent().is_empty());
    assert!(stack.arp().lookup(IP_ADDR_PEER).is_none());
}
