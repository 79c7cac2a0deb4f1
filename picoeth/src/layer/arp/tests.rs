use crate::layer::test_util::*;
use crate::layer::Error;
use crate::wire::arp::Operation;
use crate::wire::EthernetAddress;
use super::*;

#[test]
fn entries_expire() {
    let mut slots = [None; 2];
    let mut cache = Cache::new(&mut slots[..], 30);
    assert!(cache.add(MAC_ADDR_PEER, IP_ADDR_PEER));
    assert!(cache.add(MAC_ADDR_GATEWAY, IP_ADDR_GATEWAY));

    for _ in 0..30 {
        cache.tick();
        // Refreshed every tick, never expires.
        assert!(cache.add(MAC_ADDR_GATEWAY, IP_ADDR_GATEWAY));
    }
    assert_eq!(cache.lookup(IP_ADDR_PEER), Some(MAC_ADDR_PEER));
    assert_eq!(cache.get(IP_ADDR_PEER).map(Neighbor::ttl), Some(0));

    cache.tick();
    assert!(cache.get(IP_ADDR_PEER).is_none());
    assert_eq!(cache.lookup(IP_ADDR_GATEWAY), Some(MAC_ADDR_GATEWAY));
}

#[test]
fn saturated_cache() {
    let mut slots = [None; 2];
    let mut cache = Cache::new(&mut slots[..], 30);
    assert!(cache.add(MAC_ADDR_PEER, IP_ADDR_PEER));
    assert!(cache.add(MAC_ADDR_GATEWAY, IP_ADDR_GATEWAY));
    assert!(cache.is_full());

    assert!(!cache.add(EthernetAddress([2, 0, 0, 0, 0, 9]), IP_ADDR_REMOTE));
    assert!(cache.get(IP_ADDR_REMOTE).is_none());
    assert_eq!(cache.iter().count(), 2);

    // Refreshing a known address works even when full.
    cache.tick();
    assert!(cache.add(MAC_ADDR_PEER, IP_ADDR_PEER));
    assert_eq!(cache.get(IP_ADDR_PEER).map(Neighbor::ttl), Some(30));
    assert!(cache.is_full());
}

#[test]
fn never_learns_special_addresses() {
    let mut slots = [None; 2];
    let mut cache = Cache::new(&mut slots[..], 30);
    assert!(!cache.add(MAC_ADDR_PEER, Ipv4Address::UNSPECIFIED));
    assert!(!cache.add(MAC_ADDR_PEER, Ipv4Address::BROADCAST));
    assert_eq!(cache.iter().count(), 0);
}

#[test]
fn answers_request() {
    test_stack!(stack, nic, config());
    stack.device_mut().push_frame(arp_frame(
        Operation::Request,
        MAC_ADDR_PEER, IP_ADDR_PEER,
        EthernetAddress::UNSPECIFIED, IP_ADDR_HOST));
    stack.update();

    assert_eq!(stack.arp().lookup(IP_ADDR_PEER), Some(MAC_ADDR_PEER));

    let sent = stack.device_mut().take_sent();
    assert_eq!(sent.len(), 1);
    let (eth, reply) = parse_arp(&sent[0]).unwrap();
    assert_eq!(eth.dst_addr, MAC_ADDR_PEER);
    assert_eq!(eth.src_addr, MAC_ADDR_HOST);
    assert_eq!(reply.operation, Operation::Reply);
    assert_eq!(reply.source_hardware_addr, MAC_ADDR_HOST);
    assert_eq!(reply.source_protocol_addr, IP_ADDR_HOST);
    assert_eq!(reply.target_hardware_addr, MAC_ADDR_PEER);
    assert_eq!(reply.target_protocol_addr, IP_ADDR_PEER);
}

#[test]
fn ignores_requests_for_others() {
    test_stack!(stack, nic, config());
    stack.device_mut().push_frame(arp_frame(
        Operation::Request,
        MAC_ADDR_PEER, IP_ADDR_PEER,
        EthernetAddress::UNSPECIFIED, IP_ADDR_GATEWAY));
    stack.update();

    assert!(stack.device().sent().is_empty());
    assert!(stack.arp().lookup(IP_ADDR_PEER).is_none());
}

/// Answers requests for the peer and the gateway.
fn responder(frame: &[u8]) -> Option<Vec<u8>> {
    let (_, request) = parse_arp(frame)?;
    if request.operation != Operation::Request {
        return None;
    }
    let mac = match request.target_protocol_addr {
        addr if addr == IP_ADDR_PEER => MAC_ADDR_PEER,
        addr if addr == IP_ADDR_GATEWAY => MAC_ADDR_GATEWAY,
        _ => return None,
    };
    Some(arp_frame(
        Operation::Reply,
        mac, request.target_protocol_addr,
        request.source_hardware_addr, request.source_protocol_addr))
}

#[test]
fn resolves_neighbor() {
    test_stack!(stack, nic, config());
    stack.device_mut().set_responder(responder);

    assert_eq!(stack.ensure_neighbor(IP_ADDR_PEER, 100), Ok(()));
    assert_eq!(stack.arp().lookup(IP_ADDR_PEER), Some(MAC_ADDR_PEER));

    let sent = stack.device_mut().take_sent();
    assert_eq!(sent.len(), 1);
    let (eth, request) = parse_arp(&sent[0]).unwrap();
    assert_eq!(eth.dst_addr, EthernetAddress::BROADCAST);
    assert_eq!(request.operation, Operation::Request);
    assert_eq!(request.target_protocol_addr, IP_ADDR_PEER);

    // Cached now, nothing more to send.
    assert_eq!(stack.ensure_neighbor(IP_ADDR_PEER, 100), Ok(()));
    assert!(stack.device().sent().is_empty());
}

#[test]
fn remote_resolves_gateway() {
    test_stack!(stack, nic, config());
    stack.device_mut().set_responder(responder);

    assert_eq!(stack.ensure_neighbor(IP_ADDR_REMOTE, 100), Ok(()));
    assert_eq!(stack.arp().lookup(IP_ADDR_GATEWAY), Some(MAC_ADDR_GATEWAY));
    assert!(stack.arp().lookup(IP_ADDR_REMOTE).is_none());

    let (_, request) = parse_arp(&stack.device().sent()[0]).unwrap();
    assert_eq!(request.target_protocol_addr, IP_ADDR_GATEWAY);
}

#[test]
fn unanswered_resolution() {
    test_stack!(stack, nic, config());

    assert_eq!(stack.ensure_neighbor(IP_ADDR_PEER, 1200), Err(Error::Unreachable));
    // At the start and after 500 and 1000 milliseconds.
    assert_eq!(stack.device().sent().len(), 3);
    assert!(stack.arp().lookup(IP_ADDR_PEER).is_none());
}

#[test]
fn full_cache_can_not_resolve() {
    test_stack!(stack, nic, config());
    for last in 100..104 {
        assert!(stack.arp_mut().add(MAC_ADDR_GATEWAY, Ipv4Address::new(192, 168, 1, last)));
    }

    assert_eq!(stack.ensure_neighbor(IP_ADDR_PEER, 100), Err(Error::Exhausted));
    assert!(stack.device().sent().is_empty());
}
