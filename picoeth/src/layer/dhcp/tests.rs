use crate::config::Config;
use crate::layer::test_util::*;
use crate::wire::{dhcp, EthernetAddress, Ipv4Address};
use crate::wire::dhcp::{MessageType, OpCode};
use super::*;

const SERVER: Ipv4Address = IP_ADDR_GATEWAY;
const OFFERED: Ipv4Address = Ipv4Address::new(192, 168, 1, 100);
const NAME_SERVER: Ipv4Address = Ipv4Address::new(192, 168, 1, 53);

fn unconfigured() -> Config {
    Config::default().with_random_seed(0x5eed)
}

/// A broadcast reply of the server.
fn reply(message_type: MessageType, transaction_id: u32, lease: u32, renewal: Option<u32>) -> Vec<u8> {
    reply_identified(Some(SERVER), message_type, transaction_id, lease, renewal)
}

/// A broadcast reply, with the server identifier option set to `server`.
fn reply_identified(
    server: Option<Ipv4Address>,
    message_type: MessageType,
    transaction_id: u32,
    lease: u32,
    renewal: Option<u32>,
) -> Vec<u8> {
    let mut repr = dhcp::Repr::client(message_type, transaction_id, MAC_ADDR_HOST);
    repr.opcode = OpCode::Reply;
    repr.server_identifier = server;
    if message_type != MessageType::Nak {
        repr.your_ip = OFFERED;
        repr.subnet_mask = Some(NETMASK);
        repr.router = Some(IP_ADDR_GATEWAY);
        repr.dns_server = Some(NAME_SERVER);
        repr.lease_duration = Some(lease);
        repr.renewal_duration = renewal;
    }

    let mut payload = vec![0; repr.buffer_len()];
    repr.emit(dhcp::dhcp::new_unchecked_mut(&mut payload[..])).unwrap();
    udp_frame(
        MAC_ADDR_GATEWAY, EthernetAddress::BROADCAST,
        SERVER, Ipv4Address::BROADCAST,
        dhcp::SERVER_PORT, dhcp::CLIENT_PORT,
        &payload)
}

/// A server that offers `OFFERED`, refusing the first `naks` requests.
fn server(mut naks: usize, lease: u32, renewal: Option<u32>) -> impl FnMut(&[u8]) -> Option<Vec<u8>> {
    move |frame| {
        let (_, udp_repr, payload) = parse_udp(frame)?;
        if udp_repr.dst_port != dhcp::SERVER_PORT {
            return None;
        }
        let request = dhcp::Repr::parse(dhcp::dhcp::new_checked(payload).ok()?).ok()?;
        let message_type = match request.message_type {
            MessageType::Discover => MessageType::Offer,
            MessageType::Request if naks > 0 => {
                naks -= 1;
                MessageType::Nak
            },
            MessageType::Request => MessageType::Ack,
            _ => return None,
        };
        Some(reply(message_type, request.transaction_id, lease, renewal))
    }
}

/// The destination and content of all dhcp messages sent by the client.
fn client_messages(frames: &[Vec<u8>]) -> Vec<(Ipv4Address, dhcp::Repr<'_>)> {
    frames.iter()
        .filter_map(|frame| {
            let (ip, udp_repr, payload) = parse_udp(frame)?;
            assert_eq!(udp_repr.src_port, dhcp::CLIENT_PORT);
            assert_eq!(udp_repr.dst_port, dhcp::SERVER_PORT);
            let repr = dhcp::Repr::parse(dhcp::dhcp::new_checked(payload).ok()?).ok()?;
            Some((ip.dst_addr, repr))
        })
        .collect()
}

#[test]
fn lease() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_responder(server(0, 3600, None));

    let lease = stack.dhcp_request(Some("pico"), 1000).unwrap();
    assert_eq!(lease, Lease {
        address: OFFERED,
        netmask: NETMASK,
        router: IP_ADDR_GATEWAY,
        dns_server: NAME_SERVER,
        ntp_server: Ipv4Address::UNSPECIFIED,
        server: SERVER,
        duration: Some(3600),
    });
    assert_eq!(stack.dhcp_lease(), Some(lease));
    assert!(!stack.dhcp_is_requesting());
    assert!(!stack.udp().is_open(dhcp::CLIENT_PORT));
    assert_eq!(stack.udp().session_count(), 0);
    // Only followed when configuring through dhcp.
    assert_eq!(stack.config().ip, Ipv4Address::UNSPECIFIED);
    assert_eq!(stack.dns_server(), Some(NAME_SERVER));

    let sent = stack.device_mut().take_sent();
    let messages = client_messages(&sent);
    assert_eq!(messages.len(), 2);

    let (dst_addr, discover) = messages[0];
    assert_eq!(dst_addr, Ipv4Address::BROADCAST);
    assert_eq!(discover.opcode, OpCode::Request);
    assert_eq!(discover.message_type, MessageType::Discover);
    assert_eq!(discover.client_hardware_address, MAC_ADDR_HOST);
    assert!(discover.broadcast);
    assert_eq!(discover.hostname, Some(&b"pico"[..]));
    assert_eq!(discover.parameter_request_list, Some(&dhcp::PARAMETER_REQUEST_LIST[..]));
    assert_eq!(discover.requested_ip, None);

    let (dst_addr, request) = messages[1];
    assert_eq!(dst_addr, Ipv4Address::BROADCAST);
    assert_eq!(request.message_type, MessageType::Request);
    assert_eq!(request.transaction_id, discover.transaction_id);
    assert_eq!(request.requested_ip, Some(OFFERED));
    assert_eq!(request.server_identifier, Some(SERVER));
}

#[test]
fn nak_restarts() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_responder(server(1, 3600, None));

    let lease = stack.dhcp_request(None, 1000).unwrap();
    assert_eq!(lease.address, OFFERED);

    let sent = stack.device_mut().take_sent();
    let messages = client_messages(&sent);
    let types: Vec<_> = messages.iter().map(|(_, repr)| repr.message_type).collect();
    assert_eq!(types, [
        MessageType::Discover,
        MessageType::Request,
        MessageType::Discover,
        MessageType::Request,
    ]);

    // A fresh transaction that has forgotten the refused offer.
    let (_, restart) = messages[2];
    assert_ne!(restart.transaction_id, messages[0].1.transaction_id);
    assert_eq!(restart.transaction_id, messages[3].1.transaction_id);
    assert_eq!(restart.requested_ip, None);
    assert_eq!(restart.server_identifier, None);
}

#[test]
fn unanswered_request() {
    test_stack!(stack, nic, unconfigured());

    assert_eq!(stack.dhcp_request(None, 100), Err(Error::Timeout));
    assert!(!stack.dhcp_is_requesting());
    assert!(!stack.udp().is_open(dhcp::CLIENT_PORT));
    assert_eq!(stack.dhcp_lease(), None);
    assert!(!client_messages(stack.device().sent()).is_empty());
}

/// A server that offers `OFFERED` but never acknowledges.
fn offering(server: Option<Ipv4Address>) -> impl FnMut(&[u8]) -> Option<Vec<u8>> {
    move |frame| {
        let (_, udp_repr, payload) = parse_udp(frame)?;
        if udp_repr.dst_port != dhcp::SERVER_PORT {
            return None;
        }
        let request = dhcp::Repr::parse(dhcp::dhcp::new_checked(payload).ok()?).ok()?;
        if request.message_type != MessageType::Discover {
            return None;
        }
        Some(reply_identified(server, MessageType::Offer, request.transaction_id, 3600, None))
    }
}

#[test]
fn restart_forgets_offer() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_responder(offering(Some(SERVER)));
    assert_eq!(stack.dhcp_request(None, 100), Err(Error::Timeout));
    let first = stack.device_mut().take_sent();
    assert!(client_messages(&first).iter()
        .any(|(_, repr)| repr.message_type == MessageType::Request));

    // An offer without identifier must not be sent to the server of the last attempt.
    stack.device_mut().set_responder(offering(None));
    assert_eq!(stack.dhcp_request(None, 100), Err(Error::Timeout));
    assert_eq!(stack.dhcp_lease(), None);

    let sent = stack.device_mut().take_sent();
    let messages = client_messages(&sent);
    assert!(!messages.is_empty());
    for (dst_addr, repr) in messages {
        assert_eq!(dst_addr, Ipv4Address::BROADCAST);
        assert_eq!(repr.message_type, MessageType::Discover);
        assert_eq!(repr.server_identifier, None);
        // The address is still offered as a hint.
        assert_eq!(repr.requested_ip, Some(OFFERED));
    }
}

#[test]
fn configures_stack() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_responder(server(0, 3600, None));

    let lease = stack.configure_via_dhcp(Some("pico"), 1000).unwrap();
    assert!(stack.dhcp().configures_stack());
    assert_eq!(stack.config().ip, lease.address);
    assert_eq!(stack.config().netmask, NETMASK);
    assert_eq!(stack.config().gateway, IP_ADDR_GATEWAY);
    stack.device_mut().take_sent();

    assert_eq!(stack.deinitialize(), Ok(()));
    assert_eq!(stack.dhcp_lease(), None);
    assert_eq!(stack.config().ip, Ipv4Address::UNSPECIFIED);
    assert!(!stack.dhcp().configures_stack());

    let sent = stack.device_mut().take_sent();
    let messages = client_messages(&sent);
    assert_eq!(messages.len(), 1);
    let (dst_addr, release) = messages[0];
    assert_eq!(dst_addr, SERVER);
    assert_eq!(release.message_type, MessageType::Release);
    assert_eq!(release.client_ip, OFFERED);
    assert_eq!(release.server_identifier, Some(SERVER));
    assert_eq!(release.hostname, None);
}

#[test]
fn link_down() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_link(false);

    assert_eq!(stack.configure_via_dhcp(None, 50), Err(Error::Timeout));
    assert!(stack.device().sent().is_empty());
    assert_eq!(stack.config().ip, Ipv4Address::UNSPECIFIED);
}

#[test]
fn renews_with_server() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_responder(server(0, 10, Some(2)));
    let lease = stack.dhcp_request(None, 1000).unwrap();
    let first = stack.dhcp().transaction_id();
    stack.device_mut().take_sent();

    stack.ticker().tick_second();
    stack.update();
    assert!(stack.device().sent().is_empty());

    stack.ticker().tick_second();
    stack.update();
    let sent = stack.device_mut().take_sent();
    let messages = client_messages(&sent);
    assert_eq!(messages.len(), 1);
    let (dst_addr, renewal) = messages[0];
    assert_eq!(dst_addr, SERVER);
    assert_eq!(renewal.message_type, MessageType::Request);
    assert_eq!(renewal.client_ip, OFFERED);
    assert_eq!(renewal.requested_ip, None);
    assert_ne!(renewal.transaction_id, first);

    // Acked right away.
    assert_eq!(stack.dhcp_lease(), Some(lease));
    assert!(!stack.dhcp_is_requesting());
}

#[test]
fn unrenewed_lease_expires() {
    test_stack!(stack, nic, unconfigured());
    stack.device_mut().set_responder(server(0, 3, Some(10)));
    stack.dhcp_request(None, 1000).unwrap();
    stack.device_mut().clear_responder();
    stack.device_mut().take_sent();

    stack.ticker().tick_second();
    stack.update();
    assert!(stack.device().sent().is_empty());

    // Rebinding at seven eighths of the lease.
    stack.ticker().tick_second();
    stack.update();
    assert!(stack.dhcp_is_requesting());
    assert!(stack.dhcp_lease().is_some());
    let sent = stack.device_mut().take_sent();
    let messages = client_messages(&sent);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, Ipv4Address::BROADCAST);
    assert_eq!(messages[0].1.message_type, MessageType::Request);
    assert_eq!(messages[0].1.client_ip, OFFERED);

    stack.ticker().tick_second();
    stack.update();
    assert_eq!(stack.dhcp_lease(), None);
    assert!(!stack.dhcp_is_requesting());
    assert!(!stack.udp().is_open(dhcp::CLIENT_PORT));
}
