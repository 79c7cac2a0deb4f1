//! A stub resolver for address records.
//!
//! Queries go to a single name server, from the configuration or else from the dhcp lease. One
//! query is outstanding at a time and the first fitting answer wins.
use core::ops::Range;

use crate::nic::Device;
use crate::wire::{dns, Ipv4Address};
use super::udp::{self, Service};
use super::{Error, Result, Stack};

/// The longest hostname that can be resolved.
pub const MAX_HOSTNAME: usize = 64;

/// The state of the resolver.
pub struct Resolver {
    transaction_id: u16,
    hostname: [u8; MAX_HOSTNAME],
    hostname_len: usize,
    socket: Option<udp::Socket>,
    answer: Option<Ipv4Address>,
}

impl Resolver {
    pub(crate) fn new() -> Self {
        Resolver {
            transaction_id: 0,
            hostname: [0; MAX_HOSTNAME],
            hostname_len: 0,
            socket: None,
            answer: None,
        }
    }

    /// Query whether a query is outstanding.
    pub fn is_querying(&self) -> bool {
        self.socket.is_some()
    }

    fn hostname(&self) -> Option<&str> {
        core::str::from_utf8(&self.hostname[..self.hostname_len]).ok()
    }
}

impl<'a, D: Device> Stack<'a, D> {
    /// The name server in use, configured or leased.
    pub fn dns_server(&self) -> Option<Ipv4Address> {
        if !self.config.dns_server.is_unspecified() {
            return Some(self.config.dns_server);
        }
        self.dhcp.lease()
            .map(|lease| lease.dns_server)
            .filter(|addr| !addr.is_unspecified())
    }

    /// Resolve the address of a host, blocking for at most `timeout` milliseconds.
    ///
    /// Fails with `Illegal` for names that are empty or too long, and `Unreachable` if there is
    /// no name server.
    pub fn dns_query(&mut self, hostname: &str, timeout: u32) -> Result<Ipv4Address> {
        if hostname.is_empty() || hostname.len() > MAX_HOSTNAME {
            return Err(Error::Illegal);
        }
        let server = self.dns_server().ok_or(Error::Unreachable)?;

        self.dns_close();
        let resolver = &mut self.dns;
        resolver.hostname[..hostname.len()].copy_from_slice(hostname.as_bytes());
        resolver.hostname_len = hostname.len();
        resolver.transaction_id = resolver.transaction_id.wrapping_add(1);
        resolver.answer = None;

        let socket = self.udp_connect_service(server, dns::SERVER_PORT, timeout, Service::Dns, 0)?;
        self.dns.socket = Some(socket);
        net_debug!("dns: resolving {} at {}", hostname, server);

        let retransmit = u32::from(self.config.retransmit_interval.max(1));
        let mut result = Err(Error::Timeout);
        if let Err(err) = self.dns_send() {
            result = Err(err);
        } else {
            for timer in 1..=timeout {
                self.pump();
                if let Some(address) = self.dns.answer {
                    result = Ok(address);
                    break;
                }
                if !self.dns.is_querying() {
                    break;
                }
                if timer % retransmit == 0 {
                    if let Err(err) = self.dns_send() {
                        net_trace!("dns: retransmission failed: {}", err);
                    }
                }
            }
        }

        self.dns_close();
        result.map_err(|err| {
            net_debug!("dns: {} not resolved: {}", hostname, err);
            err
        })
    }

    pub(crate) fn dns_receive(&mut self, payload: Range<usize>) {
        let packet = match dns::dns::new_checked(&self.buffer[payload]) {
            Ok(packet) => packet,
            Err(err) => {
                net_trace!("dns: dropped response: {}", err);
                return;
            },
        };
        if packet.transaction_id() != self.dns.transaction_id {
            return;
        }

        let hostname = match self.dns.hostname() {
            Some(hostname) => hostname,
            None => return,
        };
        match dns::resolve(packet, hostname) {
            Ok(Some(address)) => {
                net_debug!("dns: {} is at {}", hostname, address);
                self.dns.answer = Some(address);
            },
            Ok(None) => net_trace!("dns: response without an answer for {}", hostname),
            Err(err) => net_trace!("dns: dropped response: {}", err),
        }
    }

    fn dns_send(&mut self) -> Result<()> {
        let socket = self.dns.socket.ok_or(Error::Illegal)?;
        let name = self.dns.hostname;
        let name = core::str::from_utf8(&name[..self.dns.hostname_len])
            .map_err(|_| Error::Illegal)?;
        let query = dns::Query {
            transaction_id: self.dns.transaction_id,
            hostname: name,
        };
        if udp::DATA_OFFSET + query.buffer_len() > self.buffer.len() {
            return Err(Error::BadSize);
        }

        let payload = self.udp_start_packet(socket)?;
        let len = query.emit(dns::dns::new_unchecked_mut(payload))?;
        self.udp_send(len)
    }

    fn dns_close(&mut self) {
        let socket = match self.dns.socket.take() {
            Some(socket) => socket,
            None => return,
        };
        let ours = match self.udp.get(socket) {
            Some(session) => session.remote_port == dns::SERVER_PORT
                && matches!(self.udp.ports.find(session.local_port),
                    Some(port) if matches!(port.handler, udp::Binding::Service(Service::Dns))),
            None => false,
        };
        if ours {
            let _ = self.udp_disconnect(socket);
        }
    }
}
