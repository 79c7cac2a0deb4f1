// Heads up! Before working on this file you should read, at least, RFC 2131 sections 3.1 and 4.4
// on the client state machine.
//! The dhcp client.
//!
//! There is a single lease per stack. Acquiring one runs the usual exchange: a broadcast
//! Discover, the Offer of some server, a Request for the offered address and finally the Ack
//! carrying the lease. A Nak at any point throws away everything learned and starts over with a
//! new transaction.
//!
//! Once leased, the per-second tick of the stack counts down the renewal, rebinding and lease
//! timers. Renewal asks the leasing server directly, rebinding asks any server by broadcast. If
//! neither succeeds before the lease runs out the lease is dropped.
//!
//! While a transaction is running the client binds the client port through the udp layer, so that
//! port is not available to applications during that time.
use core::ops::Range;

use crate::nic::Device;
use crate::time::Countdown;
use crate::wire::{dhcp, Ipv4Address};
use crate::wire::dhcp::{MessageType, OpCode};
use super::udp::{self, Service};
use super::{Error, Result, Stack};

/// Milliseconds to wait for the hardware address of a unicast server.
const SERVER_TIMEOUT: u32 = 1000;

/// Subnet mask, router and name server.
const REQUESTED_PARAMETERS: &[u8] = &dhcp::PARAMETER_REQUEST_LIST;

/// The configuration granted by a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lease {
    /// Our address.
    pub address: Ipv4Address,
    pub netmask: Ipv4Address,
    /// The default gateway.
    pub router: Ipv4Address,
    pub dns_server: Ipv4Address,
    pub ntp_server: Ipv4Address,
    /// The server that granted the lease.
    pub server: Ipv4Address,
    /// Seconds the lease is valid, `None` for an infinite lease.
    pub duration: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Discover sent, waiting for an Offer.
    Selecting,
    /// Request for an offer sent, waiting for the Ack.
    Requesting,
    /// Request sent to the leasing server.
    Renewing,
    /// Request broadcast to any server.
    Rebinding,
}

/// The state of the dhcp client.
pub struct Client<'a> {
    hostname: Option<&'a str>,
    transaction_id: u32,
    socket: Option<udp::Socket>,
    phase: Phase,
    /// The granted lease when valid, otherwise the offer being requested.
    lease: Lease,
    valid: bool,
    renewal: Countdown,
    rebinding: Countdown,
    expiry: Countdown,
    retransmit: Countdown,
    configures_stack: bool,
}

impl Lease {
    /// A lease without any address.
    pub const EMPTY: Lease = Lease {
        address: Ipv4Address::UNSPECIFIED,
        netmask: Ipv4Address::UNSPECIFIED,
        router: Ipv4Address::UNSPECIFIED,
        dns_server: Ipv4Address::UNSPECIFIED,
        ntp_server: Ipv4Address::UNSPECIFIED,
        server: Ipv4Address::UNSPECIFIED,
        duration: None,
    };

    fn from_reply(repr: &dhcp::Repr, server: Ipv4Address) -> Self {
        Lease {
            address: repr.your_ip,
            netmask: repr.subnet_mask.unwrap_or(Ipv4Address::UNSPECIFIED),
            router: repr.router.unwrap_or(Ipv4Address::UNSPECIFIED),
            dns_server: repr.dns_server.unwrap_or(Ipv4Address::UNSPECIFIED),
            ntp_server: repr.ntp_server.unwrap_or(Ipv4Address::UNSPECIFIED),
            server: repr.server_identifier.unwrap_or(server),
            duration: repr.lease_duration,
        }
    }
}

impl<'a> Client<'a> {
    pub(crate) fn new() -> Self {
        Client {
            hostname: None,
            transaction_id: 0,
            socket: None,
            phase: Phase::Idle,
            lease: Lease::EMPTY,
            valid: false,
            renewal: Countdown::Disarmed,
            rebinding: Countdown::Disarmed,
            expiry: Countdown::Disarmed,
            retransmit: Countdown::Disarmed,
            configures_stack: false,
        }
    }

    /// The current lease, if any.
    pub fn lease(&self) -> Option<&Lease> {
        if self.valid {
            Some(&self.lease)
        } else {
            None
        }
    }

    /// Query whether a transaction is running.
    pub fn is_requesting(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// The id of the current or last transaction.
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// Whether the lease is written to the stack configuration.
    pub fn configures_stack(&self) -> bool {
        self.configures_stack
    }

    fn invalidate(&mut self) {
        self.lease = Lease::EMPTY;
        self.valid = false;
        self.renewal = Countdown::Disarmed;
        self.rebinding = Countdown::Disarmed;
        self.expiry = Countdown::Disarmed;
    }
}

/// A countdown firing after `secs` ticks.
fn after(secs: u32) -> Countdown {
    Countdown::Seconds(secs.saturating_sub(1))
}

impl<'a, D: Device> Stack<'a, D> {
    /// Acquire a lease, blocking for at most `timeout` milliseconds.
    ///
    /// Any previous lease is given up, its address is only offered to the servers as a hint.
    pub fn dhcp_request(&mut self, hostname: Option<&'a str>, timeout: u32) -> Result<Lease> {
        self.dhcp_start(hostname)?;

        let retransmit = u32::from(self.config.retransmit_interval.max(1));
        for timer in 1..=timeout {
            self.pump();
            if self.dhcp.valid && self.dhcp.phase == Phase::Idle {
                return Ok(self.dhcp.lease);
            }
            if !self.dhcp.is_requesting() {
                // Aborted, e.g. the client port was lost.
                break;
            }
            if timer % retransmit == 0 {
                self.dhcp_retransmit();
            }
        }

        net_debug!("dhcp: no lease after {} ms", timeout);
        self.dhcp_stop();
        Err(Error::Timeout)
    }

    /// Start acquiring a lease without waiting.
    ///
    /// The request is retransmitted every second by the tick of the stack until a lease arrives
    /// or [`dhcp_stop`] is called.
    ///
    /// [`dhcp_stop`]: #method.dhcp_stop
    pub fn dhcp_start(&mut self, hostname: Option<&'a str>) -> Result<()> {
        let hint = self.dhcp.lease.address;
        if self.dhcp.valid {
            self.dhcp_invalidate();
        }
        self.dhcp.lease = Lease { address: hint, ..Lease::EMPTY };
        self.dhcp.hostname = hostname;
        self.dhcp_begin(Phase::Selecting, Ipv4Address::BROADCAST)
    }

    /// Abort a running transaction, keeping any valid lease.
    pub fn dhcp_stop(&mut self) {
        self.dhcp_close();
        self.dhcp.phase = Phase::Idle;
        self.dhcp.retransmit = Countdown::Disarmed;
    }

    /// Query whether a transaction is running.
    pub fn dhcp_is_requesting(&self) -> bool {
        self.dhcp.is_requesting()
    }

    /// The current lease.
    pub fn dhcp_lease(&self) -> Option<Lease> {
        self.dhcp.lease().copied()
    }

    /// Renew the lease with the server that granted it.
    ///
    /// Done automatically once the renewal time has passed. The answer is processed by
    /// [`update`] like any other.
    ///
    /// [`update`]: #method.update
    pub fn dhcp_renew(&mut self) -> Result<()> {
        if !self.dhcp.valid {
            return Err(Error::Illegal);
        }
        let server = self.dhcp.lease.server;
        self.dhcp_begin(Phase::Renewing, server)
    }

    fn dhcp_rebind(&mut self) -> Result<()> {
        if !self.dhcp.valid {
            return Err(Error::Illegal);
        }
        self.dhcp_begin(Phase::Rebinding, Ipv4Address::BROADCAST)
    }

    /// Give the lease back to its server.
    ///
    /// The lease is forgotten even if the release can not be sent.
    pub fn dhcp_release(&mut self) -> Result<()> {
        self.dhcp_stop();
        if !self.dhcp.valid {
            return Ok(());
        }

        let server = self.dhcp.lease.server;
        self.dhcp.transaction_id = self.prng.next_u32();
        let sent = self.dhcp_open(server)
            .and_then(|()| self.dhcp_send(MessageType::Release));
        self.dhcp_close();

        net_debug!("dhcp: released {}", self.dhcp.lease.address);
        self.dhcp_invalidate();
        sent
    }

    /// Wait for the link, then lease an address and use it as our own.
    ///
    /// On failure the address configuration is cleared. The stack follows the lease from now on,
    /// a renewed lease updates the configuration and a lost one clears it.
    pub fn configure_via_dhcp(&mut self, hostname: Option<&'a str>, timeout: u32) -> Result<Lease> {
        let result = self.wait_for_link(timeout)
            .and_then(|()| {
                self.dhcp.configures_stack = true;
                self.dhcp_request(hostname, timeout)
            });
        if result.is_err() {
            self.clear_address();
        }
        result
    }

    /// Release the lease and stop following it.
    pub fn deinitialize(&mut self) -> Result<()> {
        let result = self.dhcp_release();
        if self.dhcp.configures_stack {
            self.clear_address();
            self.dhcp.configures_stack = false;
        }
        result
    }

    pub(crate) fn dhcp_tick(&mut self) {
        if self.dhcp.retransmit.tick() {
            self.dhcp_retransmit();
        }

        if !self.dhcp.valid {
            return;
        }

        if self.dhcp.expiry.tick() {
            net_warn!("dhcp: lease of {} expired", self.dhcp.lease.address);
            self.dhcp_stop();
            self.dhcp_invalidate();
        } else if self.dhcp.rebinding.tick() {
            self.dhcp.renewal = Countdown::Disarmed;
            if let Err(err) = self.dhcp_rebind() {
                net_debug!("dhcp: rebinding failed: {}", err);
            }
        } else if self.dhcp.renewal.tick() {
            if let Err(err) = self.dhcp_renew() {
                net_debug!("dhcp: renewal failed: {}", err);
            }
        }
    }

    pub(crate) fn dhcp_receive(&mut self, payload: Range<usize>) {
        let packet = match dhcp::dhcp::new_checked(&self.buffer[payload]) {
            Ok(packet) => packet,
            Err(err) => {
                net_trace!("dhcp: dropped message: {}", err);
                return;
            },
        };
        let repr = match dhcp::Repr::parse(packet) {
            Ok(repr) => repr,
            Err(err) => {
                net_trace!("dhcp: dropped message: {}", err);
                return;
            },
        };

        if repr.opcode != OpCode::Reply
            || repr.transaction_id != self.dhcp.transaction_id
            || repr.client_hardware_address != self.device.mac_address()
        {
            net_trace!("dhcp: ignoring message of transaction {:#x}", repr.transaction_id);
            return;
        }

        let offer = Lease::from_reply(&repr, self.dhcp.lease.server);
        let reply = repr.message_type;
        let timers = (repr.renewal_duration, repr.rebinding_duration);

        match (self.dhcp.phase, reply) {
            (Phase::Selecting, MessageType::Offer) => {
                if offer.address.is_unspecified() || offer.server.is_unspecified() {
                    net_trace!("dhcp: incomplete offer");
                    return;
                }
                net_debug!("dhcp: {} offered by {}", offer.address, offer.server);
                self.dhcp.lease = offer;
                self.dhcp.phase = Phase::Requesting;
                if let Err(err) = self.dhcp_send(MessageType::Request) {
                    net_debug!("dhcp: request failed: {}", err);
                }
            },
            (Phase::Idle, _) => (),
            (_, MessageType::Ack) => {
                if offer.address.is_unspecified() {
                    net_trace!("dhcp: ack without address");
                    return;
                }
                self.dhcp_bind(offer, timers);
            },
            (_, MessageType::Nak) => {
                net_debug!("dhcp: nak from {}, restarting", offer.server);
                self.dhcp_invalidate();
                if let Err(err) = self.dhcp_begin(Phase::Selecting, Ipv4Address::BROADCAST) {
                    net_debug!("dhcp: restart failed: {}", err);
                }
            },
            _ => net_trace!("dhcp: unexpected {:?}", reply),
        }
    }

    /// Accept an acknowledged lease.
    fn dhcp_bind(&mut self, lease: Lease, (renewal, rebinding): (Option<u32>, Option<u32>)) {
        self.dhcp_stop();

        let client = &mut self.dhcp;
        client.lease = lease;
        client.valid = true;
        match lease.duration {
            Some(duration) => {
                let renewal = renewal.unwrap_or(duration / 2);
                let rebinding = rebinding
                    .unwrap_or((u64::from(duration) * 7 / 8) as u32);
                client.renewal = after(renewal);
                client.rebinding = after(rebinding);
                client.expiry = after(duration);
            },
            None => {
                client.renewal = Countdown::Disarmed;
                client.rebinding = Countdown::Disarmed;
                client.expiry = Countdown::Disarmed;
            },
        }

        net_debug!("dhcp: leased {} from {}", lease.address, lease.server);
        if self.dhcp.configures_stack {
            self.config.ip = lease.address;
            self.config.netmask = lease.netmask;
            self.config.gateway = lease.router;
        }
    }

    /// Start a transaction with a fresh id.
    fn dhcp_begin(&mut self, phase: Phase, server: Ipv4Address) -> Result<()> {
        self.dhcp.transaction_id = self.prng.next_u32();
        self.dhcp.phase = phase;
        if let Err(err) = self.dhcp_open(server) {
            self.dhcp_stop();
            return Err(err);
        }

        let message = match phase {
            Phase::Selecting => MessageType::Discover,
            _ => MessageType::Request,
        };
        net_debug!("dhcp: {:?} transaction {:#x}", phase, self.dhcp.transaction_id);
        if let Err(err) = self.dhcp_send(message) {
            // The tick retries.
            net_debug!("dhcp: sending failed: {}", err);
        }
        self.dhcp.retransmit = Countdown::Seconds(0);
        Ok(())
    }

    fn dhcp_retransmit(&mut self) {
        let message = match self.dhcp.phase {
            Phase::Idle => return,
            Phase::Selecting => MessageType::Discover,
            _ => MessageType::Request,
        };
        if self.dhcp.socket.is_none() {
            self.dhcp_stop();
            return;
        }
        if let Err(err) = self.dhcp_send(message) {
            net_debug!("dhcp: retransmission failed: {}", err);
        }
        self.dhcp.retransmit = Countdown::Seconds(0);
    }

    /// Bind the client port, talking to `server`.
    fn dhcp_open(&mut self, server: Ipv4Address) -> Result<()> {
        self.dhcp_close();
        let socket = self.udp_connect_service(
            server,
            dhcp::SERVER_PORT,
            SERVER_TIMEOUT,
            Service::Dhcp,
            dhcp::CLIENT_PORT)?;
        self.dhcp.socket = Some(socket);
        Ok(())
    }

    fn dhcp_close(&mut self) {
        let socket = match self.dhcp.socket.take() {
            Some(socket) => socket,
            None => return,
        };
        // The handle may have been reused after the session was dropped elsewhere.
        let ours = match self.udp.get(socket) {
            Some(session) => session.local_port == dhcp::CLIENT_PORT
                && session.remote_port == dhcp::SERVER_PORT,
            None => false,
        };
        if ours {
            let _ = self.udp_disconnect(socket);
        }
    }

    fn dhcp_invalidate(&mut self) {
        self.dhcp.invalidate();
        if self.dhcp.configures_stack {
            self.clear_address();
        }
    }

    fn clear_address(&mut self) {
        self.config.ip = Ipv4Address::UNSPECIFIED;
        self.config.netmask = Ipv4Address::UNSPECIFIED;
        self.config.gateway = Ipv4Address::UNSPECIFIED;
    }

    fn dhcp_message(&self, message_type: MessageType) -> dhcp::Repr<'a> {
        let client = &self.dhcp;
        let mut repr = dhcp::Repr::client(
            message_type,
            client.transaction_id,
            self.device.mac_address());
        repr.hostname = client.hostname.map(str::as_bytes);

        match (message_type, client.phase) {
            (MessageType::Discover, _) => {
                repr.broadcast = true;
                if !client.lease.address.is_unspecified() {
                    repr.requested_ip = Some(client.lease.address);
                }
                repr.parameter_request_list = Some(REQUESTED_PARAMETERS);
            },
            (MessageType::Request, Phase::Requesting) => {
                repr.broadcast = true;
                repr.requested_ip = Some(client.lease.address);
                repr.server_identifier = Some(client.lease.server);
                repr.parameter_request_list = Some(REQUESTED_PARAMETERS);
            },
            (MessageType::Request, _) => {
                repr.client_ip = client.lease.address;
                repr.parameter_request_list = Some(REQUESTED_PARAMETERS);
            },
            _ => {
                repr.client_ip = client.lease.address;
                repr.server_identifier = Some(client.lease.server);
                repr.hostname = None;
            },
        }

        repr
    }

    fn dhcp_send(&mut self, message_type: MessageType) -> Result<()> {
        let socket = self.dhcp.socket.ok_or(Error::Illegal)?;
        let repr = self.dhcp_message(message_type);
        let len = repr.buffer_len();
        if udp::DATA_OFFSET + len > self.buffer.len() {
            return Err(Error::BadSize);
        }

        let payload = self.udp_start_packet(socket)?;
        repr.emit(dhcp::dhcp::new_unchecked_mut(&mut payload[..len]))?;
        net_trace!("dhcp: sending {:?}", message_type);
        self.udp_send(len)
    }
}

#[cfg(test)]
mod tests;
