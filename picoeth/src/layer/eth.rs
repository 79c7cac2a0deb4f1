//! Frame dispatch and the construction of outgoing ip packets.
//!
//! Received frames are parsed in place. When the ip header carries options, the transport payload
//! is moved down to where an option-less header would put it, so that every protocol finds its
//! header at [`TRANSPORT_OFFSET`] and can build a reply on top of the received packet.
use crate::nic::Device;
use crate::wire::{ethernet, ipv4, EthernetAddress, Ipv4Address};
use crate::wire::ethernet::EtherType;
use crate::wire::ipv4::Protocol;
use super::{Error, Result, Stack};

/// Start of the ip header in the buffer.
pub(crate) const IP_OFFSET: usize = ethernet::HEADER_LEN;

/// Start of the transport header in the buffer, we never emit ip options.
pub(crate) const TRANSPORT_OFFSET: usize = IP_OFFSET + ipv4::HEADER_LEN;

impl<'a, D: Device> Stack<'a, D> {
    /// Handle one received frame of `len` bytes.
    pub(crate) fn dispatch(&mut self, len: usize) {
        if let Err(err) = self.receive_frame(len) {
            net_trace!("eth: dropped frame: {}", err);
        }
    }

    fn receive_frame(&mut self, len: usize) -> crate::wire::Result<()> {
        let frame = ethernet::ethernet::new_checked(&self.buffer[..len])?;
        let repr = ethernet::Repr::parse(frame)?;

        match repr.ethertype {
            EtherType::Arp => self.receive_arp(len),
            EtherType::Ipv4 => self.receive_ipv4(repr, len),
            _ => Err(crate::wire::Error::Unrecognized),
        }
    }

    fn receive_ipv4(&mut self, eth: ethernet::Repr, len: usize) -> crate::wire::Result<()> {
        let packet = ipv4::ipv4::new_checked(&self.buffer[IP_OFFSET..len])?;
        let repr = ipv4::Repr::parse(packet)?;
        let header_len = usize::from(packet.header_len());

        // Broadcast is only for udp, where dhcp needs it before we have an address.
        let for_us = repr.dst_addr == self.config.ip
            || (repr.protocol == Protocol::Udp && eth.dst_addr.is_broadcast());
        if !for_us {
            return Ok(());
        }

        if repr.src_addr.is_unicast() {
            let neighbor = self.config.next_hop(repr.src_addr);
            self.arp.add(eth.src_addr, neighbor);
        }

        if header_len != ipv4::HEADER_LEN {
            let start = IP_OFFSET + header_len;
            self.buffer.copy_within(start..start + repr.payload_len, TRANSPORT_OFFSET);
        }

        match repr.protocol {
            Protocol::Icmp => self.receive_icmp(repr),
            Protocol::Udp => self.receive_udp(repr),
            Protocol::Tcp => self.receive_tcp(repr),
            _ => Err(crate::wire::Error::Unrecognized),
        }
    }

    /// The hardware address a packet to `addr` is sent to.
    ///
    /// Falls back to broadcast when the next hop is not resolved.
    fn hardware_addr_for(&self, addr: Ipv4Address) -> EthernetAddress {
        if addr.is_broadcast() {
            return EthernetAddress::BROADCAST;
        }
        self.arp.lookup(self.config.next_hop(addr))
            .unwrap_or(EthernetAddress::BROADCAST)
    }

    /// Complete and transmit the packet whose transport part is at `TRANSPORT_OFFSET`.
    pub(crate) fn send_ipv4(&mut self, dst_addr: Ipv4Address, protocol: Protocol, payload_len: usize)
        -> Result<()>
    {
        let len = TRANSPORT_OFFSET + payload_len;
        if len > self.buffer.len() || ipv4::HEADER_LEN + payload_len > usize::from(u16::max_value()) {
            return Err(Error::BadSize);
        }

        let eth = ethernet::Repr {
            src_addr: self.device.mac_address(),
            dst_addr: self.hardware_addr_for(dst_addr),
            ethertype: EtherType::Ipv4,
        };
        eth.emit(ethernet::ethernet::new_unchecked_mut(&mut self.buffer[..IP_OFFSET]));

        let ip = ipv4::Repr {
            src_addr: self.config.ip,
            dst_addr,
            protocol,
            payload_len,
            ttl: self.config.ttl,
            ident: self.ident,
        };
        self.ident = self.ident.wrapping_add(1);
        ip.emit(ipv4::ipv4::new_unchecked_mut(&mut self.buffer[IP_OFFSET..len]));

        self.device.send(&self.buffer[..len])
    }
}
