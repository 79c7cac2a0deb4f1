//! Answers pings.
//!
//! Only echo requests addressed to our own ip are processed, the reply is built over the request
//! in the buffer and keeps its identifier, sequence number and data.
use crate::nic::Device;
use crate::wire::{icmpv4, ipv4};
use crate::wire::ipv4::Protocol;
use super::eth::TRANSPORT_OFFSET;
use super::Stack;

impl<'a, D: Device> Stack<'a, D> {
    pub(crate) fn receive_icmp(&mut self, ip: ipv4::Repr) -> crate::wire::Result<()> {
        let message = TRANSPORT_OFFSET..TRANSPORT_OFFSET + ip.payload_len;
        let packet = icmpv4::icmpv4::new_checked(&self.buffer[message.clone()])?;
        let repr = icmpv4::Repr::parse(packet)?;

        let reply = match repr.reply() {
            Some(reply) => reply,
            None => return Ok(()),
        };

        reply.emit(icmpv4::icmpv4::new_unchecked_mut(&mut self.buffer[message]));
        if let Err(err) = self.send_ipv4(ip.src_addr, Protocol::Icmp, ip.payload_len) {
            net_trace!("icmp: echo reply to {} failed: {}", ip.src_addr, err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
