// Heads up! Before working on this file you should read, at least,
// the parts of RFC 1122 that discuss ARP.
//! The arp cache and address resolution.
//!
//! Every peer we talk to directly must have a hardware address in the [`Cache`] before a packet
//! can be addressed to it. Destinations outside the local subnet are never resolved themselves,
//! their packets go to the gateway and it is the gateway's address that is looked up and learned.
//!
//! [`Cache`]: struct.Cache.html
use crate::nic::Device;
use crate::wire::{arp, ethernet, EthernetAddress, Ipv4Address};
use crate::wire::arp::Operation;
use crate::wire::ethernet::EtherType;
use super::{Error, Result, Stack};

/// A cached neighbor.
///
/// Maps a protocol address to the hardware address, with the number of seconds the mapping has
/// left before it is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    protocol_addr: Ipv4Address,
    hardware_addr: EthernetAddress,
    ttl: u16,
}

/// A neighbor cache backed by a slice.
///
/// The cache never evicts a live entry to make room: when all slots are taken a new address is
/// simply not learned, while refreshing a known address always works.
///
/// ```rust
/// use picoeth::layer::arp::{Cache, Neighbor};
/// use picoeth::wire::{EthernetAddress, Ipv4Address};
///
/// let mut slots: [Option<Neighbor>; 2] = [None; 2];
/// let mut cache = Cache::new(&mut slots[..], 30);
///
/// let peer = Ipv4Address::new(10, 0, 0, 2);
/// assert!(cache.add(EthernetAddress([2, 0, 0, 0, 0, 2]), peer));
/// assert_eq!(cache.lookup(peer), Some(EthernetAddress([2, 0, 0, 0, 0, 2])));
/// ```
pub struct Cache<'a> {
    slots: &'a mut [Option<Neighbor>],
    lifetime: u16,
}

impl Neighbor {
    /// The ip address of the neighbor.
    pub fn protocol_addr(&self) -> Ipv4Address {
        self.protocol_addr
    }

    /// The resolved hardware address.
    pub fn hardware_addr(&self) -> EthernetAddress {
        self.hardware_addr
    }

    /// Seconds left until eviction.
    pub fn ttl(&self) -> u16 {
        self.ttl
    }
}

impl<'a> Cache<'a> {
    /// Create a cache over some storage, fresh entries live `lifetime` seconds.
    ///
    /// All previous content of the storage is discarded.
    pub fn new(slots: &'a mut [Option<Neighbor>], lifetime: u16) -> Self {
        slots.iter_mut().for_each(|slot| *slot = None);
        Cache { slots, lifetime }
    }

    /// Insert or refresh a mapping.
    ///
    /// Returns `false` if the address is new and the cache has no free slot. Unspecified and
    /// broadcast addresses are never learned.
    pub fn add(&mut self, hardware_addr: EthernetAddress, protocol_addr: Ipv4Address) -> bool {
        if protocol_addr.is_unspecified() || protocol_addr.is_broadcast() {
            return false;
        }

        let lifetime = self.lifetime;
        if let Some(entry) = self.find_mut(protocol_addr) {
            entry.hardware_addr = hardware_addr;
            entry.ttl = lifetime;
            return true;
        }

        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                net_debug!("arp: learned {} at {}", protocol_addr, hardware_addr);
                *slot = Some(Neighbor { protocol_addr, hardware_addr, ttl: lifetime });
                true
            },
            None => {
                net_trace!("arp: cache full, not learning {}", protocol_addr);
                false
            },
        }
    }

    /// Get the entry of an address.
    pub fn get(&self, protocol_addr: Ipv4Address) -> Option<&Neighbor> {
        self.slots.iter()
            .filter_map(Option::as_ref)
            .find(|entry| entry.protocol_addr == protocol_addr)
    }

    /// The hardware address of an address, if cached.
    pub fn lookup(&self, protocol_addr: Ipv4Address) -> Option<EthernetAddress> {
        self.get(protocol_addr).map(Neighbor::hardware_addr)
    }

    /// Forget an address.
    pub fn remove(&mut self, protocol_addr: Ipv4Address) -> Option<Neighbor> {
        self.slots.iter_mut()
            .find(|slot| matches!(slot, Some(entry) if entry.protocol_addr == protocol_addr))?
            .take()
    }

    /// Query whether no new address can be learned.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Iterate over all live entries.
    pub fn iter(&self) -> impl Iterator<Item=&Neighbor> + '_ {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Age all entries by one second, evicting those that ran out.
    ///
    /// An entry is still present on the tick its ttl reaches zero and gone on the next one.
    pub fn tick(&mut self) {
        for slot in self.slots.iter_mut() {
            let expired = match slot {
                Some(entry) if entry.ttl == 0 => true,
                Some(entry) => {
                    entry.ttl -= 1;
                    false
                },
                None => false,
            };
            if expired {
                if let Some(entry) = slot.take() {
                    net_debug!("arp: evicted {}", entry.protocol_addr);
                }
            }
        }
    }

    /// Change the lifetime of entries learned or refreshed from now on.
    pub fn set_lifetime(&mut self, lifetime: u16) {
        self.lifetime = lifetime;
    }

    fn find_mut(&mut self, protocol_addr: Ipv4Address) -> Option<&mut Neighbor> {
        self.slots.iter_mut()
            .filter_map(Option::as_mut)
            .find(|entry| entry.protocol_addr == protocol_addr)
    }
}

impl<'a, D: Device> Stack<'a, D> {
    /// Make sure the hardware address of a destination is known.
    ///
    /// Resolves the gateway instead for destinations outside the local subnet. Sends a request
    /// every retransmit interval and polls the stack until the answer is learned or `timeout`
    /// milliseconds have passed.
    pub fn ensure_neighbor(&mut self, addr: Ipv4Address, timeout: u32) -> Result<()> {
        let addr = self.config.next_hop(addr);
        if addr.is_broadcast() || self.arp.lookup(addr).is_some() {
            return Ok(());
        }

        if self.arp.is_full() {
            net_debug!("arp: can not resolve {}, cache full", addr);
            return Err(Error::Exhausted);
        }

        let retransmit = u32::from(self.config.retransmit_interval.max(1));
        for timer in 0..=timeout {
            if self.arp.lookup(addr).is_some() {
                return Ok(());
            }
            if timer % retransmit == 0 {
                self.send_arp_request(addr)?;
            }
            self.update();
            self.delay.delay_ms(1);
        }

        match self.arp.lookup(addr) {
            Some(_) => Ok(()),
            None => {
                net_debug!("arp: no answer from {}", addr);
                Err(Error::Unreachable)
            },
        }
    }

    /// Broadcast a request for the hardware address of `addr`.
    pub(crate) fn send_arp_request(&mut self, addr: Ipv4Address) -> Result<()> {
        let request = arp::Repr {
            operation: Operation::Request,
            source_hardware_addr: self.device.mac_address(),
            source_protocol_addr: self.config.ip,
            target_hardware_addr: EthernetAddress::UNSPECIFIED,
            target_protocol_addr: addr,
        };
        self.send_arp(request, EthernetAddress::BROADCAST)
    }

    /// Process an arp packet in the buffer, the frame is `len` bytes long.
    pub(crate) fn receive_arp(&mut self, len: usize) -> crate::wire::Result<()> {
        let packet = arp::arp::new_checked(&self.buffer[ethernet::HEADER_LEN..len])?;
        let repr = arp::Repr::parse(packet)?;

        if repr.target_protocol_addr != self.config.ip || self.config.ip.is_unspecified() {
            return Ok(());
        }

        self.arp.add(repr.source_hardware_addr, repr.source_protocol_addr);

        if let Some(reply) = repr.reply(self.device.mac_address()) {
            if let Err(err) = self.send_arp(reply, repr.source_hardware_addr) {
                net_trace!("arp: reply to {} failed: {}", repr.source_protocol_addr, err);
            }
        }

        Ok(())
    }

    fn send_arp(&mut self, repr: arp::Repr, dst_addr: EthernetAddress) -> Result<()> {
        let len = ethernet::HEADER_LEN + repr.buffer_len();
        let frame = self.buffer.get_mut(..len).ok_or(Error::BadSize)?;
        let eth = ethernet::Repr {
            src_addr: repr.source_hardware_addr,
            dst_addr,
            ethertype: EtherType::Arp,
        };
        eth.emit(ethernet::ethernet::new_unchecked_mut(frame));
        repr.emit(arp::arp::new_unchecked_mut(&mut frame[ethernet::HEADER_LEN..]));
        self.device.send(&self.buffer[..len])
    }
}

#[cfg(test)]
mod tests;
