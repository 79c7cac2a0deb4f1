use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::{EthernetAddress, Ipv4Address};
use super::ethernet::EtherType;

enum_with_unknown! {
    /// ARP hardware type.
    pub enum Hardware(u16) {
        Ethernet = 1,
    }
}

enum_with_unknown! {
    /// ARP operation type.
    pub enum Operation(u16) {
        Request = 1,
        Reply = 2,
    }
}

byte_wrapper! {
    /// A byte sequence representing an ARP packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct arp([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const HTYPE: Field = 0..2;
    pub(crate) const PTYPE: Field = 2..4;
    pub(crate) const HLEN:  usize = 4;
    pub(crate) const PLEN:  usize = 5;
    pub(crate) const OPER:  Field = 6..8;

    // Only Ethernet over IPv4 is supported, the address fields are at fixed offsets.
    pub(crate) const SHA: Field = 8..14;
    pub(crate) const SPA: Field = 14..18;
    pub(crate) const THA: Field = 18..24;
    pub(crate) const TPA: Field = 24..28;
}

/// The length of an Ethernet over IPv4 arp packet.
pub const PACKET_LEN: usize = field::TPA.end;

impl arp {
    /// Imbue a raw octet buffer with ARP packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &arp {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with ARP packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut arp {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&arp> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short to hold an Ethernet over IPv4
    /// packet. Packets for other address kinds are rejected later by `Repr::parse`.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < PACKET_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the hardware type field.
    #[inline]
    pub fn hardware_type(&self) -> Hardware {
        Hardware::from(NetworkEndian::read_u16(&self.0[field::HTYPE]))
    }

    /// Return the protocol type field.
    #[inline]
    pub fn protocol_type(&self) -> EtherType {
        EtherType::from(NetworkEndian::read_u16(&self.0[field::PTYPE]))
    }

    /// Return the hardware length field.
    #[inline]
    pub fn hardware_len(&self) -> u8 {
        self.0[field::HLEN]
    }

    /// Return the protocol length field.
    #[inline]
    pub fn protocol_len(&self) -> u8 {
        self.0[field::PLEN]
    }

    /// Return the operation field.
    #[inline]
    pub fn operation(&self) -> Operation {
        Operation::from(NetworkEndian::read_u16(&self.0[field::OPER]))
    }

    /// Return the source hardware address field.
    pub fn source_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::SHA])
    }

    /// Return the source protocol address field.
    pub fn source_protocol_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::SPA])
    }

    /// Return the target hardware address field.
    pub fn target_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::THA])
    }

    /// Return the target protocol address field.
    pub fn target_protocol_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::TPA])
    }

    #[inline]
    pub fn set_hardware_type(&mut self, value: Hardware) {
        NetworkEndian::write_u16(&mut self.0[field::HTYPE], value.into())
    }

    #[inline]
    pub fn set_protocol_type(&mut self, value: EtherType) {
        NetworkEndian::write_u16(&mut self.0[field::PTYPE], value.into())
    }

    #[inline]
    pub fn set_hardware_len(&mut self, value: u8) {
        self.0[field::HLEN] = value
    }

    #[inline]
    pub fn set_protocol_len(&mut self, value: u8) {
        self.0[field::PLEN] = value
    }

    #[inline]
    pub fn set_operation(&mut self, value: Operation) {
        NetworkEndian::write_u16(&mut self.0[field::OPER], value.into())
    }

    pub fn set_source_hardware_addr(&mut self, value: EthernetAddress) {
        self.0[field::SHA].copy_from_slice(value.as_bytes())
    }

    pub fn set_source_protocol_addr(&mut self, value: Ipv4Address) {
        self.0[field::SPA].copy_from_slice(value.as_bytes())
    }

    pub fn set_target_hardware_addr(&mut self, value: EthernetAddress) {
        self.0[field::THA].copy_from_slice(value.as_bytes())
    }

    pub fn set_target_protocol_addr(&mut self, value: Ipv4Address) {
        self.0[field::TPA].copy_from_slice(value.as_bytes())
    }
}

impl AsRef<[u8]> for arp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an Ethernet over IPv4 arp packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub operation: Operation,
    pub source_hardware_addr: EthernetAddress,
    pub source_protocol_addr: Ipv4Address,
    pub target_hardware_addr: EthernetAddress,
    pub target_protocol_addr: Ipv4Address,
}

impl Repr {
    /// Parse an Address Resolution Protocol packet and return a high-level representation.
    ///
    /// Returns `Err(Error::Unrecognized)` for anything but Ethernet hardware addresses resolving
    /// IPv4 protocol addresses.
    pub fn parse(packet: &arp) -> Result<Repr> {
        packet.check_len()?;
        match (packet.hardware_type(), packet.protocol_type(),
               packet.hardware_len(), packet.protocol_len()) {
            (Hardware::Ethernet, EtherType::Ipv4, 6, 4) => Ok(Repr {
                operation: packet.operation(),
                source_hardware_addr: packet.source_hardware_addr(),
                source_protocol_addr: packet.source_protocol_addr(),
                target_hardware_addr: packet.target_hardware_addr(),
                target_protocol_addr: packet.target_protocol_addr(),
            }),
            _ => Err(Error::Unrecognized),
        }
    }

    /// Return the length of a packet that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        PACKET_LEN
    }

    /// Emit a high-level representation into an Address Resolution Protocol packet.
    pub fn emit(&self, packet: &mut arp) {
        packet.set_hardware_type(Hardware::Ethernet);
        packet.set_protocol_type(EtherType::Ipv4);
        packet.set_hardware_len(6);
        packet.set_protocol_len(4);
        packet.set_operation(self.operation);
        packet.set_source_hardware_addr(self.source_hardware_addr);
        packet.set_source_protocol_addr(self.source_protocol_addr);
        packet.set_target_hardware_addr(self.target_hardware_addr);
        packet.set_target_protocol_addr(self.target_protocol_addr);
    }

    /// The answer to this request, sent from the given hardware address.
    ///
    /// Returns `None` if this is not a request.
    pub fn reply(&self, our_hardware_addr: EthernetAddress) -> Option<Repr> {
        match self.operation {
            Operation::Request => Some(Repr {
                operation: Operation::Reply,
                source_hardware_addr: our_hardware_addr,
                source_protocol_addr: self.target_protocol_addr,
                target_hardware_addr: self.source_hardware_addr,
                target_protocol_addr: self.source_protocol_addr,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ARP type=Ethernet+IPv4 src={}/{} tgt={}/{} op={:?}",
               self.source_hardware_addr, self.source_protocol_addr,
               self.target_hardware_addr, self.target_protocol_addr,
               self.operation)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static PACKET_BYTES: [u8; 28] =
        [0x00, 0x01,
         0x08, 0x00,
         0x06,
         0x04,
         0x00, 0x01,
         0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
         0x21, 0x22, 0x23, 0x24,
         0x31, 0x32, 0x33, 0x34, 0x35, 0x36,
         0x41, 0x42, 0x43, 0x44];

    fn packet_repr() -> Repr {
        Repr {
            operation: Operation::Request,
            source_hardware_addr: EthernetAddress([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]),
            source_protocol_addr: Ipv4Address::new(0x21, 0x22, 0x23, 0x24),
            target_hardware_addr: EthernetAddress([0x31, 0x32, 0x33, 0x34, 0x35, 0x36]),
            target_protocol_addr: Ipv4Address::new(0x41, 0x42, 0x43, 0x44),
        }
    }

    #[test]
    fn parse() {
        let packet = arp::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(Repr::parse(packet), Ok(packet_repr()));
    }

    #[test]
    fn emit() {
        let mut bytes = [0xa5; 28];
        packet_repr().emit(arp::new_unchecked_mut(&mut bytes));
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn other_protocol_unrecognized() {
        let mut bytes = PACKET_BYTES;
        bytes[2] = 0x86;
        bytes[3] = 0xdd;
        let packet = arp::new_checked(&bytes[..]).unwrap();
        assert_eq!(Repr::parse(packet), Err(Error::Unrecognized));
    }

    #[test]
    fn reply_swaps_roles() {
        let ours = EthernetAddress([0x02, 0, 0, 0, 0, 0x01]);
        let reply = packet_repr().reply(ours).unwrap();
        assert_eq!(reply.operation, Operation::Reply);
        assert_eq!(reply.source_hardware_addr, ours);
        assert_eq!(reply.source_protocol_addr, Ipv4Address::new(0x41, 0x42, 0x43, 0x44));
        assert_eq!(reply.target_hardware_addr, EthernetAddress([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]));
        assert!(reply.reply(ours).is_none());
    }
}
