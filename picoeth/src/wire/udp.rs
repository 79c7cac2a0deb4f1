use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::ipv4::{checksum, Address, Protocol};

byte_wrapper! {
    /// A byte sequence representing a User Datagram Protocol packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct udp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const LENGTH:   Field = 4..6;
    pub(crate) const CHECKSUM: Field = 6..8;

    pub(crate) fn payload(length: u16) -> Field {
        CHECKSUM.end..(length as usize)
    }
}

/// The length of the udp header.
pub const HEADER_LEN: usize = field::CHECKSUM.end;

impl udp {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    /// Returns `Err(Error::Malformed)` if the length field has a value smaller
    /// than the header length.
    ///
    /// The result of this check is invalidated by calling [set_len].
    ///
    /// [set_len]: #method.set_len
    pub fn check_len(&self) -> Result<()> {
        let buffer_len = self.0.len();
        if buffer_len < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            let field_len = self.len() as usize;
            if buffer_len < field_len {
                Err(Error::Truncated)
            } else if field_len < HEADER_LEN {
                Err(Error::Malformed)
            } else {
                Ok(())
            }
        }
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the length field, header included.
    #[inline]
    pub fn len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    #[inline]
    pub fn set_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Compute and fill in the checksum over pseudo header, header and payload.
    pub fn fill_checksum(&mut self, src_addr: Address, dst_addr: Address) {
        self.set_checksum(0);
        let checksum = !checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Udp, self.len()),
            checksum::data(&self.0[..self.len() as usize]),
        ]);
        // Zero on the wire means the sender computed no checksum. All-ones is arithmetically
        // the same value in one's complement.
        self.set_checksum(if checksum == 0 { 0xffff } else { checksum })
    }

    /// Validate the packet checksum.
    ///
    /// A zero checksum field means the sender did not compute one and is always accepted.
    pub fn verify_checksum(&self, src_addr: Address, dst_addr: Address) -> bool {
        if self.checksum() == 0 {
            return true;
        }

        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Udp, self.len()),
            checksum::data(&self.0[..self.len() as usize]),
        ]) == !0
    }

    pub fn payload_slice(&self) -> &[u8] {
        let len = self.len();
        &self.0[field::payload(len)]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.0[field::payload(len)]
    }
}

impl AsRef<[u8]> for udp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of a User Datagram Protocol packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload_len: usize,
}

impl Repr {
    /// Parse a User Datagram Protocol packet and return a high-level representation.
    ///
    /// The addresses are those of the enclosing ip header, for the checksum.
    pub fn parse(packet: &udp, src_addr: Address, dst_addr: Address) -> Result<Repr> {
        packet.check_len()?;

        // Destination port cannot be omitted (but source port can be).
        if packet.dst_port() == 0 {
            return Err(Error::Malformed)
        }

        if !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::WrongChecksum)
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            payload_len: packet.len() as usize - HEADER_LEN,
        })
    }

    /// Return the length of the header that will be emitted from this high-level representation.
    pub fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Return the total length of the packet.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Emit the header into a packet whose payload is already in place, then fill the checksum.
    pub fn emit(&self, packet: &mut udp, src_addr: Address, dst_addr: Address) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_len(self.buffer_len() as u16);
        packet.fill_checksum(src_addr, dst_addr)
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UDP src={} dst={} len={}", self.src_port, self.dst_port, self.payload_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SRC_ADDR: Address = Address([192, 168, 1, 1]);
    const DST_ADDR: Address = Address([192, 168, 1, 2]);

    static PACKET_BYTES: [u8; 12] =
        [0xbf, 0x00, 0x00, 0x35,
         0x00, 0x0c, 0x12, 0x4d,
         0xaa, 0x00, 0x00, 0xff];

    static PAYLOAD_BYTES: [u8; 4] =
        [0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn deconstruct() {
        let packet = udp::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.src_port(), 48896);
        assert_eq!(packet.dst_port(), 53);
        assert_eq!(packet.len(), 12);
        assert_eq!(packet.checksum(), 0x124d);
        assert_eq!(packet.payload_slice(), &PAYLOAD_BYTES[..]);
        assert!(packet.verify_checksum(SRC_ADDR, DST_ADDR));
    }

    #[test]
    fn emit_fills_checksum() {
        let mut bytes = [0xa5; 12];
        bytes[8..].copy_from_slice(&PAYLOAD_BYTES);
        let repr = Repr { src_port: 48896, dst_port: 53, payload_len: 4 };
        repr.emit(udp::new_unchecked_mut(&mut bytes), SRC_ADDR, DST_ADDR);
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn zero_checksum_accepted() {
        let mut bytes = PACKET_BYTES;
        bytes[6] = 0;
        bytes[7] = 0;
        let packet = udp::new_checked(&bytes[..]).unwrap();
        assert!(Repr::parse(packet, SRC_ADDR, DST_ADDR).is_ok());
    }

    #[test]
    fn wrong_checksum_rejected() {
        let mut bytes = PACKET_BYTES;
        bytes[11] = 0xfe;
        let packet = udp::new_checked(&bytes[..]).unwrap();
        assert_eq!(Repr::parse(packet, SRC_ADDR, DST_ADDR), Err(Error::WrongChecksum));
    }

    #[test]
    fn length_field_checked() {
        let mut bytes = PACKET_BYTES;
        bytes[5] = 0x20;
        assert_eq!(udp::new_checked(&bytes[..]), Err(Error::Truncated));
        bytes[5] = 0x04;
        assert_eq!(udp::new_checked(&bytes[..]), Err(Error::Malformed));
    }
}
