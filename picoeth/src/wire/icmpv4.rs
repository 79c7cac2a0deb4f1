use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::ipv4::checksum;

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum Message(u8) {
        /// Echo reply
        EchoReply      =  0,
        /// Destination unreachable
        DstUnreachable =  3,
        /// Echo request
        EchoRequest    =  8,
        /// Time exceeded
        TimeExceeded   = 11,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::EchoReply      => write!(f, "echo reply"),
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::EchoRequest    => write!(f, "echo request"),
            Message::TimeExceeded   => write!(f, "time exceeded"),
            Message::Unknown(id) => write!(f, "{}", id)
        }
    }
}

byte_wrapper! {
    /// A byte sequence representing an ICMPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct icmpv4([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const TYPE:       usize = 0;
    pub(crate) const CODE:       usize = 1;
    pub(crate) const CHECKSUM:   Field = 2..4;

    pub(crate) const ECHO_IDENT: Field = 4..6;
    pub(crate) const ECHO_SEQNO: Field = 6..8;
    pub(crate) const ECHO_DATA:  Rest  = 8..;
}

/// The length of an echo header.
pub const ECHO_HEADER_LEN: usize = field::ECHO_SEQNO.end;

impl icmpv4 {
    /// Imbue a raw octet buffer with ICMPv4 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &icmpv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with ICMPv4 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut icmpv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&icmpv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Only echo messages are ever looked into, so the buffer must hold an echo header.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < ECHO_HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn msg_type(&self) -> Message {
        Message::from(self.0[field::TYPE])
    }

    #[inline]
    pub fn msg_code(&self) -> u8 {
        self.0[field::CODE]
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the identifier field of an echo message.
    #[inline]
    pub fn echo_ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ECHO_IDENT])
    }

    /// Return the sequence number field of an echo message.
    #[inline]
    pub fn echo_seq_no(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ECHO_SEQNO])
    }

    /// Validate the checksum over the whole message.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0) == !0
    }

    #[inline]
    pub fn set_msg_type(&mut self, value: Message) {
        self.0[field::TYPE] = value.into()
    }

    #[inline]
    pub fn set_msg_code(&mut self, value: u8) {
        self.0[field::CODE] = value
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_echo_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ECHO_IDENT], value)
    }

    #[inline]
    pub fn set_echo_seq_no(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ECHO_SEQNO], value)
    }

    /// Compute and fill in the checksum over the whole message.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = checksum::compute(&self.0, 0);
        self.set_checksum(checksum)
    }

    /// The data carried by an echo message.
    pub fn echo_data(&self) -> &[u8] {
        &self.0[field::ECHO_DATA]
    }

    pub fn echo_data_mut(&mut self) -> &mut [u8] {
        &mut self.0[field::ECHO_DATA]
    }
}

impl AsRef<[u8]> for icmpv4 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an echo message.
///
/// Other messages are never generated and only reported as `Unsupported` when parsed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr {
    EchoRequest {
        ident: u16,
        seq_no: u16,
        data_len: usize,
    },
    EchoReply {
        ident: u16,
        seq_no: u16,
        data_len: usize,
    },
}

impl Repr {
    /// Parse an echo message, verifying the checksum.
    pub fn parse(packet: &icmpv4) -> Result<Repr> {
        packet.check_len()?;
        if !packet.verify_checksum() {
            return Err(Error::WrongChecksum)
        }

        let ident = packet.echo_ident();
        let seq_no = packet.echo_seq_no();
        let data_len = packet.echo_data().len();
        match (packet.msg_type(), packet.msg_code()) {
            (Message::EchoRequest, 0) => Ok(Repr::EchoRequest { ident, seq_no, data_len }),
            (Message::EchoReply, 0) => Ok(Repr::EchoReply { ident, seq_no, data_len }),
            _ => Err(Error::Unsupported),
        }
    }

    /// The length of header and data.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::EchoRequest { data_len, .. } | Repr::EchoReply { data_len, .. } => {
                ECHO_HEADER_LEN + data_len
            },
        }
    }

    /// Emit the header into a message whose data is already in place, then fill the checksum.
    pub fn emit(&self, packet: &mut icmpv4) {
        let (message, ident, seq_no) = match *self {
            Repr::EchoRequest { ident, seq_no, .. } => (Message::EchoRequest, ident, seq_no),
            Repr::EchoReply { ident, seq_no, .. } => (Message::EchoReply, ident, seq_no),
        };
        packet.set_msg_type(message);
        packet.set_msg_code(0);
        packet.set_echo_ident(ident);
        packet.set_echo_seq_no(seq_no);
        packet.fill_checksum()
    }

    /// The reply answering this request, `None` for anything else.
    pub fn reply(&self) -> Option<Repr> {
        match *self {
            Repr::EchoRequest { ident, seq_no, data_len } => {
                Some(Repr::EchoReply { ident, seq_no, data_len })
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static ECHO_PACKET_BYTES: [u8; 12] =
        [0x08, 0x00, 0x8e, 0xfe,
         0x12, 0x34, 0xab, 0xcd,
         0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn echo_deconstruct() {
        let packet = icmpv4::new_checked(&ECHO_PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.msg_type(), Message::EchoRequest);
        assert_eq!(packet.echo_ident(), 0x1234);
        assert_eq!(packet.echo_seq_no(), 0xabcd);
        assert_eq!(packet.echo_data(), &ECHO_PACKET_BYTES[8..]);
        assert_eq!(Repr::parse(packet), Ok(Repr::EchoRequest {
            ident: 0x1234,
            seq_no: 0xabcd,
            data_len: 4,
        }));
    }

    #[test]
    fn reply_in_place() {
        let mut bytes = ECHO_PACKET_BYTES;
        let request = Repr::parse(icmpv4::new_checked(&bytes[..]).unwrap()).unwrap();
        let reply = request.reply().unwrap();
        reply.emit(icmpv4::new_unchecked_mut(&mut bytes));

        let packet = icmpv4::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.msg_type(), Message::EchoReply);
        assert!(packet.verify_checksum());
        assert_eq!(packet.echo_data(), &ECHO_PACKET_BYTES[8..]);
        assert_eq!(Repr::parse(packet), Ok(reply));
    }
}
