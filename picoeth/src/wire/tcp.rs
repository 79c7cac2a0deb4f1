use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::ipv4::{checksum, Address, Protocol};

/// A set of tcp flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u16);

byte_wrapper! {
    /// A byte sequence representing a Transmission Control Protocol segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) fn options(length: u8) -> Field {
        URGENT.end..(length as usize)
    }

    pub(crate) const FLG_FIN: u16 = 0x001;
    pub(crate) const FLG_SYN: u16 = 0x002;
    pub(crate) const FLG_RST: u16 = 0x004;
    pub(crate) const FLG_PSH: u16 = 0x008;
    pub(crate) const FLG_ACK: u16 = 0x010;
    pub(crate) const FLG_URG: u16 = 0x020;

    pub(crate) const OPT_END: u8 = 0x00;
    pub(crate) const OPT_NOP: u8 = 0x01;
    pub(crate) const OPT_MSS: u8 = 0x02;
}

/// The length of a header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

impl tcp {
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
    /// Returns `Err(Error::Malformed)` if the header length field has a value smaller
    /// than the minimal header length.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            let header_len = self.header_len() as usize;
            if len < header_len {
                Err(Error::Truncated)
            } else if header_len < HEADER_LEN {
                Err(Error::Malformed)
            } else {
                Ok(())
            }
        }
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    #[inline]
    pub fn seq_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::SEQ_NUM])
    }

    #[inline]
    pub fn ack_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::ACK_NUM])
    }

    /// Return the flags, without the header length bits.
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags(NetworkEndian::read_u16(&self.0[field::FLAGS]) & 0x1ff)
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Validate the checksum over pseudo header, header and payload.
    pub fn verify_checksum(&self, src_addr: Address, dst_addr: Address) -> bool {
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Tcp, self.0.len() as u16),
            checksum::data(&self.0),
        ]) == !0
    }

    pub fn options(&self) -> &[u8] {
        let header_len = self.header_len();
        &self.0[field::options(header_len)]
    }

    pub fn payload_slice(&self) -> &[u8] {
        let header_len = self.header_len() as usize;
        &self.0[header_len..]
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
    pub fn set_seq_number(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value)
    }

    #[inline]
    pub fn set_ack_number(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value)
    }

    /// Set the flags, keeping the header length.
    #[inline]
    pub fn set_flags(&mut self, Flags(flags): Flags) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & !0x0fff) | (flags & 0x0fff);
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & !0xf000) | (u16::from(value) / 4) << 12;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Compute and fill in the checksum.
    ///
    /// The segment is the whole underlying slice, header and payload.
    pub fn fill_checksum(&mut self, src_addr: Address, dst_addr: Address) {
        self.set_checksum(0);
        let checksum = !checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, Protocol::Tcp, self.0.len() as u16),
            checksum::data(&self.0),
        ]);
        self.set_checksum(checksum)
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        &mut self.0[field::options(header_len)]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        &mut self.0[header_len..]
    }
}

impl AsRef<[u8]> for tcp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Flags {
    pub const FIN: Flags = Flags(field::FLG_FIN);
    pub const SYN: Flags = Flags(field::FLG_SYN);
    pub const RST: Flags = Flags(field::FLG_RST);
    pub const PSH: Flags = Flags(field::FLG_PSH);
    pub const ACK: Flags = Flags(field::FLG_ACK);
    pub const URG: Flags = Flags(field::FLG_URG);

    /// Return the FIN flag.
    #[inline]
    pub fn fin(&self) -> bool {
        self.0 & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(&self) -> bool {
        self.0 & field::FLG_SYN != 0
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(&self) -> bool {
        self.0 & field::FLG_RST != 0
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(&self) -> bool {
        self.0 & field::FLG_PSH != 0
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(&self) -> bool {
        self.0 & field::FLG_ACK != 0
    }

    /// Return the URG flag.
    #[inline]
    pub fn urg(&self) -> bool {
        self.0 & field::FLG_URG != 0
    }

    #[inline]
    pub fn set_fin(&mut self, value: bool) {
        self.set(field::FLG_FIN, value)
    }

    #[inline]
    pub fn set_syn(&mut self, value: bool) {
        self.set(field::FLG_SYN, value)
    }

    #[inline]
    pub fn set_rst(&mut self, value: bool) {
        self.set(field::FLG_RST, value)
    }

    #[inline]
    pub fn set_psh(&mut self, value: bool) {
        self.set(field::FLG_PSH, value)
    }

    #[inline]
    pub fn set_ack(&mut self, value: bool) {
        self.set(field::FLG_ACK, value)
    }

    fn set(&mut self, bit: u16, value: bool) {
        if value {
            self.0 |= bit
        } else {
            self.0 &= !bit
        }
    }
}

impl core::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (field::FLG_SYN, "syn"),
            (field::FLG_FIN, "fin"),
            (field::FLG_RST, "rst"),
            (field::FLG_PSH, "psh"),
            (field::FLG_ACK, "ack"),
            (field::FLG_URG, "urg"),
        ];
        let mut first = true;
        for &(bit, name) in names.iter() {
            if self.0 & bit != 0 {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A representation of a single TCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    EndOfList,
    NoOperation,
    MaxSegmentSize(u16),
    Unknown { kind: u8, data: &'a [u8] }
}

impl<'a> TcpOption<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.get(0).ok_or(Error::Truncated)? {
            field::OPT_END => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            field::OPT_NOP => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error::Truncated)? as usize;
                let data = buffer.get(2..length).ok_or(Error::Truncated)?;
                option = match (kind, length) {
                    (field::OPT_MSS, 4) =>
                        TcpOption::MaxSegmentSize(NetworkEndian::read_u16(data)),
                    (field::OPT_MSS, _) =>
                        return Err(Error::Malformed),
                    (_, _) =>
                        TcpOption::Unknown { kind, data },
                };
            }
        }
        Ok((&buffer[length..], option))
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList => 1,
            TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::Unknown { data, .. } => 2 + data.len()
        }
    }

    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        match *self {
            TcpOption::EndOfList => {
                // There may be padding space which also should be initialized.
                for p in buffer.iter_mut() {
                    *p = field::OPT_END;
                }
            }
            TcpOption::NoOperation => {
                buffer[0] = field::OPT_NOP;
            }
            TcpOption::MaxSegmentSize(value) => {
                buffer[0] = field::OPT_MSS;
                buffer[1] = length as u8;
                NetworkEndian::write_u16(&mut buffer[2..4], value)
            }
            TcpOption::Unknown { kind, data: provided } => {
                buffer[0] = kind;
                buffer[1] = length as u8;
                buffer[2..length].copy_from_slice(provided)
            }
        }
        &mut buffer[length..]
    }
}

/// A high-level representation of a Transmission Control Protocol segment header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port:     u16,
    pub dst_port:     u16,
    pub flags:        Flags,
    pub seq_number:   u32,
    pub ack_number:   u32,
    pub window_len:   u16,
    pub max_seg_size: Option<u16>,
    pub payload_len:  usize,
}

impl Repr {
    /// Parse a Transmission Control Protocol segment and return a high-level representation.
    ///
    /// The segment is the whole slice, as bounded by the ip total length.
    pub fn parse(packet: &tcp, src_addr: Address, dst_addr: Address) -> Result<Repr> {
        packet.check_len()?;

        // Source and destination ports must be present.
        if packet.src_port() == 0 || packet.dst_port() == 0 {
            return Err(Error::Malformed)
        }

        if !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::WrongChecksum)
        }

        let mut max_seg_size = None;
        let mut options = packet.options();
        while !options.is_empty() {
            let (next_options, option) = TcpOption::parse(options)?;
            match option {
                TcpOption::EndOfList => break,
                TcpOption::MaxSegmentSize(value) => max_seg_size = Some(value),
                _ => (),
            }
            options = next_options;
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            flags: packet.flags(),
            seq_number: packet.seq_number(),
            ack_number: packet.ack_number(),
            window_len: packet.window_len(),
            max_seg_size,
            payload_len: packet.payload_slice().len(),
        })
    }

    /// Return the length of the header, options included.
    pub fn header_len(&self) -> usize {
        match self.max_seg_size {
            Some(_) => HEADER_LEN + 4,
            None => HEADER_LEN,
        }
    }

    /// Return the length of header and payload.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    /// Emit the header into a segment whose payload is already in place, then fill the checksum.
    ///
    /// The packet must be exactly `buffer_len()` long.
    pub fn emit(&self, packet: &mut tcp, src_addr: Address, dst_addr: Address) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number);
        packet.set_header_len(self.header_len() as u8);
        packet.set_flags(self.flags);
        packet.set_window_len(self.window_len);
        packet.set_urgent_at(0);
        if let Some(value) = self.max_seg_size {
            TcpOption::MaxSegmentSize(value).emit(packet.options_mut());
        }
        packet.fill_checksum(src_addr, dst_addr)
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} [{}] seq={} ack={} win={} len={}",
               self.src_port, self.dst_port, self.flags,
               self.seq_number, self.ack_number, self.window_len, self.payload_len)?;
        if let Some(mss) = self.max_seg_size {
            write!(f, " mss={}", mss)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SRC_ADDR: Address = Address([192, 168, 1, 1]);
    const DST_ADDR: Address = Address([192, 168, 1, 2]);

    static SYN_PACKET_BYTES: [u8; 24] =
        [0xbf, 0x00, 0x00, 0x50,
         0x00, 0x00, 0x03, 0xe8,
         0x00, 0x00, 0x00, 0x00,
         0x60, 0x02, 0x01, 0x5a,
         0x00, 0x00, 0x00, 0x00,
         0x02, 0x04, 0x01, 0x5a];

    fn syn_repr() -> Repr {
        Repr {
            src_port:     48896,
            dst_port:     80,
            flags:        Flags::SYN,
            seq_number:   1000,
            ack_number:   0,
            window_len:   346,
            max_seg_size: Some(346),
            payload_len:  0,
        }
    }

    #[test]
    fn syn_with_mss() {
        let mut bytes = [0xa5; 24];
        syn_repr().emit(tcp::new_unchecked_mut(&mut bytes), SRC_ADDR, DST_ADDR);

        // All but the checksum are fixed.
        assert_eq!(&bytes[..16], &SYN_PACKET_BYTES[..16]);
        assert_eq!(&bytes[18..], &SYN_PACKET_BYTES[18..]);

        let packet = tcp::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.header_len(), 24);
        assert!(packet.flags().syn());
        assert!(!packet.flags().ack());
        assert!(packet.verify_checksum(SRC_ADDR, DST_ADDR));
        assert_eq!(Repr::parse(packet, SRC_ADDR, DST_ADDR), Ok(syn_repr()));
    }

    #[test]
    fn data_segment() {
        let repr = Repr {
            flags: Flags::PSH | Flags::ACK,
            seq_number: 1001,
            ack_number: 2001,
            max_seg_size: None,
            payload_len: 4,
            ..syn_repr()
        };
        let mut bytes = [0; 24];
        bytes[20..].copy_from_slice(b"ping");
        repr.emit(tcp::new_unchecked_mut(&mut bytes), SRC_ADDR, DST_ADDR);

        let packet = tcp::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.payload_slice(), b"ping");
        assert_eq!(packet.flags(), Flags::PSH | Flags::ACK);
        assert_eq!(Repr::parse(packet, SRC_ADDR, DST_ADDR), Ok(repr));
        assert!(!packet.verify_checksum(SRC_ADDR, Address([192, 168, 1, 3])));
    }

    #[test]
    fn impossible_len() {
        let mut bytes = [0; 20];
        tcp::new_unchecked_mut(&mut bytes).set_header_len(16);
        assert_eq!(tcp::new_checked(&bytes[..]), Err(Error::Malformed));
        tcp::new_unchecked_mut(&mut bytes).set_header_len(24);
        assert_eq!(tcp::new_checked(&bytes[..]), Err(Error::Truncated));
    }

    #[test]
    fn flags_keep_header_len() {
        let mut bytes = [0; 20];
        let packet = tcp::new_unchecked_mut(&mut bytes);
        packet.set_header_len(20);
        packet.set_flags(Flags::FIN | Flags::ACK);
        assert_eq!(packet.header_len(), 20);
        assert!(packet.flags().fin());
        assert_eq!(bytes[12], 0x50);
        assert_eq!(bytes[13], 0x11);
    }

    #[test]
    fn tcp_options() {
        assert_eq!(TcpOption::parse(&[0x02, 0x04, 0x05, 0xdc]),
                   Ok((&[][..], TcpOption::MaxSegmentSize(1500))));
        assert_eq!(TcpOption::parse(&[0x01, 0x00]),
                   Ok((&[0x00][..], TcpOption::NoOperation)));
        assert_eq!(TcpOption::parse(&[0x0c, 0x03, 0x01]),
                   Ok((&[][..], TcpOption::Unknown { kind: 12, data: &[1][..] })));
        assert_eq!(TcpOption::parse(&[]), Err(Error::Truncated));
        assert_eq!(TcpOption::parse(&[0x0c, 0x05, 0x01]), Err(Error::Truncated));
        assert_eq!(TcpOption::parse(&[0x02, 0x02]), Err(Error::Malformed));
    }
}
