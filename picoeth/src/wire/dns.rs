//! Domain name system messages, just enough to resolve a host name to an address.
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::Ipv4Address;

/// The port of a name server.
pub const SERVER_PORT: u16 = 53;

/// The length of the message header.
pub const HEADER_LEN: usize = field::ARCOUNT.end;

/// The largest number of compression pointers followed while reading one name.
const MAX_POINTERS: usize = 16;

enum_with_unknown! {
    /// Resource record type.
    pub enum Type(u16) {
        A     = 0x0001,
        Ns    = 0x0002,
        Cname = 0x0005,
        Ptr   = 0x000c,
        Mx    = 0x000f,
        Aaaa  = 0x001c,
    }
}

enum_with_unknown! {
    /// Resource record class.
    pub enum Class(u16) {
        Internet = 0x0001,
    }
}

byte_wrapper! {
    /// A byte sequence representing a dns message.
    #[derive(Debug, PartialEq, Eq)]
    pub struct dns([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const ID:      Field = 0..2;
    pub(crate) const FLAGS:   Field = 2..4;
    pub(crate) const QDCOUNT: Field = 4..6;
    pub(crate) const ANCOUNT: Field = 6..8;
    pub(crate) const NSCOUNT: Field = 8..10;
    pub(crate) const ARCOUNT: Field = 10..12;

    pub(crate) const FLG_RESPONSE:  u16 = 0x8000;
    pub(crate) const FLG_RECURSION: u16 = 0x0100;
    pub(crate) const RCODE_MASK:    u16 = 0x000f;
}

impl dns {
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

    /// Ensure that the header accessors will not panic.
    ///
    /// The variable length sections are checked while they are read.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    pub fn transaction_id(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ID])
    }

    pub fn flags(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLAGS])
    }

    pub fn is_response(&self) -> bool {
        self.flags() & field::FLG_RESPONSE != 0
    }

    /// The response code, zero for success.
    pub fn rcode(&self) -> u8 {
        (self.flags() & field::RCODE_MASK) as u8
    }

    pub fn question_count(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::QDCOUNT])
    }

    pub fn answer_count(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ANCOUNT])
    }

    pub fn set_transaction_id(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ID], value)
    }

    pub fn set_flags(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], value)
    }

    /// Set the number of entries of the four sections.
    pub fn set_counts(&mut self, questions: u16, answers: u16, authorities: u16, additional: u16) {
        NetworkEndian::write_u16(&mut self.0[field::QDCOUNT], questions);
        NetworkEndian::write_u16(&mut self.0[field::ANCOUNT], answers);
        NetworkEndian::write_u16(&mut self.0[field::NSCOUNT], authorities);
        NetworkEndian::write_u16(&mut self.0[field::ARCOUNT], additional);
    }

    /// Iterate the answer section, after skipping all questions.
    pub fn answers(&self) -> Result<Answers<'_>> {
        let mut pos = HEADER_LEN;
        for _ in 0..self.question_count() {
            pos = skip_name(&self.0, pos)?;
            // Type and class.
            pos += 4;
        }

        if pos > self.0.len() {
            return Err(Error::Truncated);
        }

        Ok(Answers {
            message: &self.0,
            pos,
            remaining: self.answer_count(),
        })
    }

    /// Compare an encoded name within this message to a dotted host name, ignoring case.
    pub fn name_matches(&self, at: usize, hostname: &str) -> Result<bool> {
        let mut expected = hostname.trim_end_matches('.').split('.');
        let mut pos = at;
        let mut pointers = 0;
        loop {
            let len = *self.0.get(pos).ok_or(Error::Truncated)?;
            match len & 0xc0 {
                0xc0 => {
                    pointers += 1;
                    if pointers > MAX_POINTERS {
                        return Err(Error::Malformed);
                    }
                    let low = *self.0.get(pos + 1).ok_or(Error::Truncated)?;
                    pos = usize::from(len & 0x3f) << 8 | usize::from(low);
                },
                0x00 if len == 0 => return Ok(expected.next().is_none()),
                0x00 => {
                    let label = self.0.get(pos + 1..pos + 1 + usize::from(len))
                        .ok_or(Error::Truncated)?;
                    match expected.next() {
                        Some(part) if part.as_bytes().eq_ignore_ascii_case(label) => (),
                        _ => return Ok(false),
                    }
                    pos += 1 + usize::from(len);
                },
                _ => return Err(Error::Unsupported),
            }
        }
    }
}

/// Return the position after the name starting at `pos`, without following pointers.
fn skip_name(message: &[u8], mut pos: usize) -> Result<usize> {
    loop {
        let len = *message.get(pos).ok_or(Error::Truncated)?;
        match len & 0xc0 {
            0xc0 => return Ok(pos + 2),
            0x00 if len == 0 => return Ok(pos + 1),
            0x00 => pos += 1 + usize::from(len),
            _ => return Err(Error::Unsupported),
        }
    }
}

/// One resource record of the answer section.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Record<'a> {
    /// Where the owner name starts, for `dns::name_matches`.
    pub name_at: usize,
    pub rtype: Type,
    pub class: Class,
    pub ttl: u32,
    pub data: &'a [u8],
}

impl<'a> Record<'a> {
    /// The address of an internet `A` record.
    pub fn address(&self) -> Option<Ipv4Address> {
        match (self.rtype, self.class, self.data.len()) {
            (Type::A, Class::Internet, 4) => Some(Ipv4Address::from_bytes(self.data)),
            _ => None,
        }
    }
}

/// An iterator over the answer records of a message.
#[derive(Clone, Debug)]
pub struct Answers<'a> {
    message: &'a [u8],
    pos: usize,
    remaining: u16,
}

impl<'a> Answers<'a> {
    fn read(&mut self) -> Result<Record<'a>> {
        let name_at = self.pos;
        let pos = skip_name(self.message, name_at)?;
        let fixed = self.message.get(pos..pos + 10).ok_or(Error::Truncated)?;
        let data_len = usize::from(NetworkEndian::read_u16(&fixed[8..10]));
        let data = self.message.get(pos + 10..pos + 10 + data_len).ok_or(Error::Truncated)?;
        self.pos = pos + 10 + data_len;
        Ok(Record {
            name_at,
            rtype: Type::from(NetworkEndian::read_u16(&fixed[0..2])),
            class: Class::from(NetworkEndian::read_u16(&fixed[2..4])),
            ttl: NetworkEndian::read_u32(&fixed[4..8]),
            data,
        })
    }
}

impl<'a> Iterator for Answers<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let record = self.read();
        self.remaining = if record.is_ok() { self.remaining - 1 } else { 0 };
        Some(record)
    }
}

/// A query for the `A` record of a host.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Query<'a> {
    pub transaction_id: u16,
    pub hostname: &'a str,
}

impl<'a> Query<'a> {
    /// The encoded length of the message.
    ///
    /// A name is encoded as one length octet per label plus the terminating zero label.
    pub fn buffer_len(&self) -> usize {
        let name = self.hostname.trim_end_matches('.');
        HEADER_LEN + name.len() + 2 + 4
    }

    /// Emit the query with recursion desired.
    ///
    /// Returns `Malformed` for empty labels, labels longer than 63 octets, or names longer than
    /// 255 octets, and `Truncated` if the buffer is too short.
    pub fn emit(&self, packet: &mut dns) -> Result<usize> {
        let name = self.hostname.trim_end_matches('.');
        let len = self.buffer_len();
        if name.is_empty() || name.len() + 2 > 255 {
            return Err(Error::Malformed);
        }
        if name.split('.').any(|label| label.is_empty() || label.len() > 63) {
            return Err(Error::Malformed);
        }
        if packet.0.len() < len {
            return Err(Error::Truncated);
        }

        packet.set_transaction_id(self.transaction_id);
        packet.set_flags(field::FLG_RECURSION);
        packet.set_counts(1, 0, 0, 0);

        let mut pos = HEADER_LEN;
        for label in name.split('.') {
            packet.0[pos] = label.len() as u8;
            packet.0[pos + 1..pos + 1 + label.len()].copy_from_slice(label.as_bytes());
            pos += 1 + label.len();
        }
        packet.0[pos] = 0;
        NetworkEndian::write_u16(&mut packet.0[pos + 1..pos + 3], Type::A.into());
        NetworkEndian::write_u16(&mut packet.0[pos + 3..pos + 5], Class::Internet.into());
        Ok(len)
    }
}

/// Find the first address record of a response for the given host.
///
/// Follows the rule of a minimal resolver: the response must carry an answer whose name is the
/// queried host, then the first `A` record of the answer section is taken. Aliases are not
/// resolved further.
pub fn resolve(packet: &dns, hostname: &str) -> Result<Option<Ipv4Address>> {
    packet.check_len()?;
    if !packet.is_response() || packet.rcode() != 0 {
        return Ok(None);
    }

    let mut for_host = false;
    for record in packet.answers()? {
        if packet.name_matches(record?.name_at, hostname)? {
            for_host = true;
            break;
        }
    }

    if !for_host {
        return Ok(None);
    }

    for record in packet.answers()? {
        if let Some(address) = record?.address() {
            return Ok(Some(address));
        }
    }

    Ok(None)
}
