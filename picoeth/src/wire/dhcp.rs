//! The BOOTP message format with DHCP options.
//!
//! Only the subset a client needs is represented: the fixed header, the magic cookie, and the
//! options used to acquire, renew and release a lease. Unknown options are skipped when parsing
//! and never generated.
use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::{EthernetAddress, Ipv4Address};

/// The server's well-known port.
pub const SERVER_PORT: u16 = 67;

/// The client's well-known port.
pub const CLIENT_PORT: u16 = 68;

/// The value of the cookie separating the BOOTP header from the options.
pub const MAGIC_COOKIE: u32 = 0x6382_5363;

/// The broadcast bit in the flags field.
pub const FLAG_BROADCAST: u16 = 0x8000;

enum_with_unknown! {
    /// The BOOTP operation code.
    pub enum OpCode(u8) {
        Request = 1,
        Reply = 2,
    }
}

enum_with_unknown! {
    /// The DHCP message type, option 53.
    pub enum MessageType(u8) {
        Discover = 1,
        Offer = 2,
        Request = 3,
        Decline = 4,
        Ack = 5,
        Nak = 6,
        Release = 7,
        Inform = 8,
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageType::Discover => write!(f, "DISCOVER"),
            MessageType::Offer => write!(f, "OFFER"),
            MessageType::Request => write!(f, "REQUEST"),
            MessageType::Decline => write!(f, "DECLINE"),
            MessageType::Ack => write!(f, "ACK"),
            MessageType::Nak => write!(f, "NAK"),
            MessageType::Release => write!(f, "RELEASE"),
            MessageType::Inform => write!(f, "INFORM"),
            MessageType::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

byte_wrapper! {
    /// A byte sequence representing a DHCP message.
    #[derive(Debug, PartialEq, Eq)]
    pub struct dhcp([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const OP:     usize = 0;
    pub(crate) const HTYPE:  usize = 1;
    pub(crate) const HLEN:   usize = 2;
    pub(crate) const XID:    Field = 4..8;
    pub(crate) const FLAGS:  Field = 10..12;
    pub(crate) const CIADDR: Field = 12..16;
    pub(crate) const YIADDR: Field = 16..20;
    pub(crate) const SIADDR: Field = 20..24;
    pub(crate) const GIADDR: Field = 24..28;
    pub(crate) const CHADDR: Field = 28..44;
    // sname and file follow, unused and always zero.
    pub(crate) const MAGIC:  Field = 236..240;
    pub(crate) const OPTIONS: Rest = 240..;

    pub(crate) const OPT_PAD:            u8 = 0;
    pub(crate) const OPT_SUBNET_MASK:    u8 = 1;
    pub(crate) const OPT_ROUTER:         u8 = 3;
    pub(crate) const OPT_DNS_SERVER:     u8 = 6;
    pub(crate) const OPT_HOST_NAME:      u8 = 12;
    pub(crate) const OPT_NTP_SERVER:     u8 = 42;
    pub(crate) const OPT_REQUESTED_IP:   u8 = 50;
    pub(crate) const OPT_LEASE_TIME:     u8 = 51;
    pub(crate) const OPT_MESSAGE_TYPE:   u8 = 53;
    pub(crate) const OPT_SERVER_ID:      u8 = 54;
    pub(crate) const OPT_PARAMETER_LIST: u8 = 55;
    pub(crate) const OPT_RENEWAL_TIME:   u8 = 58;
    pub(crate) const OPT_REBINDING_TIME: u8 = 59;
    pub(crate) const OPT_END:            u8 = 255;
}

/// The length of the fixed header including the magic cookie.
pub const HEADER_LEN: usize = field::OPTIONS.start;

/// The options a client asks for: subnet mask, router and name server.
pub const PARAMETER_REQUEST_LIST: [u8; 3] = [
    field::OPT_SUBNET_MASK,
    field::OPT_ROUTER,
    field::OPT_DNS_SERVER,
];

impl dhcp {
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

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer can not hold the header and the cookie.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    pub fn opcode(&self) -> OpCode {
        OpCode::from(self.0[field::OP])
    }

    pub fn hardware_type(&self) -> u8 {
        self.0[field::HTYPE]
    }

    pub fn hardware_len(&self) -> u8 {
        self.0[field::HLEN]
    }

    pub fn transaction_id(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::XID])
    }

    pub fn flags(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLAGS])
    }

    pub fn client_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::CIADDR])
    }

    pub fn your_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::YIADDR])
    }

    pub fn server_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::SIADDR])
    }

    pub fn relay_agent_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::GIADDR])
    }

    /// The client hardware address, as an Ethernet address.
    pub fn client_hardware_address(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::CHADDR][..6])
    }

    pub fn magic_cookie(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::MAGIC])
    }

    /// Iterate over the options, stopping at the end marker.
    pub fn options(&self) -> Options<'_> {
        Options { data: &self.0[field::OPTIONS] }
    }

    pub fn set_opcode(&mut self, value: OpCode) {
        self.0[field::OP] = value.into()
    }

    pub fn set_transaction_id(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::XID], value)
    }

    pub fn set_flags(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], value)
    }

    pub fn set_client_ip(&mut self, value: Ipv4Address) {
        self.0[field::CIADDR].copy_from_slice(value.as_bytes())
    }

    pub fn set_your_ip(&mut self, value: Ipv4Address) {
        self.0[field::YIADDR].copy_from_slice(value.as_bytes())
    }

    pub fn set_server_ip(&mut self, value: Ipv4Address) {
        self.0[field::SIADDR].copy_from_slice(value.as_bytes())
    }

    /// Write the Ethernet hardware type and length, the address, and its zero padding.
    pub fn set_client_hardware_address(&mut self, value: EthernetAddress) {
        self.0[field::HTYPE] = 1;
        self.0[field::HLEN] = 6;
        let chaddr = &mut self.0[field::CHADDR];
        chaddr[..6].copy_from_slice(value.as_bytes());
        for byte in chaddr[6..].iter_mut() {
            *byte = 0;
        }
    }

    /// Zero the whole fixed header, up to the magic cookie.
    pub fn clear_header(&mut self) {
        for byte in self.0[..field::MAGIC.start].iter_mut() {
            *byte = 0;
        }
    }

    pub fn set_magic_cookie(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::MAGIC], value)
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        &mut self.0[field::OPTIONS]
    }
}

/// A single DHCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DhcpOption<'a> {
    Pad,
    End,
    SubnetMask(Ipv4Address),
    Router(Ipv4Address),
    DnsServer(Ipv4Address),
    HostName(&'a [u8]),
    NtpServer(Ipv4Address),
    RequestedIp(Ipv4Address),
    LeaseTime(u32),
    MessageType(MessageType),
    ServerIdentifier(Ipv4Address),
    ParameterRequestList(&'a [u8]),
    RenewalTime(u32),
    RebindingTime(u32),
    Other { kind: u8, data: &'a [u8] },
}

impl<'a> DhcpOption<'a> {
    /// Parse the first option, returning the remaining data.
    ///
    /// An option whose length runs over the end of the buffer is `Truncated`. Options of interest
    /// with an unexpected length are reported as `Other`, exactly like unknown ones.
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], DhcpOption<'a>)> {
        let kind = *buffer.get(0).ok_or(Error::Truncated)?;
        match kind {
            field::OPT_PAD => return Ok((&buffer[1..], DhcpOption::Pad)),
            field::OPT_END => return Ok((&buffer[1..], DhcpOption::End)),
            _ => (),
        }

        let length = *buffer.get(1).ok_or(Error::Truncated)? as usize;
        let data = buffer.get(2..2 + length).ok_or(Error::Truncated)?;
        let address = || Ipv4Address::from_bytes(data);
        let seconds = || NetworkEndian::read_u32(data);
        let option = match (kind, length) {
            (field::OPT_SUBNET_MASK, 4) => DhcpOption::SubnetMask(address()),
            (field::OPT_ROUTER, 4) => DhcpOption::Router(address()),
            (field::OPT_DNS_SERVER, 4) => DhcpOption::DnsServer(address()),
            (field::OPT_HOST_NAME, _) => DhcpOption::HostName(data),
            (field::OPT_NTP_SERVER, 4) => DhcpOption::NtpServer(address()),
            (field::OPT_REQUESTED_IP, 4) => DhcpOption::RequestedIp(address()),
            (field::OPT_LEASE_TIME, 4) => DhcpOption::LeaseTime(seconds()),
            (field::OPT_MESSAGE_TYPE, 1) => DhcpOption::MessageType(MessageType::from(data[0])),
            (field::OPT_SERVER_ID, 4) => DhcpOption::ServerIdentifier(address()),
            (field::OPT_PARAMETER_LIST, _) => DhcpOption::ParameterRequestList(data),
            (field::OPT_RENEWAL_TIME, 4) => DhcpOption::RenewalTime(seconds()),
            (field::OPT_REBINDING_TIME, 4) => DhcpOption::RebindingTime(seconds()),
            (kind, _) => DhcpOption::Other { kind, data },
        };

        Ok((&buffer[2 + length..], option))
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            DhcpOption::Pad | DhcpOption::End => 1,
            DhcpOption::MessageType(_) => 3,
            DhcpOption::HostName(data)
            | DhcpOption::ParameterRequestList(data)
            | DhcpOption::Other { data, .. } => 2 + data.len(),
            _ => 6,
        }
    }

    fn kind(&self) -> u8 {
        match *self {
            DhcpOption::Pad => field::OPT_PAD,
            DhcpOption::End => field::OPT_END,
            DhcpOption::SubnetMask(_) => field::OPT_SUBNET_MASK,
            DhcpOption::Router(_) => field::OPT_ROUTER,
            DhcpOption::DnsServer(_) => field::OPT_DNS_SERVER,
            DhcpOption::HostName(_) => field::OPT_HOST_NAME,
            DhcpOption::NtpServer(_) => field::OPT_NTP_SERVER,
            DhcpOption::RequestedIp(_) => field::OPT_REQUESTED_IP,
            DhcpOption::LeaseTime(_) => field::OPT_LEASE_TIME,
            DhcpOption::MessageType(_) => field::OPT_MESSAGE_TYPE,
            DhcpOption::ServerIdentifier(_) => field::OPT_SERVER_ID,
            DhcpOption::ParameterRequestList(_) => field::OPT_PARAMETER_LIST,
            DhcpOption::RenewalTime(_) => field::OPT_RENEWAL_TIME,
            DhcpOption::RebindingTime(_) => field::OPT_REBINDING_TIME,
            DhcpOption::Other { kind, .. } => kind,
        }
    }

    /// Emit the option to the front of the buffer, returning the remaining buffer.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than `buffer_len()`, or if a variable length
    /// option holds more than 255 bytes.
    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        buffer[0] = self.kind();
        if length > 1 {
            buffer[1] = (length - 2) as u8;
            let data = &mut buffer[2..length];
            match *self {
                DhcpOption::SubnetMask(addr)
                | DhcpOption::Router(addr)
                | DhcpOption::DnsServer(addr)
                | DhcpOption::NtpServer(addr)
                | DhcpOption::RequestedIp(addr)
                | DhcpOption::ServerIdentifier(addr) => data.copy_from_slice(addr.as_bytes()),
                DhcpOption::LeaseTime(secs)
                | DhcpOption::RenewalTime(secs)
                | DhcpOption::RebindingTime(secs) => NetworkEndian::write_u32(data, secs),
                DhcpOption::MessageType(ty) => data[0] = ty.into(),
                DhcpOption::HostName(provided)
                | DhcpOption::ParameterRequestList(provided)
                | DhcpOption::Other { data: provided, .. } => data.copy_from_slice(provided),
                DhcpOption::Pad | DhcpOption::End => (),
            }
        }
        &mut buffer[length..]
    }
}

/// An iterator over the options of a message.
///
/// Yields an error once and then stops when an option is truncated.
#[derive(Clone, Debug)]
pub struct Options<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Options<'a> {
    type Item = Result<DhcpOption<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.data.is_empty() {
                return None;
            }

            match DhcpOption::parse(self.data) {
                Ok((_, DhcpOption::End)) => {
                    self.data = &[];
                    return None;
                },
                Ok((rest, DhcpOption::Pad)) => self.data = rest,
                Ok((rest, option)) => {
                    self.data = rest;
                    return Some(Ok(option));
                },
                Err(err) => {
                    self.data = &[];
                    return Some(Err(err));
                },
            }
        }
    }
}

/// A high-level representation of a DHCP message.
///
/// The same structure describes both the client messages we send and the server replies we parse.
/// Option fields are `None` when absent.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr<'a> {
    pub opcode: OpCode,
    pub message_type: MessageType,
    pub transaction_id: u32,
    pub client_hardware_address: EthernetAddress,
    /// ciaddr, only set by a client that already holds the address.
    pub client_ip: Ipv4Address,
    /// yiaddr, the address offered or assigned by the server.
    pub your_ip: Ipv4Address,
    /// Ask the server to broadcast its reply.
    pub broadcast: bool,
    pub requested_ip: Option<Ipv4Address>,
    pub server_identifier: Option<Ipv4Address>,
    pub hostname: Option<&'a [u8]>,
    pub parameter_request_list: Option<&'a [u8]>,
    pub subnet_mask: Option<Ipv4Address>,
    pub router: Option<Ipv4Address>,
    pub dns_server: Option<Ipv4Address>,
    pub ntp_server: Option<Ipv4Address>,
    pub lease_duration: Option<u32>,
    pub renewal_duration: Option<u32>,
    pub rebinding_duration: Option<u32>,
}

impl<'a> Repr<'a> {
    /// A client message with all optional fields empty.
    pub fn client(message_type: MessageType, transaction_id: u32, hardware: EthernetAddress) -> Self {
        Repr {
            opcode: OpCode::Request,
            message_type,
            transaction_id,
            client_hardware_address: hardware,
            client_ip: Ipv4Address::UNSPECIFIED,
            your_ip: Ipv4Address::UNSPECIFIED,
            broadcast: false,
            requested_ip: None,
            server_identifier: None,
            hostname: None,
            parameter_request_list: None,
            subnet_mask: None,
            router: None,
            dns_server: None,
            ntp_server: None,
            lease_duration: None,
            renewal_duration: None,
            rebinding_duration: None,
        }
    }

    /// Parse a DHCP message.
    ///
    /// Returns `Malformed` if the magic cookie is wrong or the message type is missing, and
    /// `Truncated` if any option runs over the end of the message.
    pub fn parse(packet: &'a dhcp) -> Result<Self> {
        packet.check_len()?;
        if packet.magic_cookie() != MAGIC_COOKIE {
            return Err(Error::Malformed);
        }

        let mut message_type = None;
        let mut repr = Repr::client(
            MessageType::Unknown(0),
            packet.transaction_id(),
            packet.client_hardware_address());
        repr.opcode = packet.opcode();
        repr.client_ip = packet.client_ip();
        repr.your_ip = packet.your_ip();
        repr.broadcast = packet.flags() & FLAG_BROADCAST != 0;

        for option in packet.options() {
            match option? {
                DhcpOption::MessageType(ty) => message_type = Some(ty),
                DhcpOption::SubnetMask(addr) => repr.subnet_mask = Some(addr),
                DhcpOption::Router(addr) => repr.router = Some(addr),
                DhcpOption::DnsServer(addr) => repr.dns_server = Some(addr),
                DhcpOption::HostName(name) => repr.hostname = Some(name),
                DhcpOption::NtpServer(addr) => repr.ntp_server = Some(addr),
                DhcpOption::RequestedIp(addr) => repr.requested_ip = Some(addr),
                DhcpOption::LeaseTime(secs) => repr.lease_duration = Some(secs),
                DhcpOption::ServerIdentifier(addr) => repr.server_identifier = Some(addr),
                DhcpOption::ParameterRequestList(list) => repr.parameter_request_list = Some(list),
                DhcpOption::RenewalTime(secs) => repr.renewal_duration = Some(secs),
                DhcpOption::RebindingTime(secs) => repr.rebinding_duration = Some(secs),
                DhcpOption::Pad | DhcpOption::End | DhcpOption::Other { .. } => (),
            }
        }

        repr.message_type = message_type.ok_or(Error::Malformed)?;
        Ok(repr)
    }

    /// The options in the order they are emitted.
    fn each_option(&self, mut f: impl FnMut(DhcpOption)) {
        f(DhcpOption::MessageType(self.message_type));
        if let Some(addr) = self.requested_ip {
            f(DhcpOption::RequestedIp(addr));
        }
        if let Some(addr) = self.server_identifier {
            f(DhcpOption::ServerIdentifier(addr));
        }
        if let Some(name) = self.hostname {
            f(DhcpOption::HostName(name));
        }
        if let Some(list) = self.parameter_request_list {
            f(DhcpOption::ParameterRequestList(list));
        }
        if let Some(addr) = self.subnet_mask {
            f(DhcpOption::SubnetMask(addr));
        }
        if let Some(addr) = self.router {
            f(DhcpOption::Router(addr));
        }
        if let Some(addr) = self.dns_server {
            f(DhcpOption::DnsServer(addr));
        }
        if let Some(addr) = self.ntp_server {
            f(DhcpOption::NtpServer(addr));
        }
        if let Some(secs) = self.lease_duration {
            f(DhcpOption::LeaseTime(secs));
        }
        if let Some(secs) = self.renewal_duration {
            f(DhcpOption::RenewalTime(secs));
        }
        if let Some(secs) = self.rebinding_duration {
            f(DhcpOption::RebindingTime(secs));
        }
    }

    /// The length of the complete message, header, cookie and options including the end marker.
    pub fn buffer_len(&self) -> usize {
        let mut len = HEADER_LEN + 1;
        self.each_option(|option| len += option.buffer_len());
        len
    }

    /// Emit the message into a buffer of at least `buffer_len()` bytes.
    ///
    /// Variable length options longer than 255 bytes are rejected as `Malformed` before anything
    /// is written.
    pub fn emit(&self, packet: &mut dhcp) -> Result<()> {
        let mut oversized = false;
        self.each_option(|option| oversized |= option.buffer_len() > 257);
        if oversized {
            return Err(Error::Malformed);
        }
        if packet.0.len() < self.buffer_len() {
            return Err(Error::Truncated);
        }

        packet.clear_header();
        packet.set_opcode(self.opcode);
        packet.set_transaction_id(self.transaction_id);
        packet.set_flags(if self.broadcast { FLAG_BROADCAST } else { 0 });
        packet.set_client_ip(self.client_ip);
        packet.set_your_ip(self.your_ip);
        packet.set_server_ip(Ipv4Address::UNSPECIFIED);
        packet.set_client_hardware_address(self.client_hardware_address);
        packet.set_magic_cookie(MAGIC_COOKIE);

        let mut options = packet.options_mut();
        self.each_option(|option| {
            options = option.emit(core::mem::take(&mut options));
        });
        DhcpOption::End.emit(&mut options[..1]);
        Ok(())
    }
}
