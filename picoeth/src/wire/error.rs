use core::fmt;

/// The error type for parsing of the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the minimum length specified, or a length field claims more
    /// data than the frame actually holds. For option lists, one of the options ran over the end
    /// of the received data.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    WrongChecksum,

    /// An incoming packet could not be recognized and was dropped.
    ///
    /// E.g. an Ethernet packet with an unknown EtherType, or an arp packet for some other
    /// combination of hardware and protocol addresses than Ethernet and IPv4.
    Unrecognized,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: an ip header claiming a header length smaller than 20 bytes; a UDP packet
    /// claiming to contain less than 8 bytes of data; a dhcp packet without the magic cookie.
    Malformed,

    /// Parsing depends on a feature that is deliberately not implemented.
    ///
    /// Similar to `Unrecognized` but in contrast we know that the packet is valid. The prime
    /// example is a fragmented ip packet, there is no memory for reassembly.
    Unsupported,
}

/// The result type for the networking stack.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Unrecognized  => write!(f, "unrecognized packet"),
            Error::Unsupported   => write!(f, "unsupported packet"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
