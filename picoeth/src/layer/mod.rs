//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. All processing state lives in one [`Stack`]: the arp cache,
//! the udp and tcp session tables with their port registries and the dhcp, dns and ntp clients.
//! The state is open to modifications by the user program while no processing takes place,
//! similar to reconfiguration on the OS level with utilities such as `arp` or `ifconfig`.
//!
//! ## Receiving
//!
//! [`Stack::update`] drains all frames queued at the device. Each frame is parsed in the shared
//! buffer, layer by layer, and handed to the port application of its destination. Nothing on the
//! receive path is reported to the caller: a frame that can not be processed is dropped, with a
//! trace level log of the reason.
//!
//! ## Sending
//!
//! Sending is staged in the same buffer. A `start_packet` call of the udp or tcp layer resolves the
//! peer and hands out the payload region, the matching `send` fills in all headers and hands the
//! frame to the device. Between those two calls the buffer belongs to the staged packet, the stack
//! remembers the socket it was started for and refuses to send anything else.
//!
//! [`Stack`]: struct.Stack.html
//! [`Stack::update`]: struct.Stack.html#method.update
#[cfg(test)]
#[macro_use]
mod test_util;

pub mod arp;
pub mod dhcp;
pub mod dns;
mod eth;
mod icmp;
pub mod ntp;
mod stack;
mod table;
pub mod tcp;
pub mod udp;

pub use self::stack::{Stack, Storage};
pub use self::table::Port;

/// The result type of stack operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The error type of stack operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The operation was not permitted.
    ///
    /// Returned for stale socket handles, for sending without a staged packet, for packets that do
    /// not parse and by devices that failed an operation.
    Illegal,

    /// Not enough space for the requested packet.
    ///
    /// The payload does not fit the packet buffer. In contrast to `Illegal` this would signal that
    /// a smaller size may be possible.
    BadSize,

    /// Unable to resolve the hardware address of the destination, or its gateway.
    Unreachable,

    /// The action could not be completed because there were not enough resources.
    ///
    /// The main difference towards `Illegal` is that implies that it would have been legal with
    /// more resources, in a larger session table or port registry.
    Exhausted,

    /// The port already has an application registered.
    InUse,

    /// A blocking operation gave up waiting.
    Timeout,

    /// The device reported impossible data and needs to be reinitialized.
    Corrupted,
}

/// Can convert from a wire error.
///
/// This indicates some layer tried to operate on a packet but failed.
impl From<crate::wire::Error> for Error {
    fn from(_: crate::wire::Error) -> Self {
        Error::Illegal
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Error::Illegal => write!(f, "illegal operation"),
            Error::BadSize => write!(f, "packet does not fit the buffer"),
            Error::Unreachable => write!(f, "destination unreachable"),
            Error::Exhausted => write!(f, "table exhausted"),
            Error::InUse => write!(f, "port in use"),
            Error::Timeout => write!(f, "timed out"),
            Error::Corrupted => write!(f, "device corrupted"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

