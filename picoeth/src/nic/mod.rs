//! Encapsulates a network interface card.
//!
//! The stack only ever moves whole frames in and out of its single buffer, so the interface to a
//! card is a small synchronous trait. Also permits software emulation of one, see [`External`],
//! which the tests of this crate are built on.
//!
//! [`External`]: external/struct.External.html
#[cfg(any(feature = "std", test))]
pub mod external;
#[cfg(all(feature = "std", target_os = "linux"))]
pub mod tap;

use crate::wire::EthernetAddress;
pub use crate::layer::{Error, Result};

/// A link layer device moving raw Ethernet frames.
///
/// Frames passed in and out are complete Ethernet II frames starting with the destination address.
/// Whether the card appends or strips the frame check sequence is its own business; a received
/// length may include it, the stack bounds everything by the ip total length anyways.
pub trait Device {
    /// Transmit one complete frame.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Copy the next queued frame into the buffer.
    ///
    /// Returns `Ok(0)` when no frame is queued. Returns `Err(Error::Corrupted)` when the card
    /// reported something impossible, such as a frame longer than its own receive buffer. The
    /// stack reacts to that by calling [`reinitialize`].
    ///
    /// [`reinitialize`]: #tymethod.reinitialize
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// The hardware address of the card.
    fn mac_address(&self) -> EthernetAddress;

    /// Query whether the link is up.
    fn link_status(&mut self) -> bool;

    /// Reset the card after it has been found in a corrupted state.
    fn reinitialize(&mut self);
}

impl<D: Device + ?Sized> Device for &'_ mut D {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).receive(buffer)
    }

    fn mac_address(&self) -> EthernetAddress {
        (**self).mac_address()
    }

    fn link_status(&mut self) -> bool {
        (**self).link_status()
    }

    fn reinitialize(&mut self) {
        (**self).reinitialize()
    }
}
