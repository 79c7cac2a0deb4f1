//! The simple network time protocol packet, as used by a client without clock discipline.
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

/// The port of a time server.
pub const SERVER_PORT: u16 = 123;

/// The length of a packet without extension fields or authenticator.
pub const PACKET_LEN: usize = field::TRANSMIT.end;

byte_wrapper! {
    /// A byte sequence representing an ntp packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ntp([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const FLAGS:      usize = 0;
    pub(crate) const STRATUM:    usize = 1;
    pub(crate) const POLL:       usize = 2;
    pub(crate) const PRECISION:  usize = 3;
    pub(crate) const ROOT_DELAY: Field = 4..8;
    pub(crate) const ROOT_DISP:  Field = 8..12;
    // Reference id, reference, origin and receive timestamps.
    pub(crate) const TRANSMIT:   Field = 40..48;
}

/// Leap indicator unknown, version 4, client mode.
pub const CLIENT_FLAGS: u8 = 0xe3;

impl ntp {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Check that the data is exactly one packet long.
    ///
    /// Longer packets would carry extensions that a client does not expect.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    pub fn check_len(&self) -> Result<()> {
        match self.0.len() {
            len if len < PACKET_LEN => Err(Error::Truncated),
            PACKET_LEN => Ok(()),
            _ => Err(Error::Unsupported),
        }
    }

    pub fn flags(&self) -> u8 {
        self.0[field::FLAGS]
    }

    /// The mode, the lowest three bits of the flags.
    pub fn mode(&self) -> u8 {
        self.flags() & 0x07
    }

    pub fn stratum(&self) -> u8 {
        self.0[field::STRATUM]
    }

    /// The seconds part of the transmit timestamp, since 1900.
    pub fn transmit_seconds(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::TRANSMIT][..4])
    }

    /// Write a client request, all timestamps zero.
    pub fn fill_request(&mut self) {
        for byte in self.0[..PACKET_LEN].iter_mut() {
            *byte = 0;
        }
        self.0[field::FLAGS] = CLIENT_FLAGS;
        self.0[field::STRATUM] = 0;
        self.0[field::POLL] = 4;
        self.0[field::PRECISION] = 0xfa;
        // One second root delay and dispersion, in 16.16 fixed point.
        NetworkEndian::write_u32(&mut self.0[field::ROOT_DELAY], 0x0001_0000);
        NetworkEndian::write_u32(&mut self.0[field::ROOT_DISP], 0x0001_0000);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_layout() {
        let mut bytes = [0xa5; PACKET_LEN];
        ntp::new_unchecked_mut(&mut bytes).fill_request();
        assert_eq!(&bytes[..12], &[0xe3, 0, 4, 0xfa, 0, 1, 0, 0, 0, 1, 0, 0]);
        assert!(bytes[12..].iter().all(|&b| b == 0));
        assert_eq!(ntp::new_unchecked(&bytes).mode(), 3);
    }

    #[test]
    fn transmit_seconds() {
        let mut bytes = [0; PACKET_LEN];
        bytes[0] = 0x24;
        bytes[40..44].copy_from_slice(&[0xe8, 0x3f, 0x2a, 0x00]);
        let packet = ntp::new_checked(&bytes).unwrap();
        assert_eq!(packet.mode(), 4);
        assert_eq!(packet.transmit_seconds(), 0xe83f_2a00);
    }

    #[test]
    fn exact_length() {
        let bytes = [0; PACKET_LEN + 4];
        assert_eq!(ntp::new_checked(&bytes[..47]), Err(Error::Truncated));
        assert_eq!(ntp::new_checked(&bytes[..]), Err(Error::Unsupported));
    }
}
