//! Initial sequence numbers after rfc6528.
//!
//! The secret is the key of a SipHash-2-4 over the connection tuple instead of being hashed along
//! with it. The hash function is from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use crate::rand::Xoroshiro256;
use crate::time::Instant;
use crate::wire::Ipv4Address;

/// An initial sequence number generator based on SipHash-2-4.
///
/// > ISN = M + SipHash-2-4(secretkey, localip, localport, remoteip, remoteport)
///
/// where `M` is a timer advancing every four milliseconds.
#[derive(Clone, Copy)]
pub struct IsnGenerator {
    keys: (u64, u64),
}

// Yes, that's the initial values, as ASCII text.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl IsnGenerator {
    /// Create a generator with a chosen secret key.
    pub fn new(k0: u64, k1: u64) -> Self {
        IsnGenerator { keys: (k0, k1) }
    }

    /// Draw the secret key from a generator.
    ///
    /// The key is only as secret as the seed of the generator.
    pub fn from_rng(rng: &mut Xoroshiro256) -> Self {
        let k0 = rng.next();
        let k1 = rng.next();
        IsnGenerator::new(k0, k1)
    }

    /// Get the initial sequence number for a connection.
    pub fn get_isn(
        &self,
        local: Ipv4Address,
        remote: Ipv4Address,
        local_port: u16,
        remote_port: u16,
        time: Instant,
    ) -> u32 {
        let mut state = State::init(self.keys.0, self.keys.1);

        let m = u64::from(local.to_network_integer())
            | u64::from(remote.to_network_integer()) << 32;
        let p = u64::from(local_port)
            | u64::from(remote_port) << 16
            // Message length = 12
            | 12_u64 << 56;
        state.absorb(m);
        state.absorb(p);
        let hash = state.finalize();

        (hash as u32).wrapping_add((time.total_millis() / 4) as u32)
    }
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process one 8-byte block.
    ///
    /// The final block carrying the message length must be absorbed by the caller.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appendix A of the paper, a 15 byte message.
    #[test]
    fn paper_test_vector() {
        let k0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        let k1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());

        let mut state = State::init(k0, k1);
        state.absorb(u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes()));
        state.absorb(u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes()));

        assert_eq!(state.finalize(), 0xa129ca6149be45e5);
    }

    #[test]
    fn isn_depends_on_tuple_and_time() {
        let isn = IsnGenerator::new(1, 2);
        let here = Ipv4Address::new(10, 0, 0, 1);
        let there = Ipv4Address::new(10, 0, 0, 2);
        let zero = Instant::from_millis(0);

        let base = isn.get_isn(here, there, 80, 50000, zero);
        assert_eq!(base, isn.get_isn(here, there, 80, 50000, zero));
        assert_ne!(base, isn.get_isn(here, there, 80, 50001, zero));
        assert_eq!(base.wrapping_add(1), isn.get_isn(here, there, 80, 50000, Instant::from_millis(4)));
    }
}
