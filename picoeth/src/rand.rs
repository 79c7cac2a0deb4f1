//! A small pseudo random number generator.
//!
//! Used for ephemeral ports and dhcp transaction ids, where unpredictability is nice to have but
//! not a security property. Initial tcp sequence numbers come from a keyed hash instead, see
//! [`IsnGenerator`].
//!
//! [`IsnGenerator`]: ../layer/tcp/struct.IsnGenerator.html

/// Xoshiro256**, yes this is far too good.
#[derive(Copy, Clone, Debug, Hash)]
pub struct Xoroshiro256 {
    state: [u64; 4],
}

/// The first port of the dynamic range, used for ephemeral local ports.
pub const EPHEMERAL_PORTS: u16 = 49152;

impl Xoroshiro256 {
    /// Seed the generator.
    ///
    /// The state is expanded from the seed with SplitMix64 so that no seed, not even zero, leaves
    /// the generator in its all-zero fixpoint.
    pub fn new(seed: u64) -> Self {
        let mut mix = seed;
        let mut state = [0; 4];
        for word in state.iter_mut() {
            mix = mix.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = mix;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            *word = z ^ (z >> 31);
        }
        Xoroshiro256 { state }
    }

    /// Generate the next 64 random bits.
    pub fn next(&mut self) -> u64 {
        let s = &mut self.state;
        let result_starstar = s[1]
            .wrapping_mul(5)
            .rotate_left(7)
            .wrapping_mul(9);

        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];

        s[2] ^= t;

        s[3] = s[3].rotate_left(45);

        result_starstar
    }

    /// Generate 32 random bits.
    pub fn next_u32(&mut self) -> u32 {
        (self.next() >> 32) as u32
    }

    /// Pick a port from the dynamic range.
    pub fn ephemeral_port(&mut self) -> u16 {
        let span = u32::from(u16::max_value() - EPHEMERAL_PORTS) + 1;
        EPHEMERAL_PORTS + (self.next_u32() % span) as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_seed_is_not_stuck() {
        let mut prng = Xoroshiro256::new(0);
        let a = prng.next();
        let b = prng.next();
        assert_ne!(a, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn ports_are_dynamic() {
        let mut prng = Xoroshiro256::new(42);
        for _ in 0..1000 {
            assert!(prng.ephemeral_port() >= EPHEMERAL_PORTS);
        }
    }
}
