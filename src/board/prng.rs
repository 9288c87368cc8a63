/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Fixed seed state, so that every run produces the same hash keys and magic numbers.
const SEEDS: [u64; 4] = [
    0x9E3779B97F4A7C15,
    0xD1B54A32D192ED03,
    0x8CB92BA72F3D8DD7,
    0x5851F42D4C957F2D,
];

/// A small deterministic pseudo-random number generator (xoshiro256**).
///
/// Reference: <https://prng.di.unimi.it/xoshiro256starstar.c>
#[derive(Clone, Copy, Debug)]
pub struct XoShiRo([u64; 4]);

impl XoShiRo {
    #[inline(always)]
    pub const fn new() -> Self {
        Self(SEEDS)
    }

    /// A generator whose state is the default seeds perturbed by `salt`.
    #[inline(always)]
    pub const fn with_salt(salt: u64) -> Self {
        let mut s = SEEDS;
        s[0] ^= salt.wrapping_mul(0xA24BAED4963EE407);
        s[3] ^= salt.rotate_left(29);
        Self(s)
    }

    /// `const` version of [`XoShiRo::next_u64`], returning the value and the advanced generator.
    #[inline(always)]
    pub const fn next_const(self) -> (u64, Self) {
        let mut s = self.0;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);

        (result, Self(s))
    }

    #[inline(always)]
    pub fn next_u64(&mut self) -> u64 {
        let (value, next) = self.next_const();
        *self = next;
        value
    }

    /// A random number with few bits set. Good candidates for magic multipliers.
    #[inline(always)]
    pub fn next_sparse_u64(&mut self) -> u64 {
        self.next_u64() & self.next_u64() & self.next_u64()
    }
}

impl Default for XoShiRo {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prng_is_deterministic() {
        let mut a = XoShiRo::new();
        let mut b = XoShiRo::new();
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_salted_generators_differ() {
        let mut a = XoShiRo::with_salt(1);
        let mut b = XoShiRo::with_salt(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }
}
