// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Fixed-width 4096-bit and 256-bit modular arithmetic.
//!
//! Two facades, [`Bignum4096`] and [`Bignum256`], expose the raw operation
//! set (add-with-carry, subtract-with-borrow, double-width multiply, modular
//! reduction/exponentiation/inversion, big-endian codecs, strict less-than
//! mask). Each is generic over the limb width; `Bignum4096<u64>` and
//! `Bignum4096<u32>` run the same algorithms and therefore agree on every
//! input.
//!
//! Repeated `mod` / `mod_exp` calls against one modulus should go through a
//! [`MontgomeryContext`], constructed once and shared read-only across
//! threads.

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::limb::{self, Limb};

/// Errors reported by the bignum facade.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BignumError {
    /// A modulus was not odd, or was not greater than one.
    #[error("modulus must be odd and greater than one")]
    InvalidModulus,

    /// `mod_exp` was invoked with a zero-width exponent.
    #[error("exponent bit width must be greater than zero")]
    ZeroBitExponent,

    /// Inversion was requested for a value congruent to zero.
    #[error("value has no multiplicative inverse")]
    NotInvertible,

    /// A byte string had the wrong length for the fixed width.
    #[error("expected {expected} bytes, got {actual}")]
    ByteLengthMismatch { expected: usize, actual: usize },
}

/// A reusable context for reduction and exponentiation modulo one odd
/// modulus. Immutable after construction; safe to share across threads.
#[derive(Clone, Debug)]
pub struct MontgomeryContext<L: Limb> {
    /// The modulus `n`, little-endian limbs.
    modulus: Vec<L>,
    /// `R mod n`, where `R = 2^(limb_bits * limbs)`. Doubles as the
    /// Montgomery form of one and as the carry-fold offset `2^width mod n`.
    r1: Vec<L>,
    /// `R^2 mod n`.
    r2: Vec<L>,
    /// `-n^(-1) mod 2^limb_bits`.
    n0: L,
}

impl<L: Limb> MontgomeryContext<L> {
    /// Builds a context for the given odd modulus (little-endian limbs).
    pub fn new(modulus: &[L]) -> Result<Self, BignumError> {
        let odd = modulus
            .first()
            .map(|l| l.lsb() == L::ONE)
            .unwrap_or(false);
        let gt_one = limb::bit_length(modulus) > 1;
        if !odd || !gt_one {
            return Err(BignumError::InvalidModulus);
        }

        let n0 = {
            // Newton iteration for the word inverse of an odd n converges
            // from x = n (correct to 3 bits) doubling per step.
            let n = modulus[0];
            let mut x = n;
            for _ in 0..6 {
                let t = L::from_u64_truncating(2).wrapping_sub(n.wrapping_mul(x));
                x = x.wrapping_mul(t);
            }
            x.wrapping_neg()
        };

        // r1 = 2^width mod n by repeated doubling of 1.
        let len = modulus.len();
        let width_bits = len * L::BITS as usize;
        let mut r1 = vec![L::ZERO; len];
        r1[0] = L::ONE;
        for _ in 0..width_bits {
            double_mod(&mut r1, modulus);
        }
        // r2 = 2^(2*width) mod n, continuing the chain.
        let mut r2 = r1.clone();
        for _ in 0..width_bits {
            double_mod(&mut r2, modulus);
        }

        Ok(Self {
            modulus: modulus.to_vec(),
            r1,
            r2,
            n0,
        })
    }

    pub fn modulus(&self) -> &[L] {
        &self.modulus
    }

    fn limbs(&self) -> usize {
        self.modulus.len()
    }

    /// Montgomery product `a * b * R^(-1) mod n`.
    ///
    /// Requires `a * b < n * R`, which holds whenever either factor is
    /// reduced below `n`. The result is always reduced below `n`.
    pub fn mont_mul(&self, a: &[L], b: &[L]) -> Vec<L> {
        let len = self.limbs();
        debug_assert!(a.len() == len && b.len() == len);

        let mut t = vec![L::ZERO; 2 * len + 1];
        limb::mul(a, b, &mut t[..2 * len]);

        for i in 0..len {
            let m = t[i].wrapping_mul(self.n0);
            let mut carry = L::ZERO;
            for j in 0..len {
                let (lo, hi) = t[i + j].mac(m, self.modulus[j], carry);
                t[i + j] = lo;
                carry = hi;
            }
            let mut k = i + len;
            while carry != L::ZERO && k < t.len() {
                let (s, c) = t[k].carrying_add(carry, L::ZERO);
                t[k] = s;
                carry = c;
                k += 1;
            }
        }

        let overflow = t[2 * len];
        let mut res = t[len..2 * len].to_vec();
        if overflow != L::ZERO {
            // The implicit high bit absorbs the borrow.
            let _ = limb::sub_in_place(&mut res, &self.modulus);
        } else if limb::cmp(&res, &self.modulus) != Ordering::Less {
            let _ = limb::sub_in_place(&mut res, &self.modulus);
        }
        t.fill(L::ZERO);
        res
    }

    /// Converts a reduced value into Montgomery form (`a * R mod n`).
    pub fn to_mont(&self, a: &[L]) -> Vec<L> {
        self.mont_mul(a, &self.r2)
    }

    /// Converts out of Montgomery form (`a_mont * R^(-1) mod n`).
    pub fn from_mont(&self, a_mont: &[L]) -> Vec<L> {
        let mut one = vec![L::ZERO; self.limbs()];
        one[0] = L::ONE;
        self.mont_mul(a_mont, &one)
    }

    /// The Montgomery form of one (`R mod n`).
    pub fn mont_one(&self) -> Vec<L> {
        self.r1.clone()
    }

    /// `(a + b) mod n` for already-reduced operands.
    fn add_mod_reduced(&self, a: &[L], b: &[L]) -> Vec<L> {
        let mut sum = vec![L::ZERO; self.limbs()];
        let carry = limb::add(a, b, &mut sum);
        if carry != L::ZERO {
            let _ = limb::sub_in_place(&mut sum, &self.modulus);
        } else if limb::cmp(&sum, &self.modulus) != Ordering::Less {
            let _ = limb::sub_in_place(&mut sum, &self.modulus);
        }
        sum
    }

    /// `(a - b) mod n` for already-reduced operands.
    fn sub_mod_reduced(&self, a: &[L], b: &[L]) -> Vec<L> {
        let mut diff = vec![L::ZERO; self.limbs()];
        let borrow = limb::sub(a, b, &mut diff);
        if borrow != L::ZERO {
            let _ = limb::add_in_place(&mut diff, &self.modulus);
        }
        diff
    }

    /// Reduces a single-width value (any value below `2^width`) modulo `n`.
    pub fn reduce(&self, a: &[L]) -> Vec<L> {
        debug_assert!(a.len() == self.limbs());
        if limb::cmp(a, &self.modulus) == Ordering::Less {
            return a.to_vec();
        }
        // a * R mod n, then strip the R factor.
        let ar = self.mont_mul(a, &self.r2);
        self.from_mont(&ar)
    }

    /// Reduces a double-width value modulo `n`.
    ///
    /// `a` holds `2 * limbs` little-endian limbs.
    pub fn reduce_double(&self, a: &[L]) -> Vec<L> {
        let len = self.limbs();
        debug_assert!(a.len() == 2 * len);
        let lo = &a[..len];
        let hi = &a[len..];
        // a = hi * R + lo; mont_mul(hi, r2) = hi * R mod n.
        let hi_part = self.mont_mul(hi, &self.r2);
        let lo_part = self.reduce(lo);
        self.add_mod_reduced(&hi_part, &lo_part)
    }

    /// `(a + b) mod n`, total over all single-width inputs.
    pub fn add_mod(&self, a: &[L], b: &[L]) -> Vec<L> {
        let mut sum = vec![L::ZERO; self.limbs()];
        let carry = limb::add(a, b, &mut sum);
        let mut res = self.reduce(&sum);
        if carry != L::ZERO {
            // Fold the lost 2^width carry back in: 2^width ≡ r1 (mod n).
            res = self.add_mod_reduced(&res, &self.r1);
        }
        res
    }

    /// `(a - b) mod n`, total over all single-width inputs.
    pub fn sub_mod(&self, a: &[L], b: &[L]) -> Vec<L> {
        let mut diff = vec![L::ZERO; self.limbs()];
        let borrow = limb::sub(a, b, &mut diff);
        let mut res = self.reduce(&diff);
        if borrow != L::ZERO {
            // The wrapped difference is 2^width too large.
            res = self.sub_mod_reduced(&res, &self.r1);
        }
        res
    }

    /// `(a * b) mod n`, total over all single-width inputs.
    pub fn mul_mod(&self, a: &[L], b: &[L]) -> Vec<L> {
        let mut prod = vec![L::ZERO; 2 * self.limbs()];
        limb::mul(a, b, &mut prod);
        let res = self.reduce_double(&prod);
        prod.fill(L::ZERO);
        res
    }

    /// `base^exp mod n`.
    ///
    /// `exp_bits` is an upper bound on the significant bits of `exp`; zero is
    /// rejected (callers special-case a zero exponent). `const_time` selects
    /// the variant that touches every exponent bit identically.
    pub fn pow_mod(
        &self,
        base: &[L],
        exp: &[L],
        exp_bits: usize,
        const_time: bool,
    ) -> Result<Vec<L>, BignumError> {
        if exp_bits == 0 {
            return Err(BignumError::ZeroBitExponent);
        }
        let base_red = self.reduce(base);
        let base_mont = self.to_mont(&base_red);

        let mut acc = self.r1.clone(); // Montgomery one
        if const_time {
            for i in (0..exp_bits).rev() {
                acc = self.mont_mul(&acc, &acc);
                let mul = self.mont_mul(&acc, &base_mont);
                let mask = if limb::bit(exp, i) { L::MAX } else { L::ZERO };
                for j in 0..acc.len() {
                    acc[j] = acc[j].xor(mask.and(acc[j].xor(mul[j])));
                }
            }
        } else {
            for i in (0..exp_bits).rev() {
                acc = self.mont_mul(&acc, &acc);
                if limb::bit(exp, i) {
                    acc = self.mont_mul(&acc, &base_mont);
                }
            }
        }
        Ok(self.from_mont(&acc))
    }

    /// `a^(-1) mod n` by Fermat, for prime `n`.
    pub fn inv_mod_prime(&self, a: &[L]) -> Result<Vec<L>, BignumError> {
        let a_red = self.reduce(a);
        if limb::is_zero(&a_red) {
            return Err(BignumError::NotInvertible);
        }
        let mut exp = self.modulus.clone();
        let mut two = vec![L::ZERO; self.limbs()];
        two[0] = L::from_u64_truncating(2);
        let _ = limb::sub_in_place(&mut exp, &two);
        self.pow_mod(&a_red, &exp, self.limbs() * L::BITS as usize, false)
    }
}

/// `a = 2a mod n` for `a < n`.
fn double_mod<L: Limb>(a: &mut [L], n: &[L]) {
    let mut carry = L::ZERO;
    for limb in a.iter_mut() {
        let (s, c) = limb.carrying_add(*limb, carry);
        *limb = s;
        carry = c;
    }
    if carry != L::ZERO {
        // Implicit high bit absorbs the borrow.
        let _ = limb::sub_in_place(a, n);
    } else if limb::cmp(a, n) != Ordering::Less {
        let _ = limb::sub_in_place(a, n);
    }
}

macro_rules! bignum_facade {
    ($name:ident, $bits:literal, $doc:literal) => {
        #[doc = $doc]
        pub struct $name<L: Limb = u64>(PhantomData<L>);

        impl<L: Limb> $name<L> {
            pub const BITS: usize = $bits;
            pub const BYTES: usize = $bits / 8;

            /// Limb count at this width.
            pub const fn limbs() -> usize {
                $bits / L::BITS as usize
            }

            /// `res = (a + b) mod 2^width`; returns the carry limb.
            pub fn add(a: &[L], b: &[L], res: &mut [L]) -> L {
                debug_assert!(a.len() == Self::limbs());
                limb::add(a, b, res)
            }

            /// `res = (a - b) mod 2^width`; returns the borrow limb.
            pub fn sub(a: &[L], b: &[L], res: &mut [L]) -> L {
                debug_assert!(a.len() == Self::limbs());
                limb::sub(a, b, res)
            }

            /// Full product into a double-width `res`.
            pub fn mul(a: &[L], b: &[L], res: &mut [L]) {
                debug_assert!(res.len() == 2 * Self::limbs());
                limb::mul(a, b, res)
            }

            /// `res = a mod n` for a double-width `a`.
            pub fn mod_reduce(n: &[L], a: &[L], res: &mut [L]) -> bool {
                match MontgomeryContext::new(n) {
                    Ok(ctx) => {
                        res.copy_from_slice(&ctx.reduce_double(a));
                        true
                    }
                    Err(_) => false,
                }
            }

            /// `res = a^b mod n`. `b_bits` bounds the exponent width.
            pub fn mod_exp(
                n: &[L],
                a: &[L],
                b_bits: usize,
                b: &[L],
                res: &mut [L],
                const_time: bool,
            ) -> bool {
                let Ok(ctx) = MontgomeryContext::new(n) else {
                    return false;
                };
                match ctx.pow_mod(a, b, b_bits, const_time) {
                    Ok(v) => {
                        res.copy_from_slice(&v);
                        true
                    }
                    Err(_) => false,
                }
            }

            /// `res = a^(-1) mod n` for prime `n`.
            pub fn mod_inv_prime(n: &[L], a: &[L], res: &mut [L]) -> bool {
                let Ok(ctx) = MontgomeryContext::new(n) else {
                    return false;
                };
                match ctx.inv_mod_prime(a) {
                    Ok(v) => {
                        res.copy_from_slice(&v);
                        true
                    }
                    Err(_) => false,
                }
            }

            /// Strict big-endian decode of exactly `BYTES` bytes.
            pub fn from_bytes_be(bytes: &[u8], res: &mut [L]) -> Result<(), BignumError> {
                if bytes.len() != Self::BYTES {
                    return Err(BignumError::ByteLengthMismatch {
                        expected: Self::BYTES,
                        actual: bytes.len(),
                    });
                }
                limb::from_be_bytes(bytes, res);
                Ok(())
            }

            /// Fixed-width big-endian encode.
            pub fn to_bytes_be(a: &[L]) -> Vec<u8> {
                debug_assert!(a.len() == Self::limbs());
                limb::to_be_bytes(a)
            }

            /// All-ones limb when `a < b`.
            pub fn lt_mask(a: &[L], b: &[L]) -> L {
                limb::lt_mask(a, b)
            }
        }
    };
}

bignum_facade!(
    Bignum4096,
    4096,
    "Fixed-width 4096-bit integer operations (64 × u64 or 128 × u32 limbs)."
);
bignum_facade!(
    Bignum256,
    256,
    "Fixed-width 256-bit integer operations (4 × u64 or 8 × u32 limbs)."
);

static_assertions::const_assert_eq!(Bignum4096::<u64>::limbs(), 64);
static_assertions::const_assert_eq!(Bignum4096::<u32>::limbs(), 128);
static_assertions::const_assert_eq!(Bignum256::<u64>::limbs(), 4);
static_assertions::const_assert_eq!(Bignum256::<u32>::limbs(), 8);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn ctx64(n: u64) -> MontgomeryContext<u64> {
        MontgomeryContext::new(&[n, 0, 0, 0]).unwrap()
    }

    fn val(x: u64) -> [u64; 4] {
        [x, 0, 0, 0]
    }

    #[test]
    fn rejects_bad_moduli() {
        assert_eq!(
            MontgomeryContext::new(&[4u64, 0]).unwrap_err(),
            BignumError::InvalidModulus
        );
        assert_eq!(
            MontgomeryContext::new(&[1u64, 0]).unwrap_err(),
            BignumError::InvalidModulus
        );
    }

    #[test]
    fn add_sub_mul_mod_small_prime() {
        let ctx = ctx64(101);
        assert_eq!(ctx.add_mod(&val(70), &val(60)), val(29));
        assert_eq!(ctx.sub_mod(&val(3), &val(10)), val(94));
        assert_eq!(ctx.mul_mod(&val(55), &val(44)), val((55 * 44) % 101));
    }

    #[test]
    fn add_mod_handles_unreduced_and_carry() {
        let ctx = ctx64(101);
        // Unreduced operands far above the modulus.
        let a = [u64::MAX, u64::MAX, u64::MAX, u64::MAX];
        let expected = {
            // 2^256 - 1 mod 101 computed by repeated squaring: 2^256 mod 101.
            let mut p: u128 = 2;
            let mut acc: u128 = 1;
            let mut e = 256u32;
            while e > 0 {
                if e & 1 == 1 {
                    acc = acc * p % 101;
                }
                p = p * p % 101;
                e >>= 1;
            }
            ((acc + 101 - 1) % 101) as u64
        };
        assert_eq!(ctx.reduce(&a), val(expected));
        // a + a wraps; the fold must still give (2a mod 101).
        assert_eq!(ctx.add_mod(&a, &a), val((expected * 2) % 101));
    }

    #[test]
    fn pow_mod_matches_reference() {
        let ctx = ctx64(1_000_003);
        let mut expected: u64 = 1;
        for _ in 0..77 {
            expected = expected * 12345 % 1_000_003;
        }
        let got = ctx.pow_mod(&val(12345), &val(77), 256, false).unwrap();
        assert_eq!(got, val(expected));
        let got_ct = ctx.pow_mod(&val(12345), &val(77), 256, true).unwrap();
        assert_eq!(got_ct, val(expected));
    }

    #[test]
    fn pow_mod_rejects_zero_bit_exponent() {
        let ctx = ctx64(101);
        assert_eq!(
            ctx.pow_mod(&val(3), &val(0), 0, false).unwrap_err(),
            BignumError::ZeroBitExponent
        );
    }

    #[test]
    fn inv_mod_prime() {
        let ctx = ctx64(101);
        let inv = ctx.inv_mod_prime(&val(7)).unwrap();
        assert_eq!(ctx.mul_mod(&val(7), &inv), val(1));
        assert_eq!(
            ctx.inv_mod_prime(&val(0)).unwrap_err(),
            BignumError::NotInvertible
        );
    }

    #[test]
    fn limb_width_parity_256() {
        // The same computation at both limb widths must agree byte for byte.
        let n_bytes: Vec<u8> = {
            let mut v = vec![0u8; 32];
            v[31] = 0xEF; // 0xEF = 239, prime
            v
        };
        let a_bytes: Vec<u8> = {
            let mut v = vec![0u8; 32];
            v[0] = 0x12;
            v[31] = 0x34;
            v
        };
        let e_bytes: Vec<u8> = {
            let mut v = vec![0u8; 32];
            v[31] = 0x0B;
            v
        };

        let mut n64 = [0u64; 4];
        let mut a64 = [0u64; 4];
        let mut e64 = [0u64; 4];
        Bignum256::<u64>::from_bytes_be(&n_bytes, &mut n64).unwrap();
        Bignum256::<u64>::from_bytes_be(&a_bytes, &mut a64).unwrap();
        Bignum256::<u64>::from_bytes_be(&e_bytes, &mut e64).unwrap();

        let mut n32 = [0u32; 8];
        let mut a32 = [0u32; 8];
        let mut e32 = [0u32; 8];
        Bignum256::<u32>::from_bytes_be(&n_bytes, &mut n32).unwrap();
        Bignum256::<u32>::from_bytes_be(&a_bytes, &mut a32).unwrap();
        Bignum256::<u32>::from_bytes_be(&e_bytes, &mut e32).unwrap();

        let mut r64 = [0u64; 4];
        let mut r32 = [0u32; 8];
        assert!(Bignum256::<u64>::mod_exp(&n64, &a64, 256, &e64, &mut r64, false));
        assert!(Bignum256::<u32>::mod_exp(&n32, &a32, 256, &e32, &mut r32, false));
        assert_eq!(
            Bignum256::<u64>::to_bytes_be(&r64),
            Bignum256::<u32>::to_bytes_be(&r32)
        );

        let mut i64out = [0u64; 4];
        let mut i32out = [0u32; 8];
        assert!(Bignum256::<u64>::mod_inv_prime(&n64, &a64, &mut i64out));
        assert!(Bignum256::<u32>::mod_inv_prime(&n32, &a32, &mut i32out));
        assert_eq!(
            Bignum256::<u64>::to_bytes_be(&i64out),
            Bignum256::<u32>::to_bytes_be(&i32out)
        );
    }

    #[test]
    fn limb_width_parity_4096() {
        // A 4096-bit modular exponentiation at both widths, with a short
        // exponent to keep the wide schoolbook multiplies affordable.
        let mut n_bytes = vec![0u8; 512];
        n_bytes[0] = 0xC1;
        n_bytes[511] = 0x0B; // odd
        let mut a_bytes = vec![0u8; 512];
        a_bytes[1] = 0x9E;
        a_bytes[510] = 0x77;
        let mut e_bytes = vec![0u8; 512];
        e_bytes[511] = 0x35;

        let mut n64 = [0u64; 64];
        let mut a64 = [0u64; 64];
        let mut e64 = [0u64; 64];
        Bignum4096::<u64>::from_bytes_be(&n_bytes, &mut n64).unwrap();
        Bignum4096::<u64>::from_bytes_be(&a_bytes, &mut a64).unwrap();
        Bignum4096::<u64>::from_bytes_be(&e_bytes, &mut e64).unwrap();

        let mut n32 = [0u32; 128];
        let mut a32 = [0u32; 128];
        let mut e32 = [0u32; 128];
        Bignum4096::<u32>::from_bytes_be(&n_bytes, &mut n32).unwrap();
        Bignum4096::<u32>::from_bytes_be(&a_bytes, &mut a32).unwrap();
        Bignum4096::<u32>::from_bytes_be(&e_bytes, &mut e32).unwrap();

        let mut r64 = [0u64; 64];
        let mut r32 = [0u32; 128];
        assert!(Bignum4096::<u64>::mod_exp(&n64, &a64, 8, &e64, &mut r64, false));
        assert!(Bignum4096::<u32>::mod_exp(&n32, &a32, 8, &e32, &mut r32, false));
        assert_eq!(
            Bignum4096::<u64>::to_bytes_be(&r64),
            Bignum4096::<u32>::to_bytes_be(&r32)
        );

        let ctx64 = MontgomeryContext::new(&n64).unwrap();
        let ctx32 = MontgomeryContext::new(&n32).unwrap();
        assert_eq!(
            limb::to_be_bytes(&ctx64.mul_mod(&a64, &a64)),
            limb::to_be_bytes(&ctx32.mul_mod(&a32, &a32))
        );
    }

    #[test]
    fn facade_add_mul_roundtrip() {
        let a = val(0xDEAD_BEEF);
        let b = val(0x1234_5678);
        let mut sum = [0u64; 4];
        assert_eq!(Bignum256::<u64>::add(&a, &b, &mut sum), 0);
        assert_eq!(sum[0], 0xDEAD_BEEF + 0x1234_5678);

        let mut prod = [0u64; 8];
        Bignum256::<u64>::mul(&a, &b, &mut prod);
        assert_eq!(prod[0], 0xDEAD_BEEFu64.wrapping_mul(0x1234_5678));
    }
}
