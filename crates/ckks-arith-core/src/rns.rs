//! RNS (Residue Number System) modular arithmetic.
//!
//! All CKKS operations decompose into independent sub-operations on 64-bit
//! residues, one per modulus of the active chain. This module provides the
//! modular primitives, the [`RnsPoly`] container and CRT reconstruction.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::params::Modulus;

/// Modular addition: (a + b) mod q.
/// Assumes a, b < q < 2^63.
#[inline(always)]
pub fn mod_add(a: u64, b: u64, q: u64) -> u64 {
    let sum = a + b;
    if sum >= q {
        sum - q
    } else {
        sum
    }
}

/// Modular subtraction: (a - b) mod q.
/// Assumes a, b < q.
#[inline(always)]
pub fn mod_sub(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        q - b + a
    }
}

/// Modular multiplication: (a * b) mod q using 128-bit intermediate.
#[inline(always)]
pub fn mod_mul(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Modular exponentiation: a^exp mod q.
pub fn mod_pow(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut result: u64 = 1 % q;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, q);
        }
        exp >>= 1;
        base = mod_mul(base, base, q);
    }
    result
}

/// Modular inverse: a^{-1} mod q using Fermat's little theorem.
/// Requires q prime and a ≢ 0 (mod q).
pub fn mod_inv(a: u64, q: u64) -> u64 {
    assert!(a % q != 0, "Cannot invert zero");
    mod_pow(a, q - 2, q)
}

/// Map a signed integer into [0, q).
#[inline(always)]
pub fn reduce_signed(x: i64, q: u64) -> u64 {
    if x >= 0 {
        (x as u64) % q
    } else {
        let r = x.unsigned_abs() % q;
        if r == 0 {
            0
        } else {
            q - r
        }
    }
}

/// Centered representative of x mod q, in (-q/2, q/2].
#[inline(always)]
pub fn center(x: u64, q: u64) -> i64 {
    if x > q / 2 {
        -((q - x) as i64)
    } else {
        x as i64
    }
}

/// Find a primitive 2N-th root of unity modulo q.
/// For NTT on the ring Z_q[X]/(X^N+1), we need ψ such that ψ^{2N} ≡ 1 (mod q)
/// and ψ^N ≡ -1 (mod q).
///
/// Requires: q prime and q ≡ 1 (mod 2N). Every chain prime satisfies this by
/// construction.
pub fn find_primitive_root(n: usize, q: u64) -> u64 {
    let two_n = (2 * n) as u64;
    assert_eq!(
        q % two_n,
        1,
        "q={q} is not NTT-friendly: q mod 2N = {} (expected 1)",
        q % two_n
    );

    // ψ = g^((q-1)/(2N)) has order dividing 2N; it is primitive iff ψ^N = -1.
    let exponent = (q - 1) / two_n;
    for g in 2..q {
        let psi = mod_pow(g, exponent, q);
        if mod_pow(psi, n as u64, q) == q - 1 {
            return psi;
        }
    }
    panic!("No primitive 2N-th root of unity found for q={q}, N={n}");
}

/// Powers of ψ in bit-reversed order: twiddles[bit_reverse(i)] = ψ^i.
pub fn compute_twiddle_factors(n: usize, psi: u64, q: u64) -> Vec<u64> {
    let log_n = n.trailing_zeros();
    let mut twiddles = vec![0u64; n];
    let mut power = 1u64;
    for i in 0..n {
        twiddles[bit_reverse(i as u32, log_n) as usize] = power;
        power = mod_mul(power, psi, q);
    }
    twiddles
}

/// Powers of ψ^{-1} in bit-reversed order.
pub fn compute_inv_twiddle_factors(n: usize, psi: u64, q: u64) -> Vec<u64> {
    compute_twiddle_factors(n, mod_inv(psi, q), q)
}

/// Bit-reverse an integer of given bit width.
#[inline]
pub fn bit_reverse(mut x: u32, bits: u32) -> u32 {
    let mut result = 0u32;
    for _ in 0..bits {
        result = (result << 1) | (x & 1);
        x >>= 1;
    }
    result
}

/// An RNS polynomial: one coefficient vector per active modulus.
///
/// Whether the limbs hold coefficients or NTT evaluations is tracked by the
/// owner (ciphertexts and keys are kept in NTT form, plaintexts in
/// coefficient form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsPoly {
    /// limbs[l][i] = coefficient (or evaluation) i mod q_l.
    pub limbs: Vec<Vec<u64>>,
    /// Polynomial degree N.
    pub n: usize,
}

impl RnsPoly {
    /// Create a zero polynomial with `num_limbs` limbs of N coefficients each.
    pub fn zero(n: usize, num_limbs: usize) -> Self {
        Self {
            limbs: vec![vec![0u64; n]; num_limbs],
            n,
        }
    }

    /// Lift signed integer coefficients into every limb.
    pub fn from_signed(coeffs: &[i64], moduli: &[Modulus]) -> Self {
        let limbs = moduli
            .iter()
            .map(|m| coeffs.iter().map(|&c| reduce_signed(c, m.value)).collect())
            .collect();
        Self {
            limbs,
            n: coeffs.len(),
        }
    }

    pub fn num_limbs(&self) -> usize {
        self.limbs.len()
    }

    /// Drop every limb above `num_limbs`.
    pub fn truncate_limbs(&mut self, num_limbs: usize) {
        self.limbs.truncate(num_limbs);
    }

    /// Copy of the first `num_limbs` limbs.
    pub fn prefix(&self, num_limbs: usize) -> Self {
        Self {
            limbs: self.limbs[..num_limbs].to_vec(),
            n: self.n,
        }
    }

    /// Element-wise addition of two RNS polynomials.
    pub fn add(&self, other: &Self, moduli: &[Modulus]) -> Self {
        self.zip_with(other, moduli, mod_add)
    }

    /// Element-wise subtraction of two RNS polynomials.
    pub fn sub(&self, other: &Self, moduli: &[Modulus]) -> Self {
        self.zip_with(other, moduli, mod_sub)
    }

    /// Element-wise (Hadamard) multiplication, used for NTT-domain products.
    pub fn hadamard_mul(&self, other: &Self, moduli: &[Modulus]) -> Self {
        self.zip_with(other, moduli, mod_mul)
    }

    /// In-place self += a ⊙ b (NTT-domain multiply-accumulate).
    pub fn add_hadamard_assign(&mut self, a: &Self, b: &Self, moduli: &[Modulus]) {
        assert_eq!(self.n, a.n);
        assert_eq!(self.n, b.n);
        for (l, limb) in self.limbs.iter_mut().enumerate() {
            let q = moduli[l].value;
            for (i, coeff) in limb.iter_mut().enumerate() {
                *coeff = mod_add(*coeff, mod_mul(a.limbs[l][i], b.limbs[l][i], q), q);
            }
        }
    }

    fn zip_with(&self, other: &Self, moduli: &[Modulus], op: fn(u64, u64, u64) -> u64) -> Self {
        assert_eq!(self.n, other.n);
        assert_eq!(self.limbs.len(), other.limbs.len());
        let mut result = Self::zero(self.n, self.limbs.len());
        for l in 0..self.limbs.len() {
            let q = moduli[l].value;
            for i in 0..self.n {
                result.limbs[l][i] = op(self.limbs[l][i], other.limbs[l][i], q);
            }
        }
        result
    }
}

/// Pre-computed CRT data for reconstructing integers mod Q = q_0 · ... · q_k.
#[derive(Debug, Clone)]
pub struct CrtBasis {
    product: BigInt,
    half_product: BigInt,
    /// basis[i] = (Q/q_i) · [(Q/q_i)^{-1} mod q_i], so Σ r_i·basis[i] ≡ x (mod Q).
    basis: Vec<BigInt>,
}

impl CrtBasis {
    pub fn new(moduli: &[Modulus]) -> Self {
        let product: BigInt = moduli.iter().map(|m| BigInt::from(m.value)).product();
        let basis = moduli
            .iter()
            .map(|m| {
                let q_hat = &product / m.value;
                let q_hat_mod = (&q_hat % m.value).to_u64().unwrap_or(0);
                let inv = mod_inv(q_hat_mod, m.value);
                q_hat * inv
            })
            .collect();
        let half_product = &product / 2u32;
        Self {
            product,
            half_product,
            basis,
        }
    }

    /// Reconstruct the centered integer in (-Q/2, Q/2] from its residues.
    pub fn reconstruct_centered(&self, residues: &[u64]) -> BigInt {
        let mut x = BigInt::zero();
        for (r, b) in residues.iter().zip(&self.basis) {
            x += b * *r;
        }
        x %= &self.product;
        if x.is_negative() {
            x += &self.product;
        }
        if x > self.half_product {
            x -= &self.product;
        }
        x
    }
}
