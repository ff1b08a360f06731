//! Number Theoretic Transform (NTT) for negacyclic polynomial arithmetic.
//!
//! All polynomial multiplications in CKKS use NTT:
//!   a · b = iNTT(NTT(a) ⊙ NTT(b))
//!
//! For the ring Z_q[X]/(X^N+1) the butterflies use powers of ψ (a primitive
//! 2N-th root of unity) in bit-reversed order, which folds the negacyclic
//! twist into the transform itself.
//!
//! Complexity: (N/2) · log₂(N) butterfly operations per limb.

use crate::params::Modulus;
use crate::rns::{
    compute_inv_twiddle_factors, compute_twiddle_factors, find_primitive_root, mod_add, mod_inv,
    mod_mul, mod_sub, RnsPoly,
};

/// Pre-computed NTT tables for a specific (N, q) pair.
#[derive(Debug, Clone)]
pub struct NttTables {
    /// Forward twiddle factors (powers of ψ in bit-reversed order).
    pub forward_twiddles: Vec<u64>,
    /// Inverse twiddle factors (powers of ψ^{-1} in bit-reversed order).
    pub inverse_twiddles: Vec<u64>,
    /// N^{-1} mod q, used to normalize after inverse NTT.
    pub n_inv: u64,
    /// The modulus q.
    pub q: u64,
    /// log₂(N).
    pub log_n: u32,
    /// Polynomial degree N.
    pub n: usize,
}

impl NttTables {
    /// Create NTT tables for a given polynomial degree and modulus.
    pub fn new(n: usize, q: u64) -> Self {
        let log_n = n.trailing_zeros();
        assert_eq!(1 << log_n, n, "N must be a power of 2");

        let psi = find_primitive_root(n, q);
        Self {
            forward_twiddles: compute_twiddle_factors(n, psi, q),
            inverse_twiddles: compute_inv_twiddle_factors(n, psi, q),
            n_inv: mod_inv(n as u64, q),
            q,
            log_n,
            n,
        }
    }

    /// One table per modulus of a chain.
    pub fn for_chain(n: usize, moduli: &[Modulus]) -> Vec<Self> {
        moduli.iter().map(|m| Self::new(n, m.value)).collect()
    }
}

/// In-place forward negacyclic NTT (Cooley-Tukey, natural in, bit-reversed out).
pub fn negacyclic_ntt_forward(a: &mut [u64], tables: &NttTables) {
    let n = tables.n;
    let q = tables.q;
    debug_assert_eq!(a.len(), n);

    let mut t = n;
    let mut m = 1;
    while m < n {
        t >>= 1;
        for i in 0..m {
            let w = tables.forward_twiddles[m + i];
            let j1 = 2 * i * t;
            for j in j1..j1 + t {
                let u = a[j];
                let v = mod_mul(a[j + t], w, q);
                a[j] = mod_add(u, v, q);
                a[j + t] = mod_sub(u, v, q);
            }
        }
        m <<= 1;
    }
}

/// In-place inverse negacyclic NTT (Gentleman-Sande, bit-reversed in, natural out).
///
/// Includes the 1/N normalization factor.
pub fn negacyclic_ntt_inverse(a: &mut [u64], tables: &NttTables) {
    let n = tables.n;
    let q = tables.q;
    debug_assert_eq!(a.len(), n);

    let mut t = 1;
    let mut m = n;
    while m > 1 {
        let h = m >> 1;
        let mut j1 = 0;
        for i in 0..h {
            let w = tables.inverse_twiddles[h + i];
            for j in j1..j1 + t {
                let u = a[j];
                let v = a[j + t];
                a[j] = mod_add(u, v, q);
                a[j + t] = mod_mul(mod_sub(u, v, q), w, q);
            }
            j1 += 2 * t;
        }
        t <<= 1;
        m = h;
    }

    for coeff in a.iter_mut() {
        *coeff = mod_mul(*coeff, tables.n_inv, q);
    }
}

/// Forward NTT on every limb of an RNS polynomial.
pub fn poly_to_ntt(poly: &mut RnsPoly, tables: &[NttTables]) {
    for (limb, t) in poly.limbs.iter_mut().zip(tables) {
        negacyclic_ntt_forward(limb, t);
    }
}

/// Inverse NTT on every limb of an RNS polynomial.
pub fn poly_from_ntt(poly: &mut RnsPoly, tables: &[NttTables]) {
    for (limb, t) in poly.limbs.iter_mut().zip(tables) {
        negacyclic_ntt_inverse(limb, t);
    }
}
