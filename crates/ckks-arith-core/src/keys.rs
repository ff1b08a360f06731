//! Key generation: secret, public and relinearization keys.
//!
//! All keys live in the NTT domain over the full modulus chain; operations at
//! a lower level use the leading limbs only.
//!
//! Relinearization uses an RNS-digit gadget. For prime q_i and digit j the
//! key pair is
//!
//!   b_ij = -a_ij·s + e_ij + 2^{w·j}·s²·[limb i only],  a_ij uniform
//!
//! Placing s² only in limb i makes the gadget a CRT unit vector, so the same
//! key works unchanged after any number of rescales.

use std::fmt;

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::info;

use crate::ciphertext::CkksContext;
use crate::params::ParamsId;
use crate::rns::{mod_add, mod_mul, mod_pow, RnsPoly};
use crate::sampling::{sample_gaussian_signed, sample_ternary_signed, sample_uniform_poly};

/// Bits per relinearization digit.
pub const RELIN_DIGIT_BITS: u32 = 16;

/// Ternary secret key s ∈ {-1, 0, 1}^N, stored in NTT domain.
#[derive(Clone)]
pub struct SecretKey {
    pub(crate) poly: RnsPoly,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// RLWE public key (b, a) with b = -a·s + e, in NTT domain.
#[derive(Debug, Clone)]
pub struct PublicKey {
    pub b: RnsPoly,
    pub a: RnsPoly,
    pub params_id: ParamsId,
}

/// Gadget keys for turning (d0, d1, d2) back into a two-component ciphertext.
#[derive(Debug, Clone)]
pub struct RelinearizationKey {
    digit_bits: u32,
    /// keys[i][j] = (b_ij, a_ij) for prime i and digit j.
    keys: Vec<Vec<(RnsPoly, RnsPoly)>>,
    pub params_id: ParamsId,
}

impl RelinearizationKey {
    pub fn digit_bits(&self) -> u32 {
        self.digit_bits
    }

    /// Number of digits used for residues modulo prime `prime_index`.
    pub fn num_digits(&self, prime_index: usize) -> usize {
        self.keys.get(prime_index).map_or(0, Vec::len)
    }

    /// Key pair (b_ij, a_ij) for prime `i` and digit `j`.
    pub(crate) fn key(&self, i: usize, j: usize) -> &(RnsPoly, RnsPoly) {
        &self.keys[i][j]
    }
}

/// Everything derived from one key-generation run.
///
/// The secret key never leaves the crate: decryption goes through
/// [`CkksContext::decrypt`], which borrows the whole bundle.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    secret: SecretKey,
    public: PublicKey,
    relin: RelinearizationKey,
    params_id: ParamsId,
}

impl KeyMaterial {
    /// Generate keys with a fresh OS-seeded ChaCha20 stream.
    pub fn generate(ctx: &CkksContext) -> Self {
        Self::generate_with_rng(ctx, &mut ChaCha20Rng::from_entropy())
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(ctx: &CkksContext, rng: &mut R) -> Self {
        let params = ctx.params();
        let n = params.ring_degree();
        let moduli = params.moduli();
        let num_limbs = moduli.len();
        let params_id = params.id();

        let s = ctx.small_to_ntt(&sample_ternary_signed(rng, n), num_limbs);
        let s_squared = s.hadamard_mul(&s, moduli);

        // b = -a·s + e
        let rlwe_sample = |rng: &mut R| -> (RnsPoly, RnsPoly) {
            let a = sample_uniform_poly(rng, n, moduli);
            let e = ctx.small_to_ntt(&sample_gaussian_signed(rng, n), num_limbs);
            let b = e.sub(&a.hadamard_mul(&s, moduli), moduli);
            (b, a)
        };

        let (b, a) = rlwe_sample(rng);
        let public = PublicKey { b, a, params_id };

        let keys = moduli
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let q = m.value;
                let digits = m.bits.div_ceil(RELIN_DIGIT_BITS) as usize;
                (0..digits)
                    .map(|j| {
                        let (mut b, a) = rlwe_sample(rng);
                        let gadget = mod_pow(2, RELIN_DIGIT_BITS as u64 * j as u64, q);
                        for (coeff, &s2) in b.limbs[i].iter_mut().zip(&s_squared.limbs[i]) {
                            *coeff = mod_add(*coeff, mod_mul(gadget, s2, q), q);
                        }
                        (b, a)
                    })
                    .collect()
            })
            .collect::<Vec<Vec<_>>>();

        let total: usize = keys.iter().map(Vec::len).sum();
        info!(
            params_id = %params_id,
            relin_digit_bits = RELIN_DIGIT_BITS,
            relin_key_pairs = total,
            "generated key material"
        );

        Self {
            secret: SecretKey { poly: s },
            public,
            relin: RelinearizationKey {
                digit_bits: RELIN_DIGIT_BITS,
                keys,
                params_id,
            },
            params_id,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn relin_key(&self) -> &RelinearizationKey {
        &self.relin
    }

    pub fn params_id(&self) -> ParamsId {
        self.params_id
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParameterSet, SecurityLevel};
    use crate::rns::center;

    fn ctx() -> CkksContext {
        CkksContext::new(ParameterSet::new(1024, &[45, 25, 25], 25, SecurityLevel::None).unwrap())
    }

    #[test]
    fn test_secret_key_is_ternary() {
        let ctx = ctx();
        let keys = KeyMaterial::generate_with_rng(&ctx, &mut ChaCha20Rng::seed_from_u64(1));
        let mut s = keys.secret_key().poly.clone();
        ctx.from_ntt(&mut s);
        let signed: Vec<Vec<i64>> = s
            .limbs
            .iter()
            .zip(ctx.params().moduli())
            .map(|(limb, m)| limb.iter().map(|&c| center(c, m.value)).collect())
            .collect();
        assert!(signed[0].iter().all(|c| (-1..=1).contains(c)));
        // Same small polynomial in every limb
        assert!(signed.iter().all(|limb| *limb == signed[0]));
    }

    #[test]
    fn test_public_key_is_small_under_secret() {
        let ctx = ctx();
        let keys = KeyMaterial::generate_with_rng(&ctx, &mut ChaCha20Rng::seed_from_u64(2));
        let moduli = ctx.params().moduli();

        // b + a·s = e must be a small error polynomial in every limb
        let pk = keys.public_key();
        let mut e = pk.b.clone();
        e.add_hadamard_assign(&pk.a, &keys.secret_key().poly, moduli);
        ctx.from_ntt(&mut e);
        for (limb, m) in e.limbs.iter().zip(moduli) {
            assert!(limb.iter().all(|&c| center(c, m.value).abs() <= 20));
        }
    }

    #[test]
    fn test_relin_key_layout() {
        let ctx = ctx();
        let keys = KeyMaterial::generate_with_rng(&ctx, &mut ChaCha20Rng::seed_from_u64(3));
        let rlk = keys.relin_key();
        assert_eq!(rlk.digit_bits(), 16);
        assert_eq!(rlk.num_digits(0), 3); // 45 bits
        assert_eq!(rlk.num_digits(1), 2); // 25 bits
        assert_eq!(rlk.num_digits(2), 2);
        assert_eq!(rlk.num_digits(3), 0);
        assert_eq!(rlk.params_id, ctx.params().id());
    }

    #[test]
    fn test_relin_key_encrypts_gadget_times_s_squared() {
        let ctx = ctx();
        let keys = KeyMaterial::generate_with_rng(&ctx, &mut ChaCha20Rng::seed_from_u64(4));
        let moduli = ctx.params().moduli();
        let s = &keys.secret_key().poly;
        let s2 = s.hadamard_mul(s, moduli);

        // b_ij + a_ij·s - 2^{16j}·s²·[limb i] is small
        let (i, j) = (1, 1);
        let (b, a) = keys.relin_key().key(i, j);
        let mut e = b.clone();
        e.add_hadamard_assign(a, s, moduli);
        let q = moduli[i].value;
        let g = mod_pow(2, 16, q);
        for (c, &t) in e.limbs[i].iter_mut().zip(&s2.limbs[i]) {
            *c = crate::rns::mod_sub(*c, mod_mul(g, t, q), q);
        }
        ctx.from_ntt(&mut e);
        for (limb, m) in e.limbs.iter().zip(moduli) {
            assert!(limb.iter().all(|&c| center(c, m.value).abs() <= 20));
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let ctx = ctx();
        let keys = KeyMaterial::generate_with_rng(&ctx, &mut ChaCha20Rng::seed_from_u64(5));
        assert_eq!(format!("{:?}", keys.secret_key()), "SecretKey(<redacted>)");
    }
}
