//! CKKS ciphertext structure, context and public-key encryption.
//!
//! A CKKS ciphertext is a pair (c0, c1) of RNS polynomials in the NTT domain
//! such that c0 + c1·s ≈ m (mod Q_level). Level and scale are tracked on the
//! ciphertext itself and checked by every operation.

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, warn};

use crate::encoding::{CkksEncoder, Plaintext};
use crate::error::{CkksError, Result};
use crate::keys::{KeyMaterial, PublicKey};
use crate::ntt::{poly_from_ntt, poly_to_ntt, NttTables};
use crate::params::{ParameterSet, ParamsId};
use crate::rns::RnsPoly;
use crate::sampling::{sample_gaussian_signed, sample_ternary_signed};

/// A CKKS ciphertext: pair of RNS polynomials (c0, c1) in NTT domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
    /// First component c0 (in NTT domain), level + 1 limbs.
    pub c0: RnsPoly,
    /// Second component c1 (in NTT domain), level + 1 limbs.
    pub c1: RnsPoly,
    /// Index of the top active modulus.
    pub level: usize,
    /// Current scale factor.
    pub scale: f64,
    /// Parameter set this ciphertext was produced under.
    pub params_id: ParamsId,
}

impl Ciphertext {
    pub fn num_limbs(&self) -> usize {
        self.level + 1
    }

    /// Check that the shape of this ciphertext is consistent with `params`.
    pub(crate) fn validate(&self, params: &ParameterSet) -> std::result::Result<(), String> {
        if self.level > params.max_level() {
            return Err(format!(
                "level {} above the top of the chain ({})",
                self.level,
                params.max_level()
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("scale {} is not finite and positive", self.scale));
        }
        let n = params.ring_degree();
        for (name, poly) in [("c0", &self.c0), ("c1", &self.c1)] {
            if poly.num_limbs() != self.num_limbs()
                || poly.n != n
                || poly.limbs.iter().any(|limb| limb.len() != n)
            {
                return Err(format!(
                    "{name} has {} limbs of degree {}, expected {} of degree {n}",
                    poly.num_limbs(),
                    poly.n,
                    self.num_limbs()
                ));
            }
        }
        Ok(())
    }
}

/// Parameter set plus the pre-computed tables every operation needs.
///
/// Immutable after construction; share it by reference across threads.
#[derive(Debug, Clone)]
pub struct CkksContext {
    params: ParameterSet,
    /// NTT tables, one per modulus of the full chain.
    ntt_tables: Vec<NttTables>,
    encoder: CkksEncoder,
}

impl CkksContext {
    /// Create a new CKKS context with pre-computed NTT and CRT tables.
    pub fn new(params: ParameterSet) -> Self {
        let ntt_tables = NttTables::for_chain(params.ring_degree(), params.moduli());
        let encoder = CkksEncoder::new(&params);
        Self {
            params,
            ntt_tables,
            encoder,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn encoder(&self) -> &CkksEncoder {
        &self.encoder
    }

    pub fn ntt_tables(&self) -> &[NttTables] {
        &self.ntt_tables
    }

    /// Forward NTT on as many limbs as `poly` has.
    pub(crate) fn to_ntt(&self, poly: &mut RnsPoly) {
        poly_to_ntt(poly, &self.ntt_tables);
    }

    /// Inverse NTT on as many limbs as `poly` has.
    pub(crate) fn from_ntt(&self, poly: &mut RnsPoly) {
        poly_from_ntt(poly, &self.ntt_tables);
    }

    /// Lift a small signed polynomial onto `num_limbs` limbs in NTT form.
    pub(crate) fn small_to_ntt(&self, coeffs: &[i64], num_limbs: usize) -> RnsPoly {
        let mut poly = RnsPoly::from_signed(coeffs, &self.params.moduli()[..num_limbs]);
        self.to_ntt(&mut poly);
        poly
    }

    /// Encode a scalar at the base scale and top level.
    pub fn encode_scalar(&self, value: f64) -> Result<Plaintext> {
        self.encoder
            .encode_scalar(value, self.params.scale(), self.params.max_level())
    }

    /// Encrypt with fresh OS-seeded randomness.
    pub fn encrypt(&self, pt: &Plaintext, pk: &PublicKey) -> Result<Ciphertext> {
        self.encrypt_with_rng(pt, pk, &mut ChaCha20Rng::from_entropy())
    }

    /// Public-key RLWE encryption at the plaintext's level:
    ///
    ///   u ← ternary, e0, e1 ← Gaussian(σ)
    ///   c0 = b·u + e0 + m
    ///   c1 = a·u + e1
    ///
    /// so c0 + c1·s = m + e·u + e0 + e1·s.
    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        pk: &PublicKey,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if pt.level > self.params.max_level() || pt.poly.num_limbs() != pt.level + 1 {
            return Err(CkksError::InvalidInput(format!(
                "plaintext at level {} with {} limbs does not fit this parameter set",
                pt.level,
                pt.poly.num_limbs()
            )));
        }
        if pk.params_id != self.params.id() {
            return Err(CkksError::ParameterMismatch {
                expected: self.params.id(),
                found: pk.params_id,
            });
        }

        let n = self.params.ring_degree();
        let num_limbs = pt.level + 1;
        let moduli = &self.params.moduli()[..num_limbs];

        let u = self.small_to_ntt(&sample_ternary_signed(rng, n), num_limbs);
        let e0 = self.small_to_ntt(&sample_gaussian_signed(rng, n), num_limbs);
        let e1 = self.small_to_ntt(&sample_gaussian_signed(rng, n), num_limbs);

        let mut m = pt.poly.clone();
        self.to_ntt(&mut m);

        let mut c0 = e0.add(&m, moduli);
        c0.add_hadamard_assign(&pk.b.prefix(num_limbs), &u, moduli);
        let mut c1 = e1;
        c1.add_hadamard_assign(&pk.a.prefix(num_limbs), &u, moduli);

        debug!(level = pt.level, scale = pt.scale, "encrypted plaintext");
        Ok(Ciphertext {
            c0,
            c1,
            level: pt.level,
            scale: pt.scale,
            params_id: self.params.id(),
        })
    }

    /// Decrypt: m = c0 + c1·s (NTT domain), then iNTT.
    ///
    /// Fails with [`CkksError::Decryption`] when the ciphertext was produced
    /// under another parameter set or is structurally malformed.
    pub fn decrypt(&self, ct: &Ciphertext, keys: &KeyMaterial) -> Result<Plaintext> {
        if ct.params_id != self.params.id() || keys.params_id() != self.params.id() {
            warn!(
                ciphertext = %ct.params_id,
                key = %keys.params_id(),
                context = %self.params.id(),
                "decryption rejected: parameter set mismatch"
            );
            return Err(CkksError::Decryption(format!(
                "ciphertext parameter set {} does not match key parameter set {}",
                ct.params_id,
                keys.params_id()
            )));
        }
        ct.validate(&self.params).map_err(CkksError::Decryption)?;

        let moduli = self.params.moduli_at(ct.level);
        let s = keys.secret_key().poly.prefix(ct.num_limbs());
        let mut m = ct.c0.clone();
        m.add_hadamard_assign(&ct.c1, &s, moduli);
        self.from_ntt(&mut m);

        Ok(Plaintext {
            poly: m,
            scale: ct.scale,
            level: ct.level,
        })
    }

    /// Decrypt and decode slot 0.
    pub fn decrypt_scalar(&self, ct: &Ciphertext, keys: &KeyMaterial) -> Result<f64> {
        let pt = self.decrypt(ct, keys)?;
        self.encoder
            .decode_scalar(&pt)
            .map_err(|e| CkksError::Decryption(e.to_string()))
    }
}
