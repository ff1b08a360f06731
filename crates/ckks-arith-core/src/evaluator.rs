//! Homomorphic evaluation: add, sub and the multiply pipeline.
//!
//! multiply = raw_multiply → relinearize → rescale
//!
//! - raw_multiply: (a0, a1) ⊗ (b0, b1) = (a0·b0, a0·b1 + a1·b0, a1·b1),
//!   scale = scale_a · scale_b
//! - relinearize: folds d2 (which decrypts against s²) back into (c0, c1)
//!   using the gadget keys
//! - rescale: divides by the top prime, level - 1, scale / q_top
//!
//! Every entry point checks parameter set, level and scale explicitly.

use tracing::{debug, warn};

use crate::ciphertext::{Ciphertext, CkksContext};
use crate::error::{CkksError, Result};
use crate::keys::RelinearizationKey;
use crate::ntt::{negacyclic_ntt_forward, negacyclic_ntt_inverse};
use crate::params::ParamsId;
use crate::rns::{center, mod_inv, mod_mul, mod_sub, reduce_signed, RnsPoly};

/// Largest distance, in bits, between a rescaled scale and 2^scale_bits.
const MAX_SCALE_DRIFT_BITS: f64 = 1.0;

/// Result of a raw ciphertext product: three components that decrypt as
/// d0 + d1·s + d2·s².
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedCiphertext {
    pub d0: RnsPoly,
    pub d1: RnsPoly,
    pub d2: RnsPoly,
    pub level: usize,
    pub scale: f64,
    pub params_id: ParamsId,
}

impl CkksContext {
    /// Homomorphic addition. Operands must share parameter set, level and scale.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_operands("add", a, b)?;
        let moduli = self.params().moduli_at(a.level);
        debug!(level = a.level, scale = a.scale, "add");
        Ok(Ciphertext {
            c0: a.c0.add(&b.c0, moduli),
            c1: a.c1.add(&b.c1, moduli),
            level: a.level,
            scale: a.scale,
            params_id: a.params_id,
        })
    }

    /// Homomorphic subtraction a - b, with the same preconditions as [`add`](Self::add).
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_operands("sub", a, b)?;
        let moduli = self.params().moduli_at(a.level);
        debug!(level = a.level, scale = a.scale, "sub");
        Ok(Ciphertext {
            c0: a.c0.sub(&b.c0, moduli),
            c1: a.c1.sub(&b.c1, moduli),
            level: a.level,
            scale: a.scale,
            params_id: a.params_id,
        })
    }

    /// Full multiply: raw product, relinearization and one rescale.
    ///
    /// Fails with [`CkksError::ModulusChainExhausted`] at level 0, before any
    /// work is done.
    pub fn multiply(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
        rlk: &RelinearizationKey,
    ) -> Result<Ciphertext> {
        self.check_operands("multiply", a, b)?;
        if a.level == 0 {
            warn!(level = a.level, "multiply rejected: modulus chain exhausted");
            return Err(CkksError::ModulusChainExhausted { level: a.level });
        }
        let expanded = self.raw_multiply(a, b)?;
        let relinearized = self.relinearize(&expanded, rlk)?;
        self.rescale(&relinearized)
    }

    /// Tensor product of two ciphertexts (NTT domain, limb-wise).
    pub fn raw_multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Result<ExpandedCiphertext> {
        self.check_operands("raw_multiply", a, b)?;
        let moduli = self.params().moduli_at(a.level);

        let d0 = a.c0.hadamard_mul(&b.c0, moduli);
        let mut d1 = a.c0.hadamard_mul(&b.c1, moduli);
        d1.add_hadamard_assign(&a.c1, &b.c0, moduli);
        let d2 = a.c1.hadamard_mul(&b.c1, moduli);

        let scale = a.scale * b.scale;
        debug!(level = a.level, scale, "raw multiply");
        Ok(ExpandedCiphertext {
            d0,
            d1,
            d2,
            level: a.level,
            scale,
            params_id: a.params_id,
        })
    }

    /// Key-switch d2·s² into a two-component ciphertext.
    ///
    /// For every active prime q_i, the coefficient residues of d2 mod q_i are
    /// split into w-bit digits D_ij; then
    ///
    ///   c0 = d0 + Σ D_ij·b_ij,   c1 = d1 + Σ D_ij·a_ij
    ///
    /// which decrypts to d0 + d1·s + d2·s² + Σ D_ij·e_ij.
    pub fn relinearize(
        &self,
        ct: &ExpandedCiphertext,
        rlk: &RelinearizationKey,
    ) -> Result<Ciphertext> {
        let id = self.params().id();
        for found in [ct.params_id, rlk.params_id] {
            if found != id {
                warn!(expected = %id, %found, "relinearize rejected: parameter set mismatch");
                return Err(CkksError::ParameterMismatch { expected: id, found });
            }
        }
        let num_limbs = ct.level + 1;
        if ct.level > self.params().max_level()
            || [&ct.d0, &ct.d1, &ct.d2]
                .iter()
                .any(|p| p.num_limbs() != num_limbs)
        {
            return Err(CkksError::IncompatibleOperands(format!(
                "expanded ciphertext at level {} has mismatched limb counts",
                ct.level
            )));
        }

        let n = self.params().ring_degree();
        let moduli = self.params().moduli_at(ct.level);
        let digit_bits = rlk.digit_bits();
        let digit_mask = (1u64 << digit_bits) - 1;

        let mut d2 = ct.d2.clone();
        self.from_ntt(&mut d2);

        let mut c0 = ct.d0.clone();
        let mut c1 = ct.d1.clone();
        let mut digit = vec![0i64; n];
        for (i, residues) in d2.limbs.iter().enumerate() {
            for j in 0..rlk.num_digits(i) {
                let shift = digit_bits as usize * j;
                for (d, &r) in digit.iter_mut().zip(residues) {
                    *d = ((r >> shift) & digit_mask) as i64;
                }
                let lifted = self.small_to_ntt(&digit, num_limbs);
                let (b, a) = rlk.key(i, j);
                c0.add_hadamard_assign(&lifted, &b.prefix(num_limbs), moduli);
                c1.add_hadamard_assign(&lifted, &a.prefix(num_limbs), moduli);
            }
        }

        debug!(level = ct.level, scale = ct.scale, "relinearized");
        Ok(Ciphertext {
            c0,
            c1,
            level: ct.level,
            scale: ct.scale,
            params_id: ct.params_id,
        })
    }

    /// Divide by the top active prime with rounding and drop its limb.
    pub fn rescale(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_single("rescale", ct)?;
        if ct.level == 0 {
            warn!(level = ct.level, "rescale rejected: modulus chain exhausted");
            return Err(CkksError::ModulusChainExhausted { level: ct.level });
        }

        let top = ct.level;
        let moduli = self.params().moduli();
        let tables = self.ntt_tables();
        let q_top = moduli[top].value;

        // The result must land within one bit of the base scale
        let scale = ct.scale / q_top as f64;
        let drift = scale.log2() - self.params().scale_bits() as f64;
        if drift.abs() > MAX_SCALE_DRIFT_BITS {
            warn!(level = top, scale = ct.scale, result = scale, "rescale rejected: scale drift");
            return Err(CkksError::IncompatibleOperands(format!(
                "rescale: scale {} / q_{top} = {scale} is {drift:.2} bits from 2^{}",
                ct.scale,
                self.params().scale_bits()
            )));
        }

        let rescale_poly = |poly: &RnsPoly| -> RnsPoly {
            // Centered lift of the dropped limb, in coefficient form
            let mut top_limb = poly.limbs[top].clone();
            negacyclic_ntt_inverse(&mut top_limb, &tables[top]);
            let lifted: Vec<i64> = top_limb.iter().map(|&c| center(c, q_top)).collect();

            let limbs = (0..top)
                .map(|k| {
                    let q = moduli[k].value;
                    let q_top_inv = mod_inv(q_top % q, q);
                    let mut r: Vec<u64> = lifted.iter().map(|&x| reduce_signed(x, q)).collect();
                    negacyclic_ntt_forward(&mut r, &tables[k]);
                    poly.limbs[k]
                        .iter()
                        .zip(&r)
                        .map(|(&c, &r)| mod_mul(mod_sub(c, r, q), q_top_inv, q))
                        .collect()
                })
                .collect();
            RnsPoly { limbs, n: poly.n }
        };

        debug!(from_level = top, to_level = top - 1, scale, "rescaled");
        Ok(Ciphertext {
            c0: rescale_poly(&ct.c0),
            c1: rescale_poly(&ct.c1),
            level: top - 1,
            scale,
            params_id: ct.params_id,
        })
    }

    fn check_single(&self, op: &str, ct: &Ciphertext) -> Result<()> {
        let expected = self.params().id();
        if ct.params_id != expected {
            warn!(op, %expected, found = %ct.params_id, "operand rejected: parameter set mismatch");
            return Err(CkksError::ParameterMismatch {
                expected,
                found: ct.params_id,
            });
        }
        ct.validate(self.params()).map_err(|msg| {
            warn!(op, %msg, "operand rejected: malformed ciphertext");
            CkksError::IncompatibleOperands(msg)
        })
    }

    fn check_operands(&self, op: &str, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        self.check_single(op, a)?;
        self.check_single(op, b)?;
        if a.level != b.level {
            warn!(op, left = a.level, right = b.level, "operands rejected: level mismatch");
            return Err(CkksError::IncompatibleOperands(format!(
                "{op}: operand levels differ ({} vs {})",
                a.level, b.level
            )));
        }
        if a.scale != b.scale {
            warn!(op, left = a.scale, right = b.scale, "operands rejected: scale mismatch");
            return Err(CkksError::IncompatibleOperands(format!(
                "{op}: operand scales differ ({} vs {})",
                a.scale, b.scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyMaterial;
    use crate::params::{ParameterSet, SecurityLevel};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn setup() -> (CkksContext, KeyMaterial) {
        let params = ParameterSet::new(1024, &[45, 25, 25], 25, SecurityLevel::None).unwrap();
        let ctx = CkksContext::new(params);
        let keys = KeyMaterial::generate_with_rng(&ctx, &mut ChaCha20Rng::seed_from_u64(7));
        (ctx, keys)
    }

    fn enc(ctx: &CkksContext, keys: &KeyMaterial, v: f64) -> Ciphertext {
        ctx.encrypt(&ctx.encode_scalar(v).unwrap(), keys.public_key())
            .unwrap()
    }

    fn dec(ctx: &CkksContext, keys: &KeyMaterial, ct: &Ciphertext) -> f64 {
        ctx.decrypt_scalar(ct, keys).unwrap()
    }

    #[test]
    fn test_add_and_sub() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 7.0);
        let b = enc(&ctx, &keys, 3.0);

        let sum = ctx.add(&a, &b).unwrap();
        assert_eq!(sum.level, a.level);
        assert_eq!(sum.scale, a.scale);
        assert!((dec(&ctx, &keys, &sum) - 10.0).abs() < 1e-2);

        let diff = ctx.sub(&a, &b).unwrap();
        assert!((dec(&ctx, &keys, &diff) - 4.0).abs() < 1e-2);
    }

    #[test]
    fn test_raw_multiply_decrypts_with_s_squared() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 6.0);
        let b = enc(&ctx, &keys, -4.0);
        let expanded = ctx.raw_multiply(&a, &b).unwrap();
        assert_eq!(expanded.scale, a.scale * b.scale);

        // Relinearize without rescaling: still decryptable at scale Δ²
        let relin = ctx.relinearize(&expanded, keys.relin_key()).unwrap();
        assert_eq!(relin.level, a.level);
        let v = dec(&ctx, &keys, &relin);
        assert!((v + 24.0).abs() < 1e-2, "decrypted {v}");
    }

    #[test]
    fn test_multiply_pipeline() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 7.0);
        let b = enc(&ctx, &keys, 3.0);

        let prod = ctx.multiply(&a, &b, keys.relin_key()).unwrap();
        assert_eq!(prod.level, a.level - 1);
        assert_eq!(prod.c0.num_limbs(), a.level);
        // Scale returns close to Δ after dividing Δ² by a prime near Δ
        let ratio = prod.scale / ctx.params().scale();
        assert!((ratio - 1.0).abs() < 0.01, "scale ratio {ratio}");
        let v = dec(&ctx, &keys, &prod);
        assert!((v - 21.0).abs() < 1e-2, "decrypted {v}");
    }

    #[test]
    fn test_multiply_to_depth_then_exhausted() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 2.0);
        let b = enc(&ctx, &keys, 3.0);

        let ab = ctx.multiply(&a, &b, keys.relin_key()).unwrap();
        let abab = ctx.multiply(&ab, &ab, keys.relin_key()).unwrap();
        assert_eq!(abab.level, 0);
        let v = dec(&ctx, &keys, &abab);
        assert!((v - 36.0).abs() < 0.1, "decrypted {v}");

        let err = ctx.multiply(&abab, &abab, keys.relin_key()).unwrap_err();
        assert_eq!(err, CkksError::ModulusChainExhausted { level: 0 });
        assert!(matches!(
            ctx.rescale(&abab),
            Err(CkksError::ModulusChainExhausted { level: 0 })
        ));
    }

    #[test]
    fn test_level_and_scale_mismatch() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 2.0);
        let b = enc(&ctx, &keys, 3.0);
        let ab = ctx.multiply(&a, &b, keys.relin_key()).unwrap();

        assert!(matches!(ctx.add(&a, &ab), Err(CkksError::IncompatibleOperands(_))));
        assert!(matches!(
            ctx.multiply(&a, &ab, keys.relin_key()),
            Err(CkksError::IncompatibleOperands(_))
        ));

        let mut scaled = b.clone();
        scaled.scale *= 2.0;
        assert!(matches!(ctx.add(&a, &scaled), Err(CkksError::IncompatibleOperands(_))));
    }

    #[test]
    fn test_rescale_rejects_scale_drift() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 2.0);

        // A fresh ciphertext sits at Δ, so dividing by a ~Δ prime lands near 1
        assert!(matches!(ctx.rescale(&a), Err(CkksError::IncompatibleOperands(_))));

        let mut small = a.clone();
        small.scale = 32.0;
        assert!(matches!(
            ctx.multiply(&small, &small, keys.relin_key()),
            Err(CkksError::IncompatibleOperands(_))
        ));
    }

    #[test]
    fn test_foreign_parameter_set_rejected() {
        let (ctx, keys) = setup();
        let other = CkksContext::new(
            ParameterSet::new(1024, &[45, 25], 25, SecurityLevel::None).unwrap(),
        );
        let other_keys = KeyMaterial::generate_with_rng(&other, &mut ChaCha20Rng::seed_from_u64(8));
        let foreign = enc(&other, &other_keys, 1.0);
        let local = enc(&ctx, &keys, 1.0);

        assert!(matches!(
            ctx.add(&local, &foreign),
            Err(CkksError::ParameterMismatch { .. })
        ));
        assert!(matches!(
            ctx.multiply(&foreign, &local, keys.relin_key()),
            Err(CkksError::ParameterMismatch { .. })
        ));
        let expanded = ctx.raw_multiply(&local, &local).unwrap();
        assert!(matches!(
            ctx.relinearize(&expanded, other_keys.relin_key()),
            Err(CkksError::ParameterMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_operand_rejected() {
        let (ctx, keys) = setup();
        let a = enc(&ctx, &keys, 1.0);
        let mut b = enc(&ctx, &keys, 1.0);
        b.c0.truncate_limbs(1);
        assert!(matches!(ctx.add(&a, &b), Err(CkksError::IncompatibleOperands(_))));
    }
}
