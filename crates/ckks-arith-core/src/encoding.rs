//! CKKS encode/decode via the canonical embedding.
//!
//! Encode: z ∈ R^{N/2} → m(X) = round(Δ · σ^{-1}(z)) ∈ R_Q
//! Decode: m(X) ∈ R_Q → z = σ(m) / Δ ∈ R^{N/2}
//!
//! σ evaluates m(X) at the primitive 2N-th roots of unity ζ^{2k+1}. Real
//! inputs are extended conjugate-symmetrically, so the coefficients are real
//! and only the first N/2 evaluations carry information.
//!
//! Scalars are placed in slot 0 with every other slot zero.

use std::f64::consts::PI;

use num_traits::ToPrimitive;

use crate::error::{CkksError, Result};
use crate::params::{Modulus, ParameterSet};
use crate::rns::{CrtBasis, RnsPoly};

/// Largest magnitude an encoded coefficient may reach before rounding.
const MAX_COEFF_MAGNITUDE: f64 = (1u64 << 62) as f64;

/// An encoded plaintext: integer coefficients (coefficient form, RNS) plus
/// the scale and level they were encoded for.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    pub poly: RnsPoly,
    pub scale: f64,
    pub level: usize,
}

/// Pre-computed tables for the O(N log N) twisted FFT.
///
///   m(ζ^{2k+1}) = Σ_j (m[j]·ζ^j) · e^{2πi·kj/N}
///
/// so the embedding is a length-N DFT of the twisted coefficients.
#[derive(Debug, Clone)]
struct FftTables {
    n: usize,
    /// ζ^j = cos(πj/N) + i·sin(πj/N)
    twist_re: Vec<f64>,
    twist_im: Vec<f64>,
    bit_rev: Vec<usize>,
    /// Per stage s: e^{-2πik/2^{s+1}} for k < 2^s.
    stage_re: Vec<Vec<f64>>,
    stage_im: Vec<Vec<f64>>,
}

impl FftTables {
    fn new(n: usize) -> Self {
        let log_n = n.trailing_zeros();

        let (twist_re, twist_im): (Vec<f64>, Vec<f64>) = (0..n)
            .map(|j| {
                let angle = PI * j as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();

        let bit_rev = (0..n)
            .map(|i| crate::rns::bit_reverse(i as u32, log_n) as usize)
            .collect();

        let (stage_re, stage_im): (Vec<Vec<f64>>, Vec<Vec<f64>>) = (0..log_n)
            .map(|s| -> (Vec<f64>, Vec<f64>) {
                let half = 1usize << s;
                (0..half)
                    .map(|k| {
                        let angle = -PI * k as f64 / half as f64;
                        (angle.cos(), angle.sin())
                    })
                    .unzip()
            })
            .unzip();

        Self {
            n,
            twist_re,
            twist_im,
            bit_rev,
            stage_re,
            stage_im,
        }
    }

    /// In-place forward DFT (radix-2 decimation in time), X[k] = Σ x[j]·e^{-2πi·kj/N}.
    fn fft(&self, re: &mut [f64], im: &mut [f64]) {
        debug_assert_eq!(re.len(), self.n);
        debug_assert_eq!(im.len(), self.n);

        for (i, &j) in self.bit_rev.iter().enumerate() {
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        for (w_re, w_im) in self.stage_re.iter().zip(&self.stage_im) {
            let half = w_re.len();
            for start in (0..self.n).step_by(2 * half) {
                for k in 0..half {
                    let (i0, i1) = (start + k, start + k + half);
                    let v_re = w_re[k] * re[i1] - w_im[k] * im[i1];
                    let v_im = w_re[k] * im[i1] + w_im[k] * re[i1];
                    let (u_re, u_im) = (re[i0], im[i0]);
                    re[i0] = u_re + v_re;
                    im[i0] = u_im + v_im;
                    re[i1] = u_re - v_re;
                    im[i1] = u_im - v_im;
                }
            }
        }
    }
}

/// CKKS encoder/decoder for a given parameter set.
#[derive(Debug, Clone)]
pub struct CkksEncoder {
    n: usize,
    num_slots: usize,
    moduli: Vec<Modulus>,
    fft: FftTables,
    /// CRT reconstruction data, indexed by level.
    crt: Vec<CrtBasis>,
    /// Q_level / 2 as a float, indexed by level.
    half_modulus: Vec<f64>,
}

impl CkksEncoder {
    pub fn new(params: &ParameterSet) -> Self {
        let n = params.ring_degree();
        let levels = 0..=params.max_level();
        let crt = levels
            .clone()
            .map(|l| CrtBasis::new(params.moduli_at(l)))
            .collect();
        let half_modulus = levels
            .map(|l| {
                params
                    .moduli_at(l)
                    .iter()
                    .map(|m| m.value as f64)
                    .product::<f64>()
                    / 2.0
            })
            .collect();

        Self {
            n,
            num_slots: params.num_slots(),
            moduli: params.moduli().to_vec(),
            fft: FftTables::new(n),
            crt,
            half_modulus,
        }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Encode a real slot vector at `scale` for ciphertexts at `level`.
    ///
    /// Shorter vectors are zero-padded. Fails with [`CkksError::InvalidInput`]
    /// for too many values, non-finite values or scale, an unknown level, or
    /// a scaled magnitude that would not fit the modulus at `level`.
    pub fn encode(&self, z: &[f64], scale: f64, level: usize) -> Result<Plaintext> {
        if z.len() > self.num_slots {
            return Err(CkksError::InvalidInput(format!(
                "input length {} exceeds slot count {}",
                z.len(),
                self.num_slots
            )));
        }
        if let Some(bad) = z.iter().find(|v| !v.is_finite()) {
            return Err(CkksError::InvalidInput(format!("value {bad} is not finite")));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CkksError::InvalidInput(format!(
                "scale {scale} must be finite and positive"
            )));
        }
        let half_q = *self.half_modulus.get(level).ok_or_else(|| {
            CkksError::InvalidInput(format!(
                "level {level} above the top of the chain ({})",
                self.crt.len() - 1
            ))
        })?;

        // Every coefficient of σ^{-1}(z) is bounded by max|z|.
        let max_abs = z.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let limit = half_q.min(MAX_COEFF_MAGNITUDE);
        if max_abs * scale >= limit {
            return Err(CkksError::InvalidInput(format!(
                "|{max_abs}| · {scale} does not fit below {limit:e} at level {level}"
            )));
        }

        let mut z_full = vec![0.0f64; self.num_slots];
        z_full[..z.len()].copy_from_slice(z);
        let coeffs: Vec<i64> = self
            .inverse_canonical_embedding(&z_full)
            .into_iter()
            .map(|c| (c * scale).round() as i64)
            .collect();

        Ok(Plaintext {
            poly: RnsPoly::from_signed(&coeffs, &self.moduli[..=level]),
            scale,
            level,
        })
    }

    /// Encode a single scalar into slot 0.
    pub fn encode_scalar(&self, value: f64, scale: f64, level: usize) -> Result<Plaintext> {
        self.encode(&[value], scale, level)
    }

    /// Decode all N/2 slots of a plaintext.
    ///
    /// Coefficients are reconstructed over every active limb, so values
    /// larger than any single prime decode correctly.
    pub fn decode(&self, pt: &Plaintext) -> Result<Vec<f64>> {
        let crt = self.crt.get(pt.level).ok_or_else(|| {
            CkksError::InvalidInput(format!("plaintext level {} is out of range", pt.level))
        })?;
        if pt.poly.num_limbs() != pt.level + 1 || pt.poly.n != self.n {
            return Err(CkksError::InvalidInput(format!(
                "plaintext has {} limbs of degree {}, expected {} of degree {}",
                pt.poly.num_limbs(),
                pt.poly.n,
                pt.level + 1,
                self.n
            )));
        }

        let mut residues = vec![0u64; pt.poly.num_limbs()];
        let coeffs = (0..self.n)
            .map(|i| {
                for (r, limb) in residues.iter_mut().zip(&pt.poly.limbs) {
                    *r = limb[i];
                }
                crt.reconstruct_centered(&residues)
                    .to_f64()
                    .map(|c| c / pt.scale)
                    .ok_or_else(|| CkksError::InvalidInput("coefficient overflows f64".into()))
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(self.canonical_embedding(&coeffs))
    }

    /// Decode slot 0.
    pub fn decode_scalar(&self, pt: &Plaintext) -> Result<f64> {
        Ok(self.decode(pt)?[0])
    }

    /// σ^{-1}: slot values → real polynomial coefficients.
    ///
    /// m[j] = Re(ζ^{-j} · DFT(z̃)[j]) / N, with z̃[N-1-k] = z̃[k] = z[k].
    fn inverse_canonical_embedding(&self, z: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut re = vec![0.0f64; n];
        let mut im = vec![0.0f64; n];
        for (k, &v) in z.iter().enumerate() {
            re[k] = v;
            re[n - 1 - k] = v;
        }

        self.fft.fft(&mut re, &mut im);

        let inv_n = 1.0 / n as f64;
        (0..n)
            .map(|j| (re[j] * self.fft.twist_re[j] + im[j] * self.fft.twist_im[j]) * inv_n)
            .collect()
    }

    /// σ: real polynomial coefficients → real parts of the first N/2 slots.
    ///
    /// z[k] = Re(m(ζ^{2k+1})) = Re(DFT(conj(m ⊙ ζ^j))[k]).
    fn canonical_embedding(&self, coeffs: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut re: Vec<f64> = (0..n).map(|j| coeffs[j] * self.fft.twist_re[j]).collect();
        let mut im: Vec<f64> = (0..n).map(|j| -coeffs[j] * self.fft.twist_im[j]).collect();

        self.fft.fft(&mut re, &mut im);

        re.truncate(self.num_slots);
        re
    }
}
