//! Cryptographic sampling for CKKS.
//!
//! - Secret key and encryption randomness: ternary distribution {-1, 0, 1}
//! - Error vectors: rounded Gaussian with σ = 3.19
//! - Random polynomials: uniform in Z_q
//!
//! Signed samplers return plain integers so the same small polynomial can be
//! lifted consistently into every RNS limb.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::params::Modulus;
use crate::rns::RnsPoly;

/// Standard deviation for RLWE error distribution.
pub const ERROR_STD_DEV: f64 = 3.19;

/// Samples are clamped to ±6σ.
const ERROR_TAIL_BOUND: f64 = 6.0 * ERROR_STD_DEV;

/// Sample a ternary polynomial: each coefficient ∈ {-1, 0, 1} with probability 1/3.
pub fn sample_ternary_signed<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<i64> {
    (0..n).map(|_| rng.gen_range(-1i64..=1)).collect()
}

/// Sample a rounded Gaussian error vector with standard deviation [`ERROR_STD_DEV`].
pub fn sample_gaussian_signed<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<i64> {
    (0..n)
        .map(|_| {
            let z: f64 = StandardNormal.sample(rng);
            (z * ERROR_STD_DEV)
                .clamp(-ERROR_TAIL_BOUND, ERROR_TAIL_BOUND)
                .round() as i64
        })
        .collect()
}

/// Sample a uniform random polynomial in Z_q^N.
pub fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, n: usize, q: u64) -> Vec<u64> {
    (0..n).map(|_| rng.gen_range(0..q)).collect()
}

/// Uniform RNS polynomial: an independent uniform vector per limb.
///
/// A uniform element of Z_Q maps to independent uniform residues, so the
/// result is valid in either coefficient or NTT representation.
pub fn sample_uniform_poly<R: Rng + ?Sized>(rng: &mut R, n: usize, moduli: &[Modulus]) -> RnsPoly {
    RnsPoly {
        limbs: moduli
            .iter()
            .map(|m| sample_uniform(rng, n, m.value))
            .collect(),
        n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_ternary_distribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let n = 10000;
        let samples = sample_ternary_signed(&mut rng, n);

        let neg_ones = samples.iter().filter(|&&x| x == -1).count();
        let zeros = samples.iter().filter(|&&x| x == 0).count();
        let ones = samples.iter().filter(|&&x| x == 1).count();

        // Each should be roughly n/3
        let expected = n / 3;
        let tolerance = (n as f64 * 0.05) as usize;
        for (name, count) in [("-1", neg_ones), ("0", zeros), ("1", ones)] {
            assert!(
                (count as isize - expected as isize).unsigned_abs() < tolerance,
                "{name}: count={count}, expected≈{expected}"
            );
        }
        assert_eq!(neg_ones + zeros + ones, n);
    }

    #[test]
    fn test_gaussian_distribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let n = 10000;
        let sigma = ERROR_STD_DEV;
        let samples = sample_gaussian_signed(&mut rng, n);

        let signed: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let mean: f64 = signed.iter().sum::<f64>() / n as f64;
        let variance: f64 = signed.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let measured_sigma = variance.sqrt();

        assert!(mean.abs() < 0.2, "Gaussian mean too far from 0: {mean}");
        assert!(
            (measured_sigma - sigma).abs() < 0.3,
            "Gaussian sigma off: measured={measured_sigma}, expected={sigma}"
        );
        assert!(samples.iter().all(|&s| (s as f64).abs() <= ERROR_TAIL_BOUND.ceil()));
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let q = 97u64;
        let samples = sample_uniform(&mut rng, 1000, q);
        for &s in &samples {
            assert!(s < q, "Uniform sample {s} >= q={q}");
        }
        // 1000 draws over 97 values should hit most of them
        let mut seen = [false; 97];
        samples.iter().for_each(|&s| seen[s as usize] = true);
        assert!(seen.iter().filter(|&&b| b).count() > 90);
    }

    #[test]
    fn test_uniform_poly_limbs_in_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let moduli = [Modulus::new(17, 5), Modulus::new(97, 7)];
        let poly = sample_uniform_poly(&mut rng, 64, &moduli);
        assert_eq!(poly.num_limbs(), 2);
        for (limb, m) in poly.limbs.iter().zip(&moduli) {
            assert_eq!(limb.len(), 64);
            assert!(limb.iter().all(|&c| c < m.value));
        }
    }
}
