//! CKKS parameter sets.
//!
//! A [`ParameterSet`] fixes the ring degree N, the RNS modulus chain
//! [q_0, q_1, ..., q_L] (NTT-friendly primes: q_i ≡ 1 mod 2N), the scale
//! Δ = 2^scale_bits and the claimed security level. It is validated once at
//! construction and immutable afterwards.
//!
//! Every prime in the chain is a data prime: a fresh ciphertext lives at
//! level L and each rescale drops the top prime, so the multiplicative depth
//! is `chain length - 1`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{CkksError, Result};
use crate::rns::mod_pow;

/// Ring degrees with a published security bound.
pub const SUPPORTED_DEGREES: [usize; 6] = [1024, 2048, 4096, 8192, 16384, 32768];

/// Smallest prime bit width accepted in a modulus chain.
pub const MIN_MODULUS_BITS: u32 = 20;

/// Largest prime bit width accepted in a modulus chain (keeps sums below 2^61).
pub const MAX_MODULUS_BITS: u32 = 60;

/// A single RNS modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulus {
    /// The prime modulus q_i.
    pub value: u64,
    /// Bit width of this modulus.
    pub bits: u32,
}

impl Modulus {
    pub const fn new(value: u64, bits: u32) -> Self {
        Self { value, bits }
    }
}

/// Claimed security level, following the HomomorphicEncryption.org standard
/// bounds on the total coefficient modulus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// No bound is enforced. Only for tests and experiments.
    None,
    /// 128-bit classical security.
    #[default]
    Tc128,
    /// 192-bit classical security.
    Tc192,
    /// 256-bit classical security.
    Tc256,
}

impl SecurityLevel {
    /// Maximum total bit count of the modulus chain for ring degree `n`.
    ///
    /// Returns `None` for [`SecurityLevel::None`] (unbounded) and `Some(0)`
    /// for unsupported degrees.
    pub fn max_modulus_bits(self, n: usize) -> Option<u32> {
        let table: [u32; 6] = match self {
            SecurityLevel::None => return None,
            SecurityLevel::Tc128 => [27, 54, 109, 218, 438, 881],
            SecurityLevel::Tc192 => [19, 37, 75, 152, 305, 611],
            SecurityLevel::Tc256 => [14, 29, 58, 118, 237, 476],
        };
        let bound = SUPPORTED_DEGREES
            .iter()
            .position(|&d| d == n)
            .map(|idx| table[idx])
            .unwrap_or(0);
        Some(bound)
    }

    pub fn name(self) -> &'static str {
        match self {
            SecurityLevel::None => "none",
            SecurityLevel::Tc128 => "tc128",
            SecurityLevel::Tc192 => "tc192",
            SecurityLevel::Tc256 => "tc256",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fingerprint of the algebraic structure of a parameter set (ring degree
/// and modulus chain). Two parameter sets with equal ids produce mutually
/// compatible ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamsId(pub [u8; 8]);

impl fmt::Display for ParamsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Complete, validated CKKS parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    ring_degree: usize,
    num_slots: usize,
    log_n: u32,
    moduli: Vec<Modulus>,
    scale_bits: u32,
    security_level: SecurityLevel,
    id: ParamsId,
}

impl ParameterSet {
    /// Build and validate a parameter set.
    ///
    /// Fails with [`CkksError::InvalidParameters`] when the ring degree is not
    /// supported, a modulus bit size is out of range, the chain exceeds the
    /// security bound, the scale does not fit under q_0, a rescale prime
    /// (q_1 onwards) differs in width from the scale, or no NTT-friendly prime
    /// of a requested width exists.
    pub fn new(
        ring_degree: usize,
        modulus_bits: &[u32],
        scale_bits: u32,
        security_level: SecurityLevel,
    ) -> Result<Self> {
        if !ring_degree.is_power_of_two() || !SUPPORTED_DEGREES.contains(&ring_degree) {
            return Err(CkksError::InvalidParameters(format!(
                "ring degree {ring_degree} is not one of {SUPPORTED_DEGREES:?}"
            )));
        }
        if modulus_bits.is_empty() {
            return Err(CkksError::InvalidParameters(
                "modulus chain must contain at least one prime".into(),
            ));
        }
        if let Some(&bits) = modulus_bits
            .iter()
            .find(|&&b| !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&b))
        {
            return Err(CkksError::InvalidParameters(format!(
                "modulus bit size {bits} outside [{MIN_MODULUS_BITS}, {MAX_MODULUS_BITS}]"
            )));
        }

        let total_bits: u32 = modulus_bits.iter().sum();
        if let Some(max_bits) = security_level.max_modulus_bits(ring_degree) {
            if total_bits > max_bits {
                return Err(CkksError::InvalidParameters(format!(
                    "modulus chain of {total_bits} bits exceeds the {security_level} bound of \
                     {max_bits} bits for N={ring_degree}"
                )));
            }
        }

        if scale_bits == 0 || scale_bits > MAX_MODULUS_BITS || scale_bits >= modulus_bits[0] {
            return Err(CkksError::InvalidParameters(format!(
                "scale bits {scale_bits} must be positive and smaller than the first modulus \
                 ({} bits)",
                modulus_bits[0]
            )));
        }

        // Each rescale divides by one of these primes; Δ²/q only returns to Δ when q ≈ Δ
        if let Some(&bits) = modulus_bits[1..].iter().find(|&&b| b != scale_bits) {
            return Err(CkksError::InvalidParameters(format!(
                "rescale prime of {bits} bits does not match the scale (2^{scale_bits}); \
                 every modulus after the first must be {scale_bits} bits"
            )));
        }

        let two_n = (2 * ring_degree) as u64;
        let mut moduli: Vec<Modulus> = Vec::with_capacity(modulus_bits.len());
        for &bits in modulus_bits {
            let used: Vec<u64> = moduli.iter().map(|m| m.value).collect();
            let q = find_ntt_friendly_prime(bits, two_n, &used).ok_or_else(|| {
                CkksError::InvalidParameters(format!(
                    "no {bits}-bit prime q ≡ 1 (mod {two_n}) left for the modulus chain"
                ))
            })?;
            moduli.push(Modulus::new(q, bits));
        }

        let id = fingerprint(ring_degree, &moduli);
        let params = Self {
            ring_degree,
            num_slots: ring_degree / 2,
            log_n: ring_degree.trailing_zeros(),
            moduli,
            scale_bits,
            security_level,
            id,
        };

        info!(
            ring_degree,
            chain_bits = ?modulus_bits,
            primes = ?params.moduli.iter().map(|m| m.value).collect::<Vec<_>>(),
            scale_bits,
            security = %security_level,
            params_id = %id,
            "CKKS parameters ready"
        );
        Ok(params)
    }

    /// Default parameter set: N=4096, chain [49, 30, 30], Δ=2^30, tc128.
    ///
    /// 109 total bits is the tc128 bound for N=4096; depth 2.
    pub fn n4096() -> Result<Self> {
        Self::new(4096, &[49, 30, 30], 30, SecurityLevel::Tc128)
    }

    /// Small parameter set: N=2048, chain [34, 20], Δ=2^20, tc128. Depth 1.
    pub fn n2048() -> Result<Self> {
        Self::new(2048, &[34, 20], 20, SecurityLevel::Tc128)
    }

    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    /// Number of SIMD slots = N/2.
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn log_n(&self) -> u32 {
        self.log_n
    }

    /// Full modulus chain [q_0, ..., q_L].
    pub fn moduli(&self) -> &[Modulus] {
        &self.moduli
    }

    /// Moduli active at `level`: [q_0, ..., q_level].
    pub fn moduli_at(&self, level: usize) -> &[Modulus] {
        &self.moduli[..=level]
    }

    /// Level of a fresh ciphertext (number of rescales available).
    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    pub fn scale_bits(&self) -> u32 {
        self.scale_bits
    }

    /// Base scale Δ = 2^scale_bits.
    pub fn scale(&self) -> f64 {
        2f64.powi(self.scale_bits as i32)
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    pub fn total_modulus_bits(&self) -> u32 {
        self.moduli.iter().map(|m| m.bits).sum()
    }

    pub fn id(&self) -> ParamsId {
        self.id
    }
}

fn fingerprint(ring_degree: usize, moduli: &[Modulus]) -> ParamsId {
    let mut hasher = Sha256::new();
    hasher.update(b"ckks-arith/params/v1");
    hasher.update((ring_degree as u64).to_le_bytes());
    hasher.update((moduli.len() as u64).to_le_bytes());
    for m in moduli {
        hasher.update(m.value.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut id = [0u8; 8];
    id.copy_from_slice(&digest[..8]);
    ParamsId(id)
}

/// Find a prime q with `bits` bit-width such that q ≡ 1 (mod two_n),
/// skipping any prime already in `used`.
///
/// Searches downward from the largest `bits`-bit number.
fn find_ntt_friendly_prime(bits: u32, two_n: u64, used: &[u64]) -> Option<u64> {
    let upper = (1u64 << bits) - 1;
    let lower = 1u64 << (bits - 1);

    // Largest candidate ≡ 1 mod two_n not above upper
    let mut candidate = upper - (upper % two_n) + 1;
    if candidate > upper {
        candidate = candidate.checked_sub(two_n)?;
    }

    while candidate >= lower {
        if !used.contains(&candidate) && is_prime_u64(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_sub(two_n)?;
    }
    None
}

/// Deterministic Miller-Rabin, exact for every u64.
pub(crate) fn is_prime_u64(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = ((x as u128 * x as u128) % n as u128) as u64;
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_n4096() {
        let p = ParameterSet::n4096().unwrap();
        assert_eq!(p.ring_degree(), 4096);
        assert_eq!(p.num_slots(), 2048);
        assert_eq!(p.log_n(), 12);
        assert_eq!(p.moduli().len(), 3);
        assert_eq!(p.max_level(), 2);
        assert_eq!(p.scale_bits(), 30);
        assert_eq!(p.total_modulus_bits(), 109);
    }

    #[test]
    fn test_modulus_ntt_friendly_and_prime() {
        for (n, bits, scale) in [(1024, vec![40u32, 25, 25], 25), (4096, vec![49, 30, 30], 30)] {
            let p = ParameterSet::new(n, &bits, scale, SecurityLevel::None).unwrap();
            let two_n = (2 * n) as u64;
            for (i, m) in p.moduli().iter().enumerate() {
                assert_eq!(m.value % two_n, 1, "modulus {i} ({}) not NTT-friendly", m.value);
                assert!(is_prime_u64(m.value), "modulus {i} ({}) not prime", m.value);
                assert_eq!(64 - m.value.leading_zeros(), m.bits);
            }
        }
    }

    #[test]
    fn test_equal_widths_get_distinct_primes() {
        let p = ParameterSet::new(4096, &[49, 30, 30], 30, SecurityLevel::Tc128).unwrap();
        assert_ne!(p.moduli()[1].value, p.moduli()[2].value);
    }

    #[test]
    fn test_rejects_unsupported_degree() {
        for n in [0, 1000, 512, 65536] {
            let err = ParameterSet::new(n, &[30, 20], 20, SecurityLevel::None).unwrap_err();
            assert!(matches!(err, CkksError::InvalidParameters(_)));
        }
    }

    #[test]
    fn test_rejects_chain_above_security_bound() {
        // 110 bits > 109 allowed for tc128 at N=4096
        let err = ParameterSet::new(4096, &[50, 30, 30], 30, SecurityLevel::Tc128).unwrap_err();
        assert!(matches!(err, CkksError::InvalidParameters(_)));
        // The same chain is fine when no bound is requested
        assert!(ParameterSet::new(4096, &[50, 30, 30], 30, SecurityLevel::None).is_ok());
    }

    #[test]
    fn test_rejects_bad_bit_sizes_and_scale() {
        assert!(ParameterSet::new(2048, &[], 20, SecurityLevel::None).is_err());
        assert!(ParameterSet::new(2048, &[61, 20], 20, SecurityLevel::None).is_err());
        assert!(ParameterSet::new(2048, &[30, 10], 20, SecurityLevel::None).is_err());
        assert!(ParameterSet::new(2048, &[30, 20], 0, SecurityLevel::None).is_err());
        assert!(ParameterSet::new(2048, &[30, 20], 30, SecurityLevel::None).is_err());
    }

    #[test]
    fn test_rejects_rescale_primes_off_scale() {
        // Δ²/q would collapse to ~1 after one multiply
        let err = ParameterSet::new(4096, &[60, 40], 20, SecurityLevel::None).unwrap_err();
        assert!(matches!(err, CkksError::InvalidParameters(_)));
        for chain in [[45u32, 24, 25], [45, 25, 26]] {
            assert!(ParameterSet::new(1024, &chain, 25, SecurityLevel::None).is_err());
        }
        // The first prime only bounds the final precision
        assert!(ParameterSet::new(4096, &[60, 20], 20, SecurityLevel::None).is_ok());
        assert!(ParameterSet::new(4096, &[60], 20, SecurityLevel::None).is_ok());
    }

    #[test]
    fn test_id_tracks_structure_only() {
        let a = ParameterSet::new(2048, &[34, 20], 20, SecurityLevel::Tc128).unwrap();
        let b = ParameterSet::new(2048, &[34, 20], 20, SecurityLevel::None).unwrap();
        let c = ParameterSet::new(2048, &[34, 21], 21, SecurityLevel::None).unwrap();
        let d = ParameterSet::new(4096, &[34, 20], 20, SecurityLevel::None).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_ne!(a.id(), d.id());
        assert_eq!(a.id().to_string().len(), 16);

        // Scale is not part of the id
        let e = ParameterSet::new(2048, &[34], 20, SecurityLevel::None).unwrap();
        let f = ParameterSet::new(2048, &[34], 18, SecurityLevel::None).unwrap();
        assert_eq!(e.id(), f.id());
    }

    #[test]
    fn test_security_level_names() {
        assert_eq!(SecurityLevel::default(), SecurityLevel::Tc128);
        assert_eq!(SecurityLevel::None.to_string(), "none");
        assert_eq!(SecurityLevel::Tc256.max_modulus_bits(8192), Some(118));
        assert_eq!(SecurityLevel::Tc128.max_modulus_bits(512), Some(0));
        assert_eq!(SecurityLevel::None.max_modulus_bits(4096), None);
    }

    #[test]
    fn test_miller_rabin() {
        assert!(is_prime_u64(2));
        assert!(is_prime_u64(97));
        assert!(is_prime_u64(2305843009213693951)); // 2^61 - 1
        assert!(is_prime_u64(18446744073709551557)); // largest u64 prime
        assert!(!is_prime_u64(1));
        assert!(!is_prime_u64(561)); // Carmichael
        assert!(!is_prime_u64(4294967297)); // 641 * 6700417
    }
}
