//! Byte-level ciphertext codec.
//!
//! Layout (little-endian):
//!
//! | field     | size                  |
//! |-----------|-----------------------|
//! | magic     | 4 (`b"CKKS"`)         |
//! | version   | 1                     |
//! | params id | 8                     |
//! | level     | 4 (u32)               |
//! | scale     | 8 (f64)               |
//! | c0        | (level + 1) × N × 8   |
//! | c1        | (level + 1) × N × 8   |
//!
//! Each RnsPoly is written limb by limb as flat u64 arrays. Decoding is
//! strict: every coefficient must be below its modulus and the byte count
//! must match the header exactly.

use crate::ciphertext::Ciphertext;
use crate::error::{CkksError, Result};
use crate::params::{Modulus, ParameterSet, ParamsId};
use crate::rns::RnsPoly;

pub const MAGIC: [u8; 4] = *b"CKKS";
pub const FORMAT_VERSION: u8 = 1;

/// Bytes before the first coefficient.
pub const HEADER_LEN: usize = 4 + 1 + 8 + 4 + 8;

/// Exact encoded size of a ciphertext at `level` for ring degree `n`.
pub fn serialized_len(n: usize, level: usize) -> usize {
    HEADER_LEN + 2 * (level + 1) * n * 8
}

/// Append an RnsPoly as L × N little-endian u64 values.
fn write_rns_poly(out: &mut Vec<u8>, poly: &RnsPoly) {
    for limb in &poly.limbs {
        for &coeff in limb {
            out.extend_from_slice(&coeff.to_le_bytes());
        }
    }
}

/// Serialize a ciphertext.
pub fn ciphertext_to_bytes(ct: &Ciphertext) -> Vec<u8> {
    let mut out = Vec::with_capacity(serialized_len(ct.c0.n, ct.level));
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&ct.params_id.0);
    out.extend_from_slice(&(ct.level as u32).to_le_bytes());
    out.extend_from_slice(&ct.scale.to_le_bytes());
    write_rns_poly(&mut out, &ct.c0);
    write_rns_poly(&mut out, &ct.c1);
    out
}

/// Deserialize a ciphertext produced under `params`.
///
/// Returns [`CkksError::ParameterMismatch`] when the header names another
/// parameter set and [`CkksError::Codec`] for any other malformation.
pub fn ciphertext_from_bytes(bytes: &[u8], params: &ParameterSet) -> Result<Ciphertext> {
    let mut reader = Reader::new(bytes);

    if reader.array::<4>()? != MAGIC {
        return Err(CkksError::Codec("bad magic".into()));
    }
    let version = reader.u8()?;
    if version != FORMAT_VERSION {
        return Err(CkksError::Codec(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }
    let params_id = ParamsId(reader.array::<8>()?);
    if params_id != params.id() {
        return Err(CkksError::ParameterMismatch {
            expected: params.id(),
            found: params_id,
        });
    }

    let level = reader.u32()? as usize;
    if level > params.max_level() {
        return Err(CkksError::Codec(format!(
            "level {level} above the top of the chain ({})",
            params.max_level()
        )));
    }
    let scale = f64::from_le_bytes(reader.array::<8>()?);
    if !scale.is_finite() || scale <= 0.0 {
        return Err(CkksError::Codec(format!("scale {scale} is not finite and positive")));
    }

    let n = params.ring_degree();
    let expected = serialized_len(n, level);
    if bytes.len() != expected {
        return Err(CkksError::Codec(format!(
            "expected {expected} bytes for a level-{level} ciphertext, got {}",
            bytes.len()
        )));
    }

    let moduli = params.moduli_at(level);
    let c0 = read_rns_poly(&mut reader, n, moduli)?;
    let c1 = read_rns_poly(&mut reader, n, moduli)?;

    Ok(Ciphertext {
        c0,
        c1,
        level,
        scale,
        params_id,
    })
}

/// Read an RnsPoly with coefficient range validation against `moduli`.
fn read_rns_poly(reader: &mut Reader<'_>, n: usize, moduli: &[Modulus]) -> Result<RnsPoly> {
    let mut poly = RnsPoly::zero(n, moduli.len());
    for (l, (limb, m)) in poly.limbs.iter_mut().zip(moduli).enumerate() {
        for (i, slot) in limb.iter_mut().enumerate() {
            let coeff = reader.u64()?;
            if coeff >= m.value {
                return Err(CkksError::Codec(format!(
                    "coefficient out of range at limb {l}, index {i}: {coeff} >= q={}",
                    m.value
                )));
            }
            *slot = coeff;
        }
    }
    Ok(poly)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| {
            CkksError::Codec(format!(
                "truncated input: need {end} bytes, have {}",
                self.buf.len()
            ))
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        self.array::<4>().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array::<8>().map(u64::from_le_bytes)
    }
}
