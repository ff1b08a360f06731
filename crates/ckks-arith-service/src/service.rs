//! Encrypted arithmetic facade: encrypt, decrypt, add and multiply on opaque
//! serialized ciphertexts.
//!
//! Parameter setup and key generation happen once, synchronously, inside the
//! constructor. The resulting service is immutable and can be cloned into
//! any number of threads; every call works on its own buffers.

use std::fmt;
use std::sync::Arc;

use ckks_arith_core::serialize::{ciphertext_from_bytes, ciphertext_to_bytes};
use ckks_arith_core::{
    Ciphertext, CkksContext, CkksError, KeyMaterial, ParameterSet, ParamsId, Result,
};
use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

use crate::config::ServiceConfig;

/// An opaque, transport-ready ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct SerializedCiphertext(Vec<u8>);

impl SerializedCiphertext {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size report for diagnostics.
    pub fn size(&self) -> CiphertextSize {
        CiphertextSize {
            bytes: self.0.len(),
            kib: self.0.len() as f64 / 1024.0,
        }
    }
}

impl fmt::Debug for SerializedCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedCiphertext({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for SerializedCiphertext {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Byte length of a serialized ciphertext.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CiphertextSize {
    pub bytes: usize,
    pub kib: f64,
}

impl fmt::Display for CiphertextSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes ({:.2} KiB)", self.bytes, self.kib)
    }
}

struct Inner {
    ctx: CkksContext,
    keys: KeyMaterial,
}

#[derive(Clone)]
pub struct EncryptedArithmeticService {
    inner: Arc<Inner>,
}

impl fmt::Debug for EncryptedArithmeticService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedArithmeticService")
            .field("params_id", &self.params_id())
            .finish_non_exhaustive()
    }
}

impl EncryptedArithmeticService {
    /// Build the scheme and generate keys from OS entropy.
    pub fn new(params: ParameterSet) -> Self {
        let ctx = CkksContext::new(params);
        let keys = KeyMaterial::generate(&ctx);
        Self::assemble(ctx, keys)
    }

    /// Same as [`new`](Self::new) with a caller-supplied key-generation RNG.
    pub fn with_rng<R: RngCore + CryptoRng>(params: ParameterSet, rng: &mut R) -> Self {
        let ctx = CkksContext::new(params);
        let keys = KeyMaterial::generate_with_rng(&ctx, rng);
        Self::assemble(ctx, keys)
    }

    /// Build from configuration. Fails with [`CkksError::InvalidParameters`].
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self::new(config.parameter_set()?))
    }

    fn assemble(ctx: CkksContext, keys: KeyMaterial) -> Self {
        let params = ctx.params();
        info!(
            params_id = %params.id(),
            ring_degree = params.ring_degree(),
            depth = params.max_level(),
            scale_bits = params.scale_bits(),
            "encrypted arithmetic service ready"
        );
        Self {
            inner: Arc::new(Inner { ctx, keys }),
        }
    }

    pub fn params(&self) -> &ParameterSet {
        self.inner.ctx.params()
    }

    pub fn params_id(&self) -> ParamsId {
        self.params().id()
    }

    /// Encrypt one real scalar. Fails with [`CkksError::InvalidInput`] for
    /// non-finite or out-of-range values.
    pub fn encrypt(&self, value: f64) -> Result<SerializedCiphertext> {
        let ctx = &self.inner.ctx;
        let pt = ctx.encode_scalar(value)?;
        let ct = ctx.encrypt(&pt, self.inner.keys.public_key())?;
        Ok(self.store(&ct))
    }

    /// Decrypt and round to the nearest integer.
    pub fn decrypt(&self, ct: &SerializedCiphertext) -> Result<i64> {
        let value = self.decrypt_value(ct)?;
        let rounded = value.round();
        if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
            return Err(CkksError::Decryption(format!(
                "decrypted value {value} does not fit an i64"
            )));
        }
        Ok(rounded as i64)
    }

    /// Decrypt without rounding.
    pub fn decrypt_value(&self, ct: &SerializedCiphertext) -> Result<f64> {
        let ct = self.load(ct).map_err(|e| match e {
            CkksError::ParameterMismatch { .. } => CkksError::Decryption(e.to_string()),
            other => other,
        })?;
        let value = self.inner.ctx.decrypt_scalar(&ct, &self.inner.keys)?;
        debug!(level = ct.level, "decrypted ciphertext");
        Ok(value)
    }

    pub fn add(
        &self,
        a: &SerializedCiphertext,
        b: &SerializedCiphertext,
    ) -> Result<SerializedCiphertext> {
        let (a, b) = (self.load(a)?, self.load(b)?);
        let sum = self.inner.ctx.add(&a, &b)?;
        Ok(self.store(&sum))
    }

    /// Multiply, relinearize and rescale; consumes one level.
    pub fn multiply(
        &self,
        a: &SerializedCiphertext,
        b: &SerializedCiphertext,
    ) -> Result<SerializedCiphertext> {
        let (a, b) = (self.load(a)?, self.load(b)?);
        let product = self
            .inner
            .ctx
            .multiply(&a, &b, self.inner.keys.relin_key())?;
        Ok(self.store(&product))
    }

    /// Byte length of a serialized ciphertext. Pure metadata read.
    pub fn ciphertext_size(&self, ct: &SerializedCiphertext) -> CiphertextSize {
        ct.size()
    }

    /// Remaining multiplicative depth of a serialized ciphertext.
    pub fn level(&self, ct: &SerializedCiphertext) -> Result<usize> {
        Ok(self.load(ct)?.level)
    }

    fn load(&self, ct: &SerializedCiphertext) -> Result<Ciphertext> {
        ciphertext_from_bytes(ct.as_bytes(), self.params())
    }

    fn store(&self, ct: &Ciphertext) -> SerializedCiphertext {
        SerializedCiphertext(ciphertext_to_bytes(ct))
    }
}
