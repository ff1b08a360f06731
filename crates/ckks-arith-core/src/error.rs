//! Error taxonomy for the CKKS core.
//!
//! Every fallible operation returns [`Result`]. Only [`CkksError::InvalidParameters`]
//! is treated as fatal by callers (it can only occur while building a
//! [`ParameterSet`](crate::params::ParameterSet) at startup).

use thiserror::Error as ThisError;

use crate::params::ParamsId;

pub type Result<T> = std::result::Result<T, CkksError>;

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum CkksError {
    /// No valid scheme instance could be built from the requested parameters.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A caller-supplied value cannot be encoded (non-finite or out of range).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialized bytes are truncated or structurally invalid.
    #[error("codec error: {0}")]
    Codec(String),

    /// Serialized bytes were produced under a different parameter set.
    #[error("parameter mismatch: expected parameter set {expected}, found {found}")]
    ParameterMismatch { expected: ParamsId, found: ParamsId },

    /// Two operands disagree on level or scale.
    #[error("incompatible operands: {0}")]
    IncompatibleOperands(String),

    /// Multiplication requested on a ciphertext with no level left to rescale.
    #[error("modulus chain exhausted: ciphertext at level {level} cannot be rescaled")]
    ModulusChainExhausted { level: usize },

    /// The ciphertext does not structurally match the decryption key.
    #[error("decryption error: {0}")]
    Decryption(String),
}
