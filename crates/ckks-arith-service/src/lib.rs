//! Encrypted arithmetic service: a thread-safe facade over the CKKS core that
//! speaks only scalars and opaque serialized ciphertexts.

pub mod config;
pub mod service;
pub mod telemetry;

pub use ckks_arith_core::{CkksError, ParameterSet, SecurityLevel};
pub use config::ServiceConfig;
pub use service::{CiphertextSize, EncryptedArithmeticService, SerializedCiphertext};
