//! ckks-arith core: approximate homomorphic arithmetic on real numbers (CKKS).
//!
//! This library implements the operation set needed for encrypted scalar
//! arithmetic:
//! - Parameter setup over an RNS modulus chain with security bounds
//! - Encode/Decode (canonical embedding)
//! - Public-key Encrypt / Decrypt (RLWE)
//! - ct + ct, ct - ct
//! - ct × ct with relinearization and rescaling
//! - A strict binary codec for ciphertexts
//!
//! NOT implemented:
//! - Bootstrapping
//! - Ciphertext rotation (Galois automorphisms)
//! - Multi-party keys

pub mod ciphertext;
pub mod encoding;
pub mod error;
pub mod evaluator;
pub mod keys;
pub mod ntt;
pub mod params;
pub mod rns;
pub mod sampling;
pub mod serialize;

pub use ciphertext::{Ciphertext, CkksContext};
pub use encoding::{CkksEncoder, Plaintext};
pub use error::{CkksError, Result};
pub use evaluator::ExpandedCiphertext;
pub use keys::{KeyMaterial, PublicKey, RelinearizationKey};
pub use params::{ParameterSet, ParamsId, SecurityLevel};
