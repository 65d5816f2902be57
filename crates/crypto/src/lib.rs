//! Cryptographic primitives behind the confidential executor.
//!
//! # Overview
//!
//! 1. **Network keys**: a single seed is expanded with HKDF into a BLS12-381
//!    input secret `s` (public key `MPK = s·G2`) and an AES-256-GCM key used
//!    to seal ciphertexts at rest.
//!
//! 2. **Input envelopes**: clients encrypt a value to the identity
//!    `H(contract || sender || type)` using only the MPK. Only the network,
//!    which can derive `s·H(id)`, opens the envelope, and only for the
//!    contract and sender it was bound to.
//!
//! 3. **Pedersen commitments**: each input carries a commitment to its value
//!    whose opening travels inside the envelope, proving the envelope holds
//!    a well-formed integer.
//!
//! 4. **Sealing**: every ciphertext in the executor's store is an AEAD box
//!    under the at-rest key, bound to its plaintext type.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod pedersen;
pub mod sealing;

pub use envelope::{
    decode_payload, encode_payload, encrypt_input, open_input, InputParams, INPUT_PAYLOAD_LEN,
};
pub use error::CryptoError;
pub use keys::NetworkKeys;
pub use pedersen::{pedersen_commit, pedersen_verify, PedersenParams};
pub use sealing::SealingKey;
