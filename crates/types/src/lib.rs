//! Core type definitions for the confidential token ledger and the sealed-bid
//! auction.
//!
//! This crate provides the data structures shared by every layer: encoded
//! curve points, ciphertext handles, client input envelopes and the call
//! context threaded through contract handlers.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

pub mod auction;

pub use auction::{
    AuctionConfig, AuctionOutcome, AuctionPhase, Bid, CancelReason, PendingSettlement, NO_WINNER,
};

// =========================
// CRYPTOGRAPHIC PRIMITIVES
// =========================

/// Compressed G1 point on BLS12-381 (48 bytes)
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct G1Point(#[serde_as(as = "[_; 48]")] pub [u8; 48]);

impl Default for G1Point {
    fn default() -> Self {
        Self([0u8; 48])
    }
}

/// Compressed G2 point on BLS12-381 (96 bytes)
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct G2Point(#[serde_as(as = "[_; 96]")] pub [u8; 96]);

impl Default for G2Point {
    fn default() -> Self {
        Self([0u8; 96])
    }
}

/// Scalar field element (32 bytes, little-endian)
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Scalar(pub [u8; 32]);

/// Pedersen commitment: C = g^value * h^randomness
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PedersenCommitment {
    pub point: G1Point,
}

/// Public half of the network key. Clients encrypt inputs to it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NetworkPublicKey {
    pub mpk: G2Point,
}

// =========================
// ENCRYPTED VALUES
// =========================

/// Generic address type (32 bytes). Used for accounts and contracts alike.
pub type Address = [u8; 32];

/// Identifier of a ciphertext held by the executor.
///
/// A handle is the SHA-256 of the sealed ciphertext bytes; it reveals nothing
/// about the plaintext.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct Handle(pub [u8; 32]);

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Plaintext type carried by a ciphertext.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum FheType {
    Bool,
    U8,
    U16,
    U32,
    U64,
}

impl FheType {
    /// Bit width of the plaintext domain.
    pub fn bits(self) -> u32 {
        match self {
            FheType::Bool => 1,
            FheType::U8 => 8,
            FheType::U16 => 16,
            FheType::U32 => 32,
            FheType::U64 => 64,
        }
    }

    /// Largest plaintext representable by this type.
    pub fn max_value(self) -> u64 {
        match self {
            FheType::U64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }

    /// Stable one-byte tag, bound into sealed ciphertexts.
    pub fn tag(self) -> u8 {
        match self {
            FheType::Bool => 0,
            FheType::U8 => 1,
            FheType::U16 => 2,
            FheType::U32 => 3,
            FheType::U64 => 4,
        }
    }
}

/// An encrypted integer (or boolean) owned by the executor's store.
///
/// Contracts hold these as opaque references. Who may compute on or decrypt
/// the value is recorded in the executor, not here.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct EncryptedValue {
    pub handle: Handle,
    pub ty: FheType,
}

// =========================
// CLIENT INPUTS
// =========================

/// Hybrid ciphertext of a client input, encrypted to the network key under
/// an identity bound to (contract, sender, type).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct InputEnvelope {
    /// Ephemeral public key: U = r·G2
    pub ephemeral_pubkey: G2Point,

    /// Encrypted payload (value || commitment randomness)
    pub ciphertext: Vec<u8>,

    /// Authentication tag
    pub tag: [u8; 16],

    /// Nonce for AEAD
    pub nonce: [u8; 12],

    /// Declared plaintext type
    pub ty: FheType,
}

/// Well-formedness proof accompanying an input.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct InputProof {
    /// Commitment to the plaintext value; must open with the randomness
    /// carried inside the envelope.
    pub commitment: PedersenCommitment,
}

/// An encrypted input as submitted to a contract call.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ExternalInput {
    pub envelope: InputEnvelope,
    pub proof: InputProof,
}

// =========================
// EXECUTION CONTEXT
// =========================

/// Context provided by the runtime for each call.
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Sender of the transaction (or the calling contract)
    pub sender: Address,
    /// Current block height
    pub block_height: u64,
    /// Current timestamp
    pub timestamp: u64,
}

impl CallContext {
    /// Context for a nested call issued by `contract`.
    pub fn as_contract(&self, contract: Address) -> Self {
        Self {
            sender: contract,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }
    }
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Compute the encryption identity binding an input to its target contract,
/// its sender and its declared type.
pub fn compute_input_identity(domain: &Address, sender: &Address, ty: FheType) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"SEALED_INPUT_IDENTITY_V1:");
    hasher.update(domain);
    hasher.update(sender);
    hasher.update([ty.tag()]);
    hasher.finalize().into()
}

/// Deterministic address for a named contract or test account.
pub fn address_from_label(label: &str) -> Address {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"SEALED_ADDRESS_V1:");
    hasher.update(label.as_bytes());
    hasher.finalize().into()
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

/// Short hex rendering of an address for logs.
pub fn short_address(address: &Address) -> String {
    hex::encode(&address[..6])
}
