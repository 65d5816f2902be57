//! Identity-bound input envelopes on BLS12-381.
//!
//! A Boneh-Franklin style hybrid scheme where the network holds the master
//! secret `s` and clients only know `MPK = s·G2`.
//!
//! # Encryption (client)
//!
//! 1. id_hash = H_1(contract || sender || type) ∈ G1
//! 2. Sample random scalar r, publish U = r·G2
//! 3. shared = e(r·id_hash, MPK)
//! 4. AES-256-GCM under HKDF(shared)
//!
//! # Opening (network)
//!
//! shared = e(s·id_hash, U). An envelope presented for a different contract
//! or sender derives a different key and fails authentication.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use group::Curve;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;

use sealed_types::{FheType, G1Point, G2Point, InputEnvelope, NetworkPublicKey, Scalar as TypesScalar};

use crate::error::CryptoError;
use crate::keys::NetworkKeys;

/// Client-side parameters for input encryption.
pub struct InputParams {
    /// Network public key (MPK = s·G2)
    pub mpk: G2Affine,
}

impl InputParams {
    /// Create params from the published network key.
    pub fn from_public_key(key: &NetworkPublicKey) -> Result<Self, CryptoError> {
        let mpk = decompress_g2(&key.mpk.0)?;
        Ok(Self { mpk })
    }
}

/// Encrypt an input payload to an identity.
pub fn encrypt_input<R: RngCore + CryptoRng>(
    params: &InputParams,
    identity: &[u8],
    plaintext: &[u8],
    ty: FheType,
    rng: &mut R,
) -> Result<InputEnvelope, CryptoError> {
    let id_hash = hash_to_g1(identity);
    let r = random_scalar(rng);

    let u_affine = (G2Projective::generator() * r).to_affine();

    // e(r·H(id), MPK) = e(H(id), MPK)^r
    let r_id_hash = (id_hash * r).to_affine();
    let shared_gt = pairing(&r_id_hash, &params.mpk);
    let key = derive_key_from_gt(&shared_gt)?;

    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::EncryptionFailed(format!("Failed to create cipher: {}", e)))?;

    let ciphertext_with_tag = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM encryption failed: {}", e)))?;

    let tag_start = ciphertext_with_tag.len() - 16;
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&ciphertext_with_tag[tag_start..]);

    Ok(InputEnvelope {
        ephemeral_pubkey: compress_g2(&u_affine),
        ciphertext: ciphertext_with_tag[..tag_start].to_vec(),
        tag,
        nonce: nonce_bytes,
        ty,
    })
}

/// Open an envelope with the network secret.
pub fn open_input(
    keys: &NetworkKeys,
    identity: &[u8],
    envelope: &InputEnvelope,
) -> Result<Vec<u8>, CryptoError> {
    let sigma = keys.identity_key(identity);
    let u = decompress_g2(&envelope.ephemeral_pubkey.0)?;

    // e(s·H(id), r·G2) = e(H(id), MPK)^r
    let shared_gt = pairing(&sigma, &u);
    let key = derive_key_from_gt(&shared_gt)?;

    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivationFailed)?;

    let mut ct_with_tag = envelope.ciphertext.clone();
    ct_with_tag.extend_from_slice(&envelope.tag);

    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), ct_with_tag.as_ref())
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Envelope payload length: value (8 bytes LE) || commitment randomness (32 bytes).
pub const INPUT_PAYLOAD_LEN: usize = 40;

/// Encode the plaintext carried inside an envelope.
pub fn encode_payload(value: u64, randomness: &TypesScalar) -> Vec<u8> {
    let mut payload = Vec::with_capacity(INPUT_PAYLOAD_LEN);
    payload.extend_from_slice(&value.to_le_bytes());
    payload.extend_from_slice(&randomness.0);
    payload
}

/// Split an opened payload into value and commitment randomness.
pub fn decode_payload(payload: &[u8]) -> Result<(u64, TypesScalar), CryptoError> {
    if payload.len() != INPUT_PAYLOAD_LEN {
        return Err(CryptoError::InvalidCiphertextFormat);
    }
    let mut value = [0u8; 8];
    value.copy_from_slice(&payload[..8]);
    let mut randomness = [0u8; 32];
    randomness.copy_from_slice(&payload[8..]);
    Ok((u64::from_le_bytes(value), TypesScalar(randomness)))
}

/// Hash arbitrary data to a G1 point.
pub fn hash_to_g1(data: &[u8]) -> G1Affine {
    // Try-and-increment over scalars; not a constant-time RFC 9380 map.
    use sha2::Digest;

    let mut counter = 0u64;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(b"BLS12381G1_XMD:SHA-256_SSWU_RO_");
        hasher.update(data);
        hasher.update(counter.to_le_bytes());
        let hash: [u8; 32] = hasher.finalize().into();

        if let Some(scalar) = Option::<Scalar>::from(Scalar::from_bytes(&hash)) {
            return (G1Projective::generator() * scalar).to_affine();
        }
        counter += 1;
    }
}

/// Generate a random scalar.
pub(crate) fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_wide(&bytes)
}

/// Derive a symmetric key from a GT element.
fn derive_key_from_gt(gt: &bls12_381::Gt) -> Result<[u8; 32], CryptoError> {
    use sha2::Digest;

    // Gt exposes no canonical encoding; its debug form is deterministic.
    let gt_digest = Sha256::digest(format!("{:?}", gt).as_bytes());

    let hk = Hkdf::<Sha256>::new(None, &gt_digest);
    let mut key = [0u8; 32];
    hk.expand(b"SEALED-INPUT-KEY", &mut key)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    Ok(key)
}

/// Compress a G1 point to bytes.
pub fn compress_g1(point: &G1Affine) -> G1Point {
    G1Point(point.to_compressed())
}

/// Decompress a G1 point from bytes.
pub fn decompress_g1(bytes: &[u8; 48]) -> Result<G1Affine, CryptoError> {
    Option::from(G1Affine::from_compressed(bytes)).ok_or(CryptoError::InvalidG1Point)
}

/// Compress a G2 point to bytes.
pub fn compress_g2(point: &G2Affine) -> G2Point {
    G2Point(point.to_compressed())
}

/// Decompress a G2 point from bytes.
pub fn decompress_g2(bytes: &[u8; 96]) -> Result<G2Affine, CryptoError> {
    Option::from(G2Affine::from_compressed(bytes)).ok_or(CryptoError::InvalidG2Point)
}
