//! Pedersen commitments on BLS12-381 G1.
//!
//! A Pedersen commitment C = g^v · h^r is:
//! - **Hiding**: Given C, cannot determine v without r
//! - **Binding**: Cannot find different (v', r') with same C
//!
//! Inputs carry a commitment to their value; the opening `r` travels inside
//! the encrypted envelope so only the network can check it.

use bls12_381::{G1Affine, G1Projective, Scalar};
use group::Curve;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use sealed_types::{PedersenCommitment, Scalar as TypesScalar};

use crate::envelope::{compress_g1, random_scalar};
use crate::error::CryptoError;

/// Parameters for Pedersen commitments.
pub struct PedersenParams {
    /// Base point g
    pub g: G1Affine,
    /// Base point h (nothing-up-my-sleeve generation)
    pub h: G1Affine,
}

impl Default for PedersenParams {
    fn default() -> Self {
        Self::new()
    }
}

impl PedersenParams {
    /// Uses the G1 generator as g and a hash-derived point as h.
    pub fn new() -> Self {
        Self {
            g: G1Affine::generator(),
            h: derive_h_point(),
        }
    }

    fn commit_scalar(&self, value: u64, randomness: &Scalar) -> PedersenCommitment {
        let point = (G1Projective::from(self.g) * Scalar::from(value)
            + G1Projective::from(self.h) * randomness)
            .to_affine();
        PedersenCommitment {
            point: compress_g1(&point),
        }
    }
}

/// Derive the h point from a fixed domain string.
fn derive_h_point() -> G1Affine {
    let mut counter = 0u32;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(b"SEALED_PEDERSEN_H_BLS12381_V1");
        hasher.update(counter.to_le_bytes());
        let bytes: [u8; 32] = hasher.finalize().into();

        if let Some(s) = Option::<Scalar>::from(Scalar::from_bytes(&bytes)) {
            return (G1Projective::generator() * s).to_affine();
        }
        counter += 1;
    }
}

/// Commit to `value` with fresh randomness.
///
/// Returns the commitment and the randomness needed to open it.
pub fn pedersen_commit<R: RngCore + CryptoRng>(
    params: &PedersenParams,
    value: u64,
    rng: &mut R,
) -> (PedersenCommitment, TypesScalar) {
    let randomness = random_scalar(rng);
    let commitment = params.commit_scalar(value, &randomness);
    (commitment, TypesScalar(randomness.to_bytes()))
}

/// Recompute a commitment from a known opening.
pub fn pedersen_commit_with_randomness(
    params: &PedersenParams,
    value: u64,
    randomness: &TypesScalar,
) -> Result<PedersenCommitment, CryptoError> {
    let r = Option::<Scalar>::from(Scalar::from_bytes(&randomness.0))
        .ok_or(CryptoError::InvalidScalar)?;
    Ok(params.commit_scalar(value, &r))
}

/// Verify a Pedersen commitment opening.
pub fn pedersen_verify(
    params: &PedersenParams,
    commitment: &PedersenCommitment,
    value: u64,
    randomness: &TypesScalar,
) -> Result<(), CryptoError> {
    let expected = pedersen_commit_with_randomness(params, value, randomness)?;

    if commitment.point == expected.point {
        Ok(())
    } else {
        Err(CryptoError::InvalidCommitment)
    }
}
