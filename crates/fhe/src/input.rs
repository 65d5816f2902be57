//! Verification of encrypted client inputs.

use tracing::debug;

use sealed_crypto::{decode_payload, open_input, pedersen_verify, PedersenParams};
use sealed_types::{compute_input_identity, short_address, Address, EncryptedValue, ExternalInput};

use crate::acl::AccessTag;
use crate::error::FheError;
use crate::executor::FheContext;

impl FheContext<'_> {
    /// Import a client input into this domain.
    ///
    /// The envelope must open under the identity bound to this domain, the
    /// sender and the declared type, the value must fit the type, and the
    /// commitment in the proof must open to the value with the randomness
    /// carried in the envelope. Anything else is `MalformedProof`.
    pub fn verify_input(
        &mut self,
        input: &ExternalInput,
        sender: &Address,
    ) -> Result<EncryptedValue, FheError> {
        let domain = self.domain();
        let ty = input.envelope.ty;
        let identity = compute_input_identity(&domain, sender, ty);

        let payload = open_input(self.executor().keys(), &identity, &input.envelope)
            .map_err(|e| FheError::MalformedProof(format!("envelope: {e}")))?;
        let (value, randomness) =
            decode_payload(&payload).map_err(|e| FheError::MalformedProof(format!("payload: {e}")))?;

        if value > ty.max_value() {
            return Err(FheError::MalformedProof(format!(
                "value does not fit in {ty:?}"
            )));
        }

        pedersen_verify(&PedersenParams::new(), &input.proof.commitment, value, &randomness)
            .map_err(|e| FheError::MalformedProof(format!("commitment: {e}")))?;

        let imported = self
            .executor_mut()
            .seal(value, ty, AccessTag::owned_by(domain))?;

        debug!(
            domain = %short_address(&domain),
            sender = %short_address(sender),
            handle = %imported.handle,
            "input verified"
        );
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use sealed_client::encrypt_input;
    use sealed_types::{FheType, PedersenCommitment};

    use super::*;
    use crate::executor::tests::{executor, ALICE, AUCTION, TOKEN};

    #[test]
    fn test_valid_input_accepted() {
        let mut fhe = executor();
        let prepared = encrypt_input(&fhe.public_key(), &TOKEN, &ALICE, 500, FheType::U64, &mut OsRng)
            .unwrap();

        let value = fhe.context(TOKEN).verify_input(&prepared.input, &ALICE).unwrap();
        assert_eq!(value.ty, FheType::U64);
        assert_eq!(fhe.reveal(&value).unwrap(), 500);
        assert!(fhe.access_tag(&value.handle).unwrap().admits(&TOKEN));
    }

    #[test]
    fn test_input_bound_to_sender_and_domain() {
        let mut fhe = executor();
        let prepared = encrypt_input(&fhe.public_key(), &TOKEN, &ALICE, 500, FheType::U64, &mut OsRng)
            .unwrap();

        let replayed_by_other = fhe.context(TOKEN).verify_input(&prepared.input, &[9u8; 32]);
        assert!(matches!(replayed_by_other, Err(FheError::MalformedProof(_))));

        let other_contract = fhe.context(AUCTION).verify_input(&prepared.input, &ALICE);
        assert!(matches!(other_contract, Err(FheError::MalformedProof(_))));
    }

    #[test]
    fn test_forged_commitment_rejected() {
        let mut fhe = executor();
        let mut prepared =
            encrypt_input(&fhe.public_key(), &TOKEN, &ALICE, 500, FheType::U64, &mut OsRng).unwrap();
        let other = encrypt_input(&fhe.public_key(), &TOKEN, &ALICE, 501, FheType::U64, &mut OsRng)
            .unwrap();
        prepared.input.proof = other.input.proof;

        let result = fhe.context(TOKEN).verify_input(&prepared.input, &ALICE);
        assert!(matches!(result, Err(FheError::MalformedProof(_))));

        prepared.input.proof.commitment = PedersenCommitment {
            point: Default::default(),
        };
        let result = fhe.context(TOKEN).verify_input(&prepared.input, &ALICE);
        assert!(matches!(result, Err(FheError::MalformedProof(_))));
    }

    #[test]
    fn test_declared_type_is_authenticated() {
        let mut fhe = executor();
        let mut prepared =
            encrypt_input(&fhe.public_key(), &TOKEN, &ALICE, 300, FheType::U64, &mut OsRng).unwrap();

        // Relabelling the envelope changes the identity it must open under.
        prepared.input.envelope.ty = FheType::U8;
        let result = fhe.context(TOKEN).verify_input(&prepared.input, &ALICE);
        assert!(matches!(result, Err(FheError::MalformedProof(_))));
        assert!(fhe.is_empty());
    }
}
