use crate::*;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Encode a single choice as a one-hot vector of ciphertexts, one per poll option.
///
/// The chosen option's slot encrypts 1 and every other slot encrypts 0, each with independent
/// randomness.
pub fn encode_choice<R: RngCore + CryptoRng>(
    rng: &mut R,
    choice: OptionId,
    options: &[PollOption],
    public_key: &PublicKey,
) -> Result<Vec<Ciphertext>, ValidationError> {
    if !options.iter().any(|o| o.id == choice) {
        return Err(ValidationError::InvalidChoice(choice));
    }

    let ciphertexts = options
        .iter()
        .map(|option| public_key.encrypt(rng, (option.id == choice) as u64))
        .collect();

    Ok(ciphertexts)
}

/// An encrypted, signed ballot
///
/// `ciphertexts[i]` is aligned to the poll's `options[i]`. The signature covers the
/// [`canonical_message`] of the poll, voter and ciphertexts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Ballot {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub ciphertexts: Vec<Ciphertext>,

    #[serde(with = "hex_serde")]
    pub signature: Vec<u8>,
}

impl Ballot {
    /// Sign the ciphertexts and assemble a ballot
    pub fn seal(
        poll_id: PollId,
        voter_id: VoterId,
        ciphertexts: Vec<Ciphertext>,
        signing_key: &SigningKey,
    ) -> Result<Self, Error> {
        let message = canonical_message(poll_id, voter_id, &ciphertexts);
        let signature = signing_key.sign(&message)?;

        Ok(Ballot {
            poll_id,
            voter_id,
            ciphertexts,
            signature,
        })
    }

    /// The message the signature must cover
    pub fn message(&self) -> String {
        canonical_message(self.poll_id, self.voter_id, &self.ciphertexts)
    }

    pub fn verify(&self, verifying_key: &VerifyingKey) -> bool {
        verifying_key.verify(&self.message(), &self.signature)
    }

    /// Decrypt the ballot and recover the chosen option.
    ///
    /// Returns None unless exactly one slot decrypts to 1 and all others to 0.
    pub fn decode_choice(&self, options: &[PollOption], private_key: &PrivateKey) -> Option<OptionId> {
        if self.ciphertexts.len() != options.len() {
            return None;
        }

        let mut choice = None;
        for (option, c) in options.iter().zip(&self.ciphertexts) {
            match private_key.decrypt_count(c) {
                Ok(0) => {}
                Ok(1) if choice.is_none() => choice = Some(option.id),
                _ => return None,
            }
        }
        choice
    }
}
