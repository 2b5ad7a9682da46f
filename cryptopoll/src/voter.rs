use crate::*;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// A registered voter
///
/// Only the public half of the voter's signing key is kept server-side.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VoterIdentity {
    pub id: VoterId,
    pub signature_public_key: VerifyingKey,
}

impl VoterIdentity {
    /// Create a new identity with a freshly generated signing key
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<(Self, SigningKey), Error> {
        let signing_key = SigningKey::generate(rng, bits)?;
        let voter = VoterIdentity {
            id: VoterId::new(),
            signature_public_key: signing_key.verifying_key(),
        };
        Ok((voter, signing_key))
    }
}

/// Register a voter, storing the public key and handing the signing key back to the caller.
pub fn register_voter<S, R>(store: &S, rng: &mut R, bits: usize) -> Result<(VoterIdentity, SigningKey), Error>
where
    S: Store + ?Sized,
    R: RngCore + CryptoRng,
{
    let (voter, signing_key) = VoterIdentity::new(rng, bits)?;
    store.put_voter(&voter)?;

    log::debug!("registered voter {}", voter.id);
    Ok((voter, signing_key))
}

/// Get a voter, or a not-found error
pub fn get_voter<S: Store + ?Sized>(store: &S, voter_id: VoterId) -> Result<VoterIdentity, Error> {
    store
        .get_voter(voter_id)?
        .ok_or_else(|| NotFound::Voter(voter_id).into())
}
