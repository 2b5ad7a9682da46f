//! The ballot ledger: at most one live ballot per voter per poll.
//!
//! Submission checks that the ballot is well formed for the poll but does not check the signature.
//! Signatures are checked at tally time, so that a bad ballot excludes itself rather than blocking
//! a voter from replacing it.

use crate::*;
use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Outcome of a successful submission
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    /// First ballot from this voter in this poll
    Inserted,

    /// The voter's previous ballot was replaced
    Replaced,
}

/// Record a ballot, replacing any earlier ballot by the same voter in the same poll.
///
/// Nothing is written unless the poll exists and is open at `now`, the voter is registered, the
/// vector has one ciphertext per option, and every ciphertext is in range for the poll key.
pub fn submit<S: Store + ?Sized>(store: &S, ballot: Ballot, now: DateTime<Utc>) -> Result<Ack, Error> {
    let poll = get_poll(store, ballot.poll_id)?;
    if !poll.is_open(now) {
        return Err(ValidationError::PollClosed(poll.id).into());
    }

    if store.get_voter(ballot.voter_id)?.is_none() {
        return Err(NotFound::Voter(ballot.voter_id).into());
    }

    if ballot.ciphertexts.len() != poll.options.len() {
        return Err(ValidationError::VectorLengthMismatch {
            expected: poll.options.len(),
            found: ballot.ciphertexts.len(),
        }
        .into());
    }

    if let Some(i) = ballot
        .ciphertexts
        .iter()
        .position(|c| !poll.public_key.is_valid_ciphertext(c))
    {
        return Err(ValidationError::CiphertextOutOfRange(i).into());
    }

    let voter_id = ballot.voter_id;
    let ack = store.upsert_ballot(ballot)?;
    match ack {
        Ack::Inserted => log::info!("recorded ballot from voter {} in poll {}", voter_id, poll.id),
        Ack::Replaced => log::info!("replaced ballot from voter {} in poll {}", voter_id, poll.id),
    }

    Ok(ack)
}

/// Encrypt a choice, sign it and submit it in one step
pub fn cast_ballot<S, R>(
    store: &S,
    rng: &mut R,
    poll_id: PollId,
    voter_id: VoterId,
    choice: OptionId,
    signing_key: &SigningKey,
    now: DateTime<Utc>,
) -> Result<Ack, Error>
where
    S: Store + ?Sized,
    R: RngCore + CryptoRng,
{
    let poll = get_poll(store, poll_id)?;
    if !poll.is_open(now) {
        return Err(ValidationError::PollClosed(poll.id).into());
    }

    let ciphertexts = encode_choice(rng, choice, &poll.options, &poll.public_key)?;
    let ballot = Ballot::seal(poll.id, voter_id, ciphertexts, signing_key)?;

    submit(store, ballot, now)
}

/// Get the live ballot of a voter in a poll
pub fn get_ballot<S: Store + ?Sized>(store: &S, poll_id: PollId, voter_id: VoterId) -> Result<Ballot, Error> {
    store
        .get_ballot(poll_id, voter_id)?
        .ok_or_else(|| NotFound::Ballot(poll_id, voter_id).into())
}

/// All live ballots in a poll, ordered by voter
pub fn list_ballots<S: Store + ?Sized>(store: &S, poll_id: PollId) -> Result<Vec<Ballot>, Error> {
    // Distinguish an unknown poll from a poll with no ballots
    get_poll(store, poll_id)?;

    let mut ballots = store.list_ballots(poll_id)?;
    ballots.sort_by_key(|b| b.voter_id);
    Ok(ballots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use num_bigint_dig::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        store: MemStore,
        poll: Poll,
        voter: VoterIdentity,
        signing_key: SigningKey,
        rng: ChaCha20Rng,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let store = MemStore::default();
        let vault = MemKeyVault::default();
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let now = Utc::now();

        let request = NewPoll {
            title: "Lunch".to_owned(),
            close_time: now + Duration::hours(1),
            options: vec!["Pizza".to_owned(), "Sushi".to_owned()],
        };
        let poll = create_poll(&store, &vault, &mut rng, &request, 512, now).unwrap();
        let (voter, signing_key) = register_voter(&store, &mut rng, 1024).unwrap();

        Fixture {
            store,
            poll,
            voter,
            signing_key,
            rng,
            now,
        }
    }

    #[test]
    fn test_cast_and_replace() {
        let mut f = fixture();
        let (pizza, sushi) = (f.poll.options[0].id, f.poll.options[1].id);

        let ack = cast_ballot(&f.store, &mut f.rng, f.poll.id, f.voter.id, pizza, &f.signing_key, f.now).unwrap();
        assert_eq!(ack, Ack::Inserted);
        let first = get_ballot(&f.store, f.poll.id, f.voter.id).unwrap();

        let ack = cast_ballot(&f.store, &mut f.rng, f.poll.id, f.voter.id, sushi, &f.signing_key, f.now).unwrap();
        assert_eq!(ack, Ack::Replaced);

        let ballots = list_ballots(&f.store, f.poll.id).unwrap();
        assert_eq!(ballots.len(), 1);
        assert_ne!(ballots[0], first);
        assert!(ballots[0].verify(&f.voter.signature_public_key));
    }

    #[test]
    fn test_submit_rejections_leave_ledger_unchanged() {
        let mut f = fixture();
        let pizza = f.poll.options[0].id;
        let ciphertexts = encode_choice(&mut f.rng, pizza, &f.poll.options, &f.poll.public_key).unwrap();
        let ballot = Ballot::seal(f.poll.id, f.voter.id, ciphertexts, &f.signing_key).unwrap();

        // Closed at exactly the close time
        assert_matches!(
            submit(&f.store, ballot.clone(), f.poll.close_time),
            Err(Error::Validation(ValidationError::PollClosed(_)))
        );
        assert_matches!(
            cast_ballot(&f.store, &mut f.rng, f.poll.id, f.voter.id, pizza, &f.signing_key, f.poll.close_time),
            Err(Error::Validation(ValidationError::PollClosed(_)))
        );

        let mut unknown_poll = ballot.clone();
        unknown_poll.poll_id = PollId::new();
        assert_matches!(
            submit(&f.store, unknown_poll, f.now),
            Err(Error::NotFound(NotFound::Poll(_)))
        );

        let mut unknown_voter = ballot.clone();
        unknown_voter.voter_id = VoterId::new();
        assert_matches!(
            submit(&f.store, unknown_voter, f.now),
            Err(Error::NotFound(NotFound::Voter(_)))
        );

        let mut short = ballot.clone();
        short.ciphertexts.pop();
        assert_matches!(
            submit(&f.store, short, f.now),
            Err(Error::Validation(ValidationError::VectorLengthMismatch {
                expected: 2,
                found: 1
            }))
        );

        let mut out_of_range = ballot.clone();
        out_of_range.ciphertexts[1] = Ciphertext::from(f.poll.public_key.n_squared().clone());
        assert_matches!(
            submit(&f.store, out_of_range, f.now),
            Err(Error::Validation(ValidationError::CiphertextOutOfRange(1)))
        );

        let mut zero = ballot.clone();
        zero.ciphertexts[0] = Ciphertext::from(BigUint::from(0u32));
        assert_matches!(
            submit(&f.store, zero, f.now),
            Err(Error::Validation(ValidationError::CiphertextOutOfRange(0)))
        );

        assert_matches!(
            cast_ballot(&f.store, &mut f.rng, f.poll.id, f.voter.id, OptionId::new(), &f.signing_key, f.now),
            Err(Error::Validation(ValidationError::InvalidChoice(_)))
        );

        assert!(list_ballots(&f.store, f.poll.id).unwrap().is_empty());
        assert_matches!(
            get_ballot(&f.store, f.poll.id, f.voter.id),
            Err(Error::NotFound(NotFound::Ballot(_, _)))
        );
        assert_matches!(
            list_ballots(&f.store, PollId::new()),
            Err(Error::NotFound(NotFound::Poll(_)))
        );

        // The untouched ballot is still accepted, and the signature is not checked here
        let mut unsigned = ballot;
        unsigned.signature = vec![];
        assert_eq!(submit(&f.store, unsigned, f.now).unwrap(), Ack::Inserted);
    }
}
