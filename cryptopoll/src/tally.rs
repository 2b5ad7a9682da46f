use crate::*;
use indexmap::IndexMap;
use num_bigint_dig::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Why a ballot was left out of a tally
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The signature does not verify against the voter's registered key
    BadSignature,

    /// The signature bytes cannot be a signature from the voter's key
    MalformedSignature,

    /// The ballot names a voter that is not registered
    UnknownVoter,

    /// The ciphertext vector does not have one entry per option
    WrongLength,

    /// A ciphertext is not a valid ciphertext under the poll key
    OutOfRange,
}

/// A ballot left out of a tally
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Exclusion {
    pub voter_id: VoterId,
    pub reason: ExclusionReason,
}

/// Per-option counts for a poll, computed on demand and never stored
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    pub poll_id: PollId,

    /// Counts keyed by option, in poll option order.
    ///
    /// Counts are plaintext residues mod n. Honest ballots only ever add 0 or 1 per option, but a
    /// signed ballot with other values skews them without limit, so they are not bounded by the
    /// number of ballots. Serialized as decimal strings.
    #[serde(with = "crate::serde_hex::decimal_values")]
    pub counts: IndexMap<OptionId, BigUint>,

    /// Number of ballots aggregated into `counts`
    pub counted: usize,

    pub excluded: Vec<Exclusion>,
}

impl TallyResult {
    /// Count for an option, 0 if the option is not part of the poll
    pub fn count(&self, option_id: OptionId) -> BigUint {
        self.counts.get(&option_id).cloned().unwrap_or_else(BigUint::zero)
    }

    /// Total number of votes across all options
    pub fn total(&self) -> BigUint {
        self.counts.values().fold(BigUint::zero(), |total, c| total + c)
    }
}

/// Tally a poll.
///
/// Every live ballot whose signature verifies against its voter's registered key is added
/// homomorphically into one accumulator per option. Only the accumulators are decrypted. Ballots
/// that fail any check are recorded in [`TallyResult::excluded`] and otherwise ignored.
pub fn tally<S, V>(store: &S, vault: &V, poll_id: PollId) -> Result<TallyResult, Error>
where
    S: Store + ?Sized,
    V: KeyVault + ?Sized,
{
    let poll = get_poll(store, poll_id)?;
    let private_key = load_private_key(vault, &poll)?;
    let public_key = &poll.public_key;

    let mut accumulators = vec![public_key.zero(); poll.options.len()];
    let mut counted = 0;
    let mut excluded = Vec::new();

    for ballot in store.list_ballots(poll.id)? {
        match check_ballot(store, &poll, &ballot)? {
            Some(reason) => {
                log::warn!(
                    "excluding ballot from voter {} in poll {}: {:?}",
                    ballot.voter_id,
                    poll.id,
                    reason
                );
                excluded.push(Exclusion {
                    voter_id: ballot.voter_id,
                    reason,
                });
            }
            None => {
                for (acc, c) in accumulators.iter_mut().zip(&ballot.ciphertexts) {
                    *acc = public_key.add(acc, c);
                }
                counted += 1;
            }
        }
    }

    let counts: IndexMap<OptionId, BigUint> = poll
        .options
        .iter()
        .zip(&accumulators)
        .map(|(option, acc)| (option.id, private_key.decrypt(acc)))
        .collect();

    excluded.sort_by_key(|e| e.voter_id);

    log::info!(
        "tallied poll {}: {} ballots counted, {} excluded",
        poll.id,
        counted,
        excluded.len()
    );

    Ok(TallyResult {
        poll_id: poll.id,
        counts,
        counted,
        excluded,
    })
}

// None if the ballot may be counted
fn check_ballot<S: Store + ?Sized>(
    store: &S,
    poll: &Poll,
    ballot: &Ballot,
) -> Result<Option<ExclusionReason>, Error> {
    let voter = match store.get_voter(ballot.voter_id)? {
        Some(voter) => voter,
        None => return Ok(Some(ExclusionReason::UnknownVoter)),
    };

    if ballot.ciphertexts.len() != poll.options.len() {
        return Ok(Some(ExclusionReason::WrongLength));
    }
    if !ballot
        .ciphertexts
        .iter()
        .all(|c| poll.public_key.is_valid_ciphertext(c))
    {
        return Ok(Some(ExclusionReason::OutOfRange));
    }

    let key = &voter.signature_public_key;
    if ballot.signature.len() != key.signature_len() {
        return Ok(Some(ExclusionReason::MalformedSignature));
    }
    if !ballot.verify(key) {
        return Ok(Some(ExclusionReason::BadSignature));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use num_bigint_dig::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn setup(rng: &mut ChaCha20Rng, store: &MemStore, vault: &MemKeyVault) -> Poll {
        let request = NewPoll {
            title: "Colour".to_owned(),
            close_time: Utc::now() + Duration::hours(1),
            options: vec!["Red".to_owned(), "Green".to_owned()],
        };
        create_poll(store, vault, rng, &request, 512, Utc::now()).unwrap()
    }

    #[test]
    fn test_exclusion_reasons() {
        let mut rng = ChaCha20Rng::seed_from_u64(41);
        let store = MemStore::default();
        let vault = MemKeyVault::default();
        let poll = setup(&mut rng, &store, &vault);
        let red = poll.options[0].id;

        let (honest, honest_key) = register_voter(&store, &mut rng, 1024).unwrap();
        cast_ballot(&store, &mut rng, poll.id, honest.id, red, &honest_key, Utc::now()).unwrap();

        // Signed with someone else's key
        let (forged, _) = register_voter(&store, &mut rng, 1024).unwrap();
        let ciphertexts = encode_choice(&mut rng, red, &poll.options, &poll.public_key).unwrap();
        let ballot = Ballot::seal(poll.id, forged.id, ciphertexts, &honest_key).unwrap();
        store.upsert_ballot(ballot).unwrap();

        // Truncated signature
        let (truncated, truncated_key) = register_voter(&store, &mut rng, 1024).unwrap();
        let ciphertexts = encode_choice(&mut rng, red, &poll.options, &poll.public_key).unwrap();
        let mut ballot = Ballot::seal(poll.id, truncated.id, ciphertexts, &truncated_key).unwrap();
        ballot.signature.truncate(10);
        store.upsert_ballot(ballot).unwrap();

        // Never registered
        let ciphertexts = encode_choice(&mut rng, red, &poll.options, &poll.public_key).unwrap();
        let ghost = VoterId::new();
        let ballot = Ballot::seal(poll.id, ghost, ciphertexts, &honest_key).unwrap();
        store.upsert_ballot(ballot).unwrap();

        // Wrong vector shapes written straight to the store
        let (short, short_key) = register_voter(&store, &mut rng, 1024).unwrap();
        let ciphertexts = vec![poll.public_key.encrypt(&mut rng, 1)];
        let ballot = Ballot::seal(poll.id, short.id, ciphertexts, &short_key).unwrap();
        store.upsert_ballot(ballot).unwrap();

        let (garbage, garbage_key) = register_voter(&store, &mut rng, 1024).unwrap();
        let ciphertexts = vec![
            Ciphertext::from(BigUint::from(0u32)),
            poll.public_key.encrypt(&mut rng, 1),
        ];
        let ballot = Ballot::seal(poll.id, garbage.id, ciphertexts, &garbage_key).unwrap();
        store.upsert_ballot(ballot).unwrap();

        let result = tally(&store, &vault, poll.id).unwrap();
        assert_eq!(result.count(red), BigUint::from(1u32));
        assert!(result.count(poll.options[1].id).is_zero());
        assert_eq!(result.counted, 1);
        assert_eq!(result.excluded.len(), 5);

        let reason = |voter_id: VoterId| {
            result
                .excluded
                .iter()
                .find(|e| e.voter_id == voter_id)
                .map(|e| e.reason)
        };
        assert_eq!(reason(forged.id), Some(ExclusionReason::BadSignature));
        assert_eq!(reason(truncated.id), Some(ExclusionReason::MalformedSignature));
        assert_eq!(reason(ghost), Some(ExclusionReason::UnknownVoter));
        assert_eq!(reason(short.id), Some(ExclusionReason::WrongLength));
        assert_eq!(reason(garbage.id), Some(ExclusionReason::OutOfRange));
        assert_eq!(reason(honest.id), None);
    }

    #[test]
    fn test_tally_errors() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let store = MemStore::default();
        let vault = MemKeyVault::default();

        assert_matches!(
            tally(&store, &vault, PollId::new()),
            Err(Error::NotFound(NotFound::Poll(_)))
        );

        // A poll whose key has gone missing cannot be tallied
        let poll = setup(&mut rng, &store, &vault);
        vault.delete_private_key(poll.id).unwrap();
        assert_matches!(
            tally(&store, &vault, poll.id),
            Err(Error::NotFound(NotFound::PrivateKey(_)))
        );

        vault.write_private_key(poll.id, b"3:5").unwrap();
        assert_matches!(
            tally(&store, &vault, poll.id),
            Err(Error::Format(FormatError::KeyMismatch))
        );
    }

    #[test]
    fn test_tally_json() {
        let mut rng = ChaCha20Rng::seed_from_u64(43);
        let store = MemStore::default();
        let vault = MemKeyVault::default();
        let poll = setup(&mut rng, &store, &vault);

        let result = tally(&store, &vault, poll.id).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        let keys: Vec<String> = json["counts"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        let expected: Vec<String> = poll.options.iter().map(|o| o.id.to_string()).collect();
        assert_eq!(keys, expected);
        assert_eq!(json["counted"], 0);
        assert!(result.total().is_zero());
        assert_eq!(json["counts"][expected[0].as_str()], "0");

        let restored: TallyResult = serde_json::from_value(json).unwrap();
        assert_eq!(restored, result);
    }

    #[test]
    fn test_oversized_count_is_reported() {
        let mut rng = ChaCha20Rng::seed_from_u64(44);
        let store = MemStore::default();
        let vault = MemKeyVault::default();
        let poll = setup(&mut rng, &store, &vault);
        let (red, green) = (poll.options[0].id, poll.options[1].id);

        let (honest, honest_key) = register_voter(&store, &mut rng, 1024).unwrap();
        cast_ballot(&store, &mut rng, poll.id, honest.id, red, &honest_key, Utc::now()).unwrap();

        // A properly signed ballot that puts 2^64 on one option
        let big = BigUint::from(1u32) << 64;
        let (stuffer, stuffer_key) = register_voter(&store, &mut rng, 1024).unwrap();
        let ciphertexts = vec![
            poll.public_key.encrypt_biguint(&mut rng, &big),
            poll.public_key.encrypt(&mut rng, 0),
        ];
        let ballot = Ballot::seal(poll.id, stuffer.id, ciphertexts, &stuffer_key).unwrap();
        submit(&store, ballot, Utc::now()).unwrap();

        let result = tally(&store, &vault, poll.id).unwrap();
        assert_eq!(result.count(red), big + 1u32);
        assert!(result.count(green).is_zero());
        assert_eq!(result.counted, 2);
        assert!(result.excluded.is_empty());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["counts"][red.to_string()], "18446744073709551617");
    }
}
