use crate::*;
use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Poll identifier
    PollId
);
uuid_id!(
    /// Poll option identifier
    OptionId
);
uuid_id!(
    /// Registered voter identifier
    VoterId
);

/// One answer a voter may choose
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
}

/// Lifecycle state of a poll at a given instant
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Open,
    Closed,
}

/// A poll
///
/// The option order is fixed at creation: every ballot is a vector of ciphertexts aligned to it.
/// The private half of the poll key is never part of this struct, it lives in a [`KeyVault`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub close_time: DateTime<Utc>,
    pub options: Vec<PollOption>,
    pub public_key: PublicKey,
}

/// A request to create a poll
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewPoll {
    pub title: String,
    pub close_time: DateTime<Utc>,
    pub options: Vec<String>,
}

impl NewPoll {
    /// Check the shape of the request: a title and at least two distinct, non-empty options
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.options.len() < 2 {
            return Err(ValidationError::TooFewOptions(self.options.len()));
        }

        let mut seen = HashSet::new();
        for text in &self.options {
            let text = text.trim();
            if text.is_empty() {
                return Err(ValidationError::EmptyOptionText);
            }
            if !seen.insert(text) {
                return Err(ValidationError::DuplicateOption(text.to_owned()));
            }
        }

        Ok(())
    }
}

impl Poll {
    /// Build a poll from a validated request and the poll's public key
    pub fn new(request: &NewPoll, public_key: PublicKey) -> Result<Self, ValidationError> {
        request.validate()?;

        let options = request
            .options
            .iter()
            .map(|text| PollOption {
                id: OptionId::new(),
                text: text.trim().to_owned(),
            })
            .collect();

        Ok(Poll {
            id: PollId::new(),
            title: request.title.trim().to_owned(),
            close_time: request.close_time,
            options,
            public_key,
        })
    }

    /// Status of the poll at `now`. A poll is open strictly before its close time.
    pub fn status(&self, now: DateTime<Utc>) -> PollStatus {
        if now < self.close_time {
            PollStatus::Open
        } else {
            PollStatus::Closed
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == PollStatus::Open
    }

    /// Position of an option in the ballot vector
    pub fn option_position(&self, option_id: OptionId) -> Option<usize> {
        self.options.iter().position(|o| o.id == option_id)
    }

    /// Get an option with the given ID
    pub fn get_option(&self, option_id: OptionId) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// Create a poll: validate it, generate its keypair, and file the private key in the vault.
pub fn create_poll<S, V, R>(
    store: &S,
    vault: &V,
    rng: &mut R,
    request: &NewPoll,
    key_bits: usize,
    now: DateTime<Utc>,
) -> Result<Poll, Error>
where
    S: Store + ?Sized,
    V: KeyVault + ?Sized,
    R: RngCore + CryptoRng,
{
    // Reject bad requests before paying for key generation
    request.validate()?;
    if request.close_time <= now {
        return Err(ValidationError::CloseTimeInPast.into());
    }

    let KeyPair { public, private } = KeyPair::generate(rng, key_bits)?;
    let poll = Poll::new(request, public)?;

    vault.write_private_key(poll.id, private.serialize().as_bytes())?;
    if let Err(e) = store.put_poll(&poll) {
        if let Err(delete_err) = vault.delete_private_key(poll.id) {
            log::warn!(
                "unable to remove private key of unsaved poll {}: {}",
                poll.id,
                delete_err
            );
        }
        return Err(e);
    }

    log::info!(
        "created poll {} with {} options, closing at {}",
        poll.id,
        poll.options.len(),
        poll.close_time
    );
    Ok(poll)
}

/// Get a poll, or a not-found error
pub fn get_poll<S: Store + ?Sized>(store: &S, poll_id: PollId) -> Result<Poll, Error> {
    store
        .get_poll(poll_id)?
        .ok_or_else(|| NotFound::Poll(poll_id).into())
}

/// All polls, ordered by close time
pub fn list_polls<S: Store + ?Sized>(store: &S) -> Result<Vec<Poll>, Error> {
    let mut polls = store.list_polls()?;
    polls.sort_by(|a, b| a.close_time.cmp(&b.close_time).then(a.id.cmp(&b.id)));
    Ok(polls)
}

/// Delete a poll together with its options, ballots and private key
pub fn delete_poll<S, V>(store: &S, vault: &V, poll_id: PollId) -> Result<(), Error>
where
    S: Store + ?Sized,
    V: KeyVault + ?Sized,
{
    if !store.delete_poll(poll_id)? {
        return Err(NotFound::Poll(poll_id).into());
    }
    vault.delete_private_key(poll_id)?;

    log::info!("deleted poll {}", poll_id);
    Ok(())
}

/// Load the poll's private key from the vault
pub fn load_private_key<V: KeyVault + ?Sized>(vault: &V, poll: &Poll) -> Result<PrivateKey, Error> {
    let bytes = vault
        .read_private_key(poll.id)?
        .ok_or(NotFound::PrivateKey(poll.id))?;
    let serialized = std::str::from_utf8(&bytes).map_err(|_| FormatError::MalformedPrivateKey)?;

    Ok(PrivateKey::deserialize(serialized, &poll.public_key)?)
}
