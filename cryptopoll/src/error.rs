use crate::*;

use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("cryptopoll: {0}")]
    Validation(#[from] ValidationError),

    #[error("cryptopoll: {0}")]
    Format(#[from] FormatError),

    #[error("cryptopoll: {0}")]
    NotFound(#[from] NotFound),

    #[error("cryptopoll: RSA error: {0}")]
    RSAError(#[from] rsa::Error),

    #[error("cryptopoll: store error: {0}")]
    Store(String),

    #[error("cryptopoll: io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request validation errors
///
/// These are raised before any cryptographic work is done and should be surfaced to the caller
/// as a rejection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cryptopoll validation: a poll needs at least 2 options, found {0}")]
    TooFewOptions(usize),

    #[error("cryptopoll validation: poll title is empty")]
    EmptyTitle,

    #[error("cryptopoll validation: option text is empty")]
    EmptyOptionText,

    #[error("cryptopoll validation: duplicate option \"{0}\"")]
    DuplicateOption(String),

    #[error("cryptopoll validation: close time is not in the future")]
    CloseTimeInPast,

    #[error("cryptopoll validation: option {0} is not part of this poll")]
    InvalidChoice(OptionId),

    #[error("cryptopoll validation: poll {0} is closed")]
    PollClosed(PollId),

    #[error("cryptopoll validation: expected {expected} ciphertexts, found {found}")]
    VectorLengthMismatch { expected: usize, found: usize },

    #[error("cryptopoll validation: ciphertext at position {0} is out of range for the poll key")]
    CiphertextOutOfRange(usize),

    #[error("cryptopoll validation: key size of {found} bits is below the minimum of {minimum}")]
    KeySizeTooSmall { minimum: usize, found: usize },
}

/// Malformed serialized values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("cryptopoll format: private key must be two integers separated by ':'")]
    MalformedPrivateKey,

    #[error("cryptopoll format: invalid decimal integer \"{0}\"")]
    BadInteger(String),

    #[error("cryptopoll format: invalid hexidecimal")]
    BadHex,

    #[error("cryptopoll format: invalid signing key encoding")]
    BadSigningKey,

    #[error("cryptopoll format: private key does not match public key")]
    KeyMismatch,

    #[error("cryptopoll format: decrypted value does not fit in a 64-bit count")]
    PlaintextOverflow,
}

/// A requested entity is absent from the store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotFound {
    #[error("cryptopoll: poll {0} not found")]
    Poll(PollId),

    #[error("cryptopoll: voter {0} not found")]
    Voter(VoterId),

    #[error("cryptopoll: private key for poll {0} not found")]
    PrivateKey(PollId),

    #[error("cryptopoll: no ballot from voter {1} in poll {0}")]
    Ballot(PollId, VoterId),
}

impl From<hex::FromHexError> for FormatError {
    fn from(_: hex::FromHexError) -> Self {
        FormatError::BadHex
    }
}
