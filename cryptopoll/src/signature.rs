use crate::*;
use rand::{CryptoRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Signing key size used when none is configured.
pub const DEFAULT_SIGNING_KEY_BITS: usize = 2048;

/// Smallest RSA modulus accepted for voter signing keys.
pub const MIN_SIGNING_KEY_BITS: usize = 512;

/// Build the canonical message a ballot signature covers.
///
/// The message binds the poll, the voter and every ciphertext (in positional order, decimal form).
/// Both signing and verification go through this function and nothing else.
pub fn canonical_message(poll_id: PollId, voter_id: VoterId, ciphertexts: &[Ciphertext]) -> String {
    let mut message = format!("poll:{};user:{};choices:", poll_id, voter_id);
    for (i, c) in ciphertexts.iter().enumerate() {
        if i > 0 {
            message.push(',');
        }
        // Writing to a String cannot fail
        let _ = write!(message, "{}", c);
    }
    message
}

/// A voter's private signing key
///
/// This is handed to the voter at registration and never persisted server-side.
#[derive(Clone, Debug)]
pub struct SigningKey(RsaPrivateKey);

impl SigningKey {
    /// Generate a new signing key
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<Self, Error> {
        if bits < MIN_SIGNING_KEY_BITS {
            return Err(ValidationError::KeySizeTooSmall {
                minimum: MIN_SIGNING_KEY_BITS,
                found: bits,
            }
            .into());
        }

        Ok(SigningKey(RsaPrivateKey::new(rng, bits)?))
    }

    /// The matching public key
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.to_public_key())
    }

    /// Hash the message with SHA-256 and sign the digest (PKCS#1 v1.5)
    pub fn sign(&self, message: &str) -> Result<Vec<u8>, Error> {
        let digest = Sha256::digest(message.as_bytes());
        Ok(self.0.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?)
    }

    /// Hex encoded PKCS#1 DER
    pub fn to_hex(&self) -> Result<String, Error> {
        let der = self.0.to_pkcs1_der().map_err(|_| FormatError::BadSigningKey)?;
        Ok(hex::encode(der.as_bytes()))
    }

    pub fn from_hex(s: &str) -> Result<Self, FormatError> {
        let bytes = hex::decode(s.trim())?;
        RsaPrivateKey::from_pkcs1_der(&bytes)
            .map(SigningKey)
            .map_err(|_| FormatError::BadSigningKey)
    }
}

/// A voter's registered public signing key
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VerifyingKey(#[serde(with = "crate::serde_hex::rsa_public_key_hex")] RsaPublicKey);

impl VerifyingKey {
    /// Verify a signature over `message`.
    ///
    /// Malformed signature bytes are a verification failure, never an error.
    pub fn verify(&self, message: &str, signature: &[u8]) -> bool {
        let digest = Sha256::digest(message.as_bytes());
        self.0
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .is_ok()
    }

    /// Length in bytes of every signature this key can verify
    pub fn signature_len(&self) -> usize {
        self.0.size()
    }

    /// Hex encoded PKCS#1 DER
    pub fn to_hex(&self) -> Result<String, Error> {
        let der = self.0.to_pkcs1_der().map_err(|_| FormatError::BadSigningKey)?;
        Ok(hex::encode(der.as_bytes()))
    }

    pub fn from_hex(s: &str) -> Result<Self, FormatError> {
        let bytes = hex::decode(s.trim())?;
        RsaPublicKey::from_pkcs1_der(&bytes)
            .map(VerifyingKey)
            .map_err(|_| FormatError::BadSigningKey)
    }
}

impl From<RsaPublicKey> for VerifyingKey {
    fn from(key: RsaPublicKey) -> Self {
        VerifyingKey(key)
    }
}

/// Verify a hex encoded signature against a hex encoded public key.
///
/// For callers holding only the textual forms; anything that fails to decode is simply invalid.
pub fn verify_hex(message: &str, signature_hex: &str, public_key_hex: &str) -> bool {
    let key = match VerifyingKey::from_hex(public_key_hex) {
        Ok(key) => key,
        Err(_) => return false,
    };
    match hex::decode(signature_hex) {
        Ok(signature) => key.verify(message, &signature),
        Err(_) => false,
    }
}
