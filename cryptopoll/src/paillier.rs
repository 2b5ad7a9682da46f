//! Paillier additively homomorphic encryption.
//!
//! Every poll gets its own keypair. Voters encrypt indicator values under the public key, the
//! ledger holds only ciphertexts, and the tally multiplies ciphertexts together (which adds the
//! underlying plaintexts) before decrypting one aggregate per option.
//!
//! Keys use the `g = n + 1` generator, and the private key is fully described by the primes `p`
//! and `q`, which is also its serialized form (`"p:q"` in decimal).

use crate::*;
use num_bigint_dig::{BigUint, ModInverse, RandBigInt, RandPrime};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// Modulus size used when none is configured.
pub const DEFAULT_MODULUS_BITS: usize = 2048;

/// Smallest modulus accepted by key generation.
pub const MIN_MODULUS_BITS: usize = 256;

/// Parse a canonical decimal integer.
///
/// Only plain ASCII digits are accepted and leading zeros are rejected, so that the textual form
/// of a parsed value always re-serializes to exactly the same string.
pub fn parse_decimal(s: &str) -> Result<BigUint, FormatError> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if !canonical {
        return Err(FormatError::BadInteger(s.to_owned()));
    }

    BigUint::from_str(s).map_err(|_| FormatError::BadInteger(s.to_owned()))
}

/// Paillier public key
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "PublicKeyParts", into = "PublicKeyParts")]
pub struct PublicKey {
    n: BigUint,
    g: BigUint,
    n_squared: BigUint,
}

#[derive(Serialize, Deserialize)]
struct PublicKeyParts {
    #[serde(with = "crate::serde_hex::decimal")]
    n: BigUint,
    #[serde(with = "crate::serde_hex::decimal")]
    g: BigUint,
}

impl PublicKey {
    /// Build the public key for modulus `n`, using `g = n + 1`
    pub fn new(n: BigUint) -> Self {
        let g = &n + 1u32;
        let n_squared = &n * &n;
        PublicKey { n, g, n_squared }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn g(&self) -> &BigUint {
        &self.g
    }

    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    /// Size of the modulus in bits
    pub fn bits(&self) -> usize {
        self.n.bits()
    }

    /// Encrypt a plaintext with fresh randomness.
    ///
    /// Two encryptions of the same plaintext are unlinkable.
    pub fn encrypt<R: RngCore + CryptoRng>(&self, rng: &mut R, plaintext: u64) -> Ciphertext {
        self.encrypt_biguint(rng, &BigUint::from(plaintext))
    }

    /// Encrypt an arbitrary plaintext, which is reduced mod n
    pub fn encrypt_biguint<R>(&self, rng: &mut R, plaintext: &BigUint) -> Ciphertext
    where
        R: RngCore + CryptoRng,
    {
        let r = self.random_unit(rng);
        self.encrypt_with(&(plaintext % &self.n), &r)
    }

    fn encrypt_with(&self, m: &BigUint, r: &BigUint) -> Ciphertext {
        let gm = if self.g == &self.n + 1u32 {
            // (n + 1)^m = 1 + m*n (mod n^2)
            (m * &self.n + 1u32) % &self.n_squared
        } else {
            self.g.modpow(m, &self.n_squared)
        };
        let rn = r.modpow(&self.n, &self.n_squared);

        Ciphertext((gm * rn) % &self.n_squared)
    }

    // Uniform element of Z*_n
    fn random_unit<R: RngCore + CryptoRng>(&self, rng: &mut R) -> BigUint {
        loop {
            let r = rng.gen_biguint_range(&BigUint::one(), &self.n);
            if r.gcd(&self.n).is_one() {
                return r;
            }
        }
    }

    /// The trivial encryption of zero (`r = 1`), used as the identity for [`PublicKey::add`]
    pub fn zero(&self) -> Ciphertext {
        Ciphertext(BigUint::one())
    }

    /// Homomorphic addition: the result decrypts to the sum of both plaintexts
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        Ciphertext((&a.0 * &b.0) % &self.n_squared)
    }

    /// Whether the ciphertext is a member of `Z*_{n^2}` for this key
    pub fn is_valid_ciphertext(&self, c: &Ciphertext) -> bool {
        !c.0.is_zero() && c.0 < self.n_squared && c.0.gcd(&self.n).is_one()
    }
}

impl TryFrom<PublicKeyParts> for PublicKey {
    type Error = FormatError;

    fn try_from(parts: PublicKeyParts) -> Result<Self, Self::Error> {
        if parts.n <= BigUint::one() {
            return Err(FormatError::KeyMismatch);
        }
        let n_squared = &parts.n * &parts.n;
        if parts.g.is_zero() || parts.g >= n_squared {
            return Err(FormatError::KeyMismatch);
        }

        Ok(PublicKey {
            n: parts.n,
            g: parts.g,
            n_squared,
        })
    }
}

impl From<PublicKey> for PublicKeyParts {
    fn from(key: PublicKey) -> Self {
        PublicKeyParts { n: key.n, g: key.g }
    }
}

/// Paillier private key
///
/// Only `p` and `q` are meaningful; `lambda` and `mu` are derived on construction.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    public: PublicKey,
    p: BigUint,
    q: BigUint,
    lambda: BigUint,
    mu: BigUint,
}

impl PrivateKey {
    /// Rebuild a private key from its primes, checking them against the public key
    pub fn from_primes(public: &PublicKey, p: BigUint, q: BigUint) -> Result<Self, FormatError> {
        if p <= BigUint::one() || q <= BigUint::one() || p == q || &p * &q != public.n {
            return Err(FormatError::KeyMismatch);
        }

        let lambda = (&p - 1u32).lcm(&(&q - 1u32));
        let u = public.g.modpow(&lambda, &public.n_squared);
        let mu = l_function(&u, &public.n)
            .mod_inverse(&public.n)
            .and_then(|v| v.to_biguint())
            .ok_or(FormatError::KeyMismatch)?;

        Ok(PrivateKey {
            public: public.clone(),
            p,
            q,
            lambda,
            mu,
        })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    /// Decrypt a ciphertext to its plaintext residue mod n
    pub fn decrypt(&self, c: &Ciphertext) -> BigUint {
        let n = &self.public.n;
        let u = c.0.modpow(&self.lambda, &self.public.n_squared);
        (l_function(&u, n) * &self.mu) % n
    }

    /// Decrypt a ciphertext that is expected to hold a small count
    pub fn decrypt_count(&self, c: &Ciphertext) -> Result<u64, FormatError> {
        self.decrypt(c)
            .to_u64()
            .ok_or(FormatError::PlaintextOverflow)
    }

    /// Serialize as `"p:q"`
    pub fn serialize(&self) -> String {
        format!("{}:{}", self.p, self.q)
    }

    /// Inverse of [`PrivateKey::serialize`]
    pub fn deserialize(serialized: &str, public: &PublicKey) -> Result<Self, FormatError> {
        let parts: Vec<&str> = serialized.split(':').collect();
        if parts.len() != 2 {
            return Err(FormatError::MalformedPrivateKey);
        }
        let p = parse_decimal(parts[0])?;
        let q = parse_decimal(parts[1])?;

        PrivateKey::from_primes(public, p, q)
    }
}

// Never print the primes
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn l_function(u: &BigUint, n: &BigUint) -> BigUint {
    (u - 1u32) / n
}

/// A poll keypair
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a keypair with a modulus of exactly `bits` bits
    pub fn generate<R: RngCore + CryptoRng>(
        rng: &mut R,
        bits: usize,
    ) -> Result<Self, ValidationError> {
        if bits < MIN_MODULUS_BITS {
            return Err(ValidationError::KeySizeTooSmall {
                minimum: MIN_MODULUS_BITS,
                found: bits,
            });
        }

        loop {
            let p: BigUint = rng.gen_prime(bits / 2);
            let q: BigUint = rng.gen_prime(bits - bits / 2);
            if p == q {
                continue;
            }
            let n = &p * &q;
            if n.bits() != bits {
                continue;
            }

            let public = PublicKey::new(n);
            // Fails only if gcd(n, phi(n)) != 1, in which case we try again
            if let Ok(private) = PrivateKey::from_primes(&public, p, q) {
                log::debug!("generated {} bit paillier keypair", bits);
                return Ok(KeyPair { public, private });
            }
        }
    }
}

/// A Paillier ciphertext
///
/// The textual form is the decimal representation of the underlying integer, which is also what
/// the canonical ballot message embeds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ciphertext(BigUint);

impl Ciphertext {
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl From<BigUint> for Ciphertext {
    fn from(value: BigUint) -> Self {
        Ciphertext(value)
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ciphertext {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Ciphertext(parse_decimal(s)?))
    }
}

impl Serialize for Ciphertext {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        crate::serde_hex::decimal::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Ciphertext {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        crate::serde_hex::decimal::deserialize(deserializer).map(Ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keypair() -> KeyPair {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        KeyPair::generate(&mut rng, 512).unwrap()
    }

    #[test]
    fn test_keygen() {
        let keys = keypair();
        assert_eq!(keys.public.bits(), 512);
        assert_eq!(keys.private.p() * keys.private.q(), *keys.public.n());
        assert_eq!(*keys.public.g(), keys.public.n() + 1u32);

        let mut rng = ChaCha20Rng::seed_from_u64(7);
        assert_matches!(
            KeyPair::generate(&mut rng, 128),
            Err(ValidationError::KeySizeTooSmall { .. })
        );
    }

    #[test]
    fn test_homomorphic_addition() {
        let keys = keypair();
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        for (a, b) in [(0, 0), (0, 1), (1, 1), (17, 25), (u32::MAX as u64, 12345)] {
            let ca = keys.public.encrypt(&mut rng, a);
            let cb = keys.public.encrypt(&mut rng, b);
            let sum = keys.public.add(&ca, &cb);
            assert_eq!(keys.private.decrypt_count(&sum).unwrap(), a + b);
        }

        let zero = keys.public.zero();
        assert!(keys.public.is_valid_ciphertext(&zero));
        let c = keys.public.encrypt(&mut rng, 3);
        assert_eq!(keys.private.decrypt_count(&keys.public.add(&zero, &c)).unwrap(), 3);
    }

    #[test]
    fn test_large_plaintexts() {
        let keys = keypair();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let big = BigUint::one() << 64;

        let c = keys.public.encrypt_biguint(&mut rng, &big);
        assert_eq!(keys.private.decrypt(&c), big);
        assert_matches!(keys.private.decrypt_count(&c), Err(FormatError::PlaintextOverflow));

        // n - 1 acts as -1
        let minus_one = keys.public.encrypt_biguint(&mut rng, &(keys.public.n() - 1u32));
        let sum = keys.public.add(&minus_one, &keys.public.encrypt(&mut rng, 5));
        assert_eq!(keys.private.decrypt_count(&sum).unwrap(), 4);
    }

    #[test]
    fn test_encryption_is_randomized() {
        let keys = keypair();
        let mut rng = ChaCha20Rng::seed_from_u64(2);

        let first = keys.public.encrypt(&mut rng, 1);
        let second = keys.public.encrypt(&mut rng, 1);
        assert_ne!(first, second);
        assert_eq!(keys.private.decrypt_count(&first).unwrap(), 1);
        assert_eq!(keys.private.decrypt_count(&second).unwrap(), 1);
        assert!(keys.public.is_valid_ciphertext(&first));
    }

    #[test]
    fn test_private_key_round_trip() {
        let keys = keypair();

        let serialized = keys.private.serialize();
        let restored = PrivateKey::deserialize(&serialized, &keys.public).unwrap();
        assert_eq!(restored, keys.private);
        assert_eq!(restored.serialize(), serialized);
    }

    #[test]
    fn test_private_key_bad_format() {
        let keys = keypair();
        let public = &keys.public;

        assert_matches!(
            PrivateKey::deserialize("12345", public),
            Err(FormatError::MalformedPrivateKey)
        );
        assert_matches!(
            PrivateKey::deserialize("1:2:3", public),
            Err(FormatError::MalformedPrivateKey)
        );
        assert_matches!(
            PrivateKey::deserialize("abc:17", public),
            Err(FormatError::BadInteger(_))
        );
        assert_matches!(
            PrivateKey::deserialize("7:11", public),
            Err(FormatError::KeyMismatch)
        );
    }

    #[test]
    fn test_ciphertext_text_form() {
        let keys = keypair();
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        let c = keys.public.encrypt(&mut rng, 1);
        let text = c.to_string();
        assert_eq!(text.parse::<Ciphertext>().unwrap(), c);

        assert!("".parse::<Ciphertext>().is_err());
        assert!("007".parse::<Ciphertext>().is_err());
        assert!("+7".parse::<Ciphertext>().is_err());
        assert!(" 7".parse::<Ciphertext>().is_err());
    }

    #[test]
    fn test_public_key_json() {
        let keys = keypair();

        let json = serde_json::to_value(&keys.public).unwrap();
        assert_eq!(json["n"], keys.public.n().to_string());
        let restored: PublicKey = serde_json::from_value(json).unwrap();
        assert_eq!(restored, keys.public);
    }
}
