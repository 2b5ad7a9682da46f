// Textual encodings for values that cross serialization boundaries.
//
// Big integers travel as decimal strings and binary values (keys, signatures) as hex, so that
// they survive form fields, JSON and TEXT columns without loss.

/// Decimal string encoding for `BigUint`, for use in `#[serde(with)]`
pub mod decimal {
    use num_bigint_dig::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        crate::parse_decimal(&s).map_err(de::Error::custom)
    }
}

/// Hex encoded PKCS#1 DER for RSA public keys, for use in `#[serde(with)]`
pub mod rsa_public_key_hex {
    use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
    use rsa::RsaPublicKey;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(public_key: &RsaPublicKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let der = public_key.to_pkcs1_der().map_err(ser::Error::custom)?;
        serializer.serialize_str(&hex::encode(der.as_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RsaPublicKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(de::Error::custom)?;
        RsaPublicKey::from_pkcs1_der(&bytes).map_err(de::Error::custom)
    }
}

/// Decimal string encoding for the values of a `BigUint` map, for use in `#[serde(with)]`
pub mod decimal_values {
    use indexmap::IndexMap;
    use num_bigint_dig::BigUint;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::hash::Hash;

    pub fn serialize<K, S>(map: &IndexMap<K, BigUint>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (k, v.to_string())))
    }

    pub fn deserialize<'de, K, D>(deserializer: D) -> Result<IndexMap<K, BigUint>, D::Error>
    where
        K: Deserialize<'de> + Eq + Hash,
        D: Deserializer<'de>,
    {
        IndexMap::<K, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                crate::parse_decimal(&v)
                    .map(|v| (k, v))
                    .map_err(de::Error::custom)
            })
            .collect()
    }
}
