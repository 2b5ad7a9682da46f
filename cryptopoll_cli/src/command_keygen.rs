use crate::{print_json, CliError, Config};
use cryptopoll::{KeyPair, PublicKey};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct KeygenOutput {
    pub public_key: PublicKey,
    pub private_key: String,
}

pub fn command_keygen(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let bits = match matches.value_of("bits") {
        Some(bits) => bits
            .parse()
            .map_err(|_| CliError::Argument(format!("--bits must be an integer, got \"{}\"", bits)))?,
        None => config.key_bits,
    };

    print_json(&keygen(bits)?)
}

pub fn keygen(bits: usize) -> Result<KeygenOutput, CliError> {
    let KeyPair { public, private } = KeyPair::generate(&mut rand::thread_rng(), bits)?;

    Ok(KeygenOutput {
        public_key: public,
        private_key: private.serialize(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptopoll::PrivateKey;

    #[test]
    fn test_keygen() {
        let output = keygen(512).unwrap();
        let private = PrivateKey::deserialize(&output.private_key, &output.public_key).unwrap();
        assert_eq!(private.public(), &output.public_key);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["public_key"]["n"], output.public_key.n().to_string());

        assert!(keygen(64).is_err());
    }
}
