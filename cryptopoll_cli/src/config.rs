use crate::CliError;
use cryptopoll::{DEFAULT_MODULUS_BITS, DEFAULT_SIGNING_KEY_BITS, MIN_MODULUS_BITS, MIN_SIGNING_KEY_BITS};
use std::env::var;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub key_bits: usize,
    pub signing_key_bits: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, CliError> {
        Self::from_vars(|name| var(name).ok())
    }

    pub fn from_vars<F>(get: F) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match get("CRYPTOPOLL_DATA_DIR") {
            Some(val) => PathBuf::from(crate::expand(&val)),
            None => PathBuf::from("./cryptopoll_data"),
        };

        let key_bits = match get("CRYPTOPOLL_KEY_BITS") {
            Some(val) => parse_bits("CRYPTOPOLL_KEY_BITS", &val, MIN_MODULUS_BITS)?,
            None => DEFAULT_MODULUS_BITS,
        };

        let signing_key_bits = match get("CRYPTOPOLL_SIGNING_KEY_BITS") {
            Some(val) => parse_bits("CRYPTOPOLL_SIGNING_KEY_BITS", &val, MIN_SIGNING_KEY_BITS)?,
            None => DEFAULT_SIGNING_KEY_BITS,
        };

        Ok(Config {
            data_dir,
            key_bits,
            signing_key_bits,
        })
    }

    /// The SQLite database holding polls, voters and ballots
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.sqlite")
    }

    /// The directory holding poll private keys
    pub fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }
}

fn parse_bits(name: &str, val: &str, minimum: usize) -> Result<usize, CliError> {
    let bits: usize = val
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("{} must be an integer, got \"{}\"", name, val)))?;
    if bits < minimum {
        return Err(CliError::Config(format!(
            "{} must be at least {}, got {}",
            name, minimum, bits
        )));
    }
    Ok(bits)
}
