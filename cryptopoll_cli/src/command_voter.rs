use crate::{expand, parse_id, print_json, required, CliError, Context};
use cryptopoll::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// What a voter keeps: their ID and hex encoded signing key
#[derive(Serialize, Deserialize, Debug)]
pub struct VoterCredentials {
    pub voter_id: VoterId,
    pub signing_key: String,
}

impl VoterCredentials {
    pub fn signing_key(&self) -> Result<SigningKey, CliError> {
        Ok(SigningKey::from_hex(&self.signing_key)?)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write the credentials to a new file, readable only by the owner on unix
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        let json = serde_json::to_vec_pretty(self)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path.as_ref())?;
        file.write_all(&json)?;
        Ok(())
    }
}

pub fn command_voter(matches: &clap::ArgMatches, ctx: &Context) -> Result<(), CliError> {
    match matches.subcommand() {
        ("register", Some(matches)) => {
            let key_out = expand(required(matches, "key-out")?);
            let voter = voter_register(ctx, &key_out)?;
            print_json(&voter)
        }
        ("show", Some(matches)) => {
            let voter = get_voter(&ctx.store, parse_id(matches, "VOTER-ID")?)?;
            print_json(&voter)
        }
        (name, _) => Err(CliError::Argument(format!("unknown voter command \"{}\"", name))),
    }
}

/// Register a voter and write their credentials to `key_out`.
///
/// An existing file is never overwritten.
pub fn voter_register(ctx: &Context, key_out: &str) -> Result<VoterIdentity, CliError> {
    if Path::new(key_out).exists() {
        return Err(CliError::Argument(format!("{} already exists", key_out)));
    }

    let (voter, signing_key) = register_voter(
        &ctx.store,
        &mut rand::thread_rng(),
        ctx.config.signing_key_bits,
    )?;

    let credentials = VoterCredentials {
        voter_id: voter.id,
        signing_key: signing_key.to_hex()?,
    };
    credentials.write(key_out)?;

    log::info!("wrote credentials for voter {} to {}", voter.id, key_out);
    Ok(voter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::context;
    use assert_matches::assert_matches;

    #[test]
    fn test_voter_register() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let key_out = dir.path().join("alice.json");
        let key_out = key_out.to_str().unwrap();

        let voter = voter_register(&ctx, key_out).unwrap();
        assert_eq!(get_voter(&ctx.store, voter.id).unwrap(), voter);

        let credentials = VoterCredentials::read(key_out).unwrap();
        assert_eq!(credentials.voter_id, voter.id);
        assert_eq!(
            credentials.signing_key().unwrap().verifying_key(),
            voter.signature_public_key
        );

        // Never clobber existing credentials
        assert_matches!(voter_register(&ctx, key_out), Err(CliError::Argument(_)));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(key_out).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
