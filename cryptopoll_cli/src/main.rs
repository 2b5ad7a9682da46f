use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use cryptopoll::FileKeyVault;
use log::LevelFilter;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

mod command_keygen;
mod command_poll;
mod command_tally;
mod command_vote;
mod command_voter;
mod config;
mod sqlite_store;

use command_keygen::*;
use command_poll::*;
use command_tally::*;
use command_vote::*;
use command_voter::*;
pub use config::Config;
pub use sqlite_store::SqliteStore;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Poll(#[from] cryptopoll::Error),

    #[error("cryptopoll: configuration error: {0}")]
    Config(String),

    #[error("cryptopoll: invalid argument: {0}")]
    Argument(String),

    #[error("cryptopoll: io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cryptopoll: json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<cryptopoll::ValidationError> for CliError {
    fn from(e: cryptopoll::ValidationError) -> Self {
        CliError::Poll(e.into())
    }
}

impl From<cryptopoll::FormatError> for CliError {
    fn from(e: cryptopoll::FormatError) -> Self {
        CliError::Poll(e.into())
    }
}

impl From<cryptopoll::NotFound> for CliError {
    fn from(e: cryptopoll::NotFound) -> Self {
        CliError::Poll(e.into())
    }
}

/// Everything a command needs: configuration plus the opened store and key vault
pub struct Context {
    pub config: Config,
    pub store: SqliteStore,
    pub vault: FileKeyVault,
}

impl Context {
    pub fn open(config: Config) -> Result<Self, CliError> {
        let store = SqliteStore::open(config.store_path())?;
        let vault = FileKeyVault::open(config.keys_dir())?;
        Ok(Context {
            config,
            store,
            vault,
        })
    }
}

fn main() {
    let poll_id_arg = Arg::with_name("POLL-ID")
        .index(1)
        .required(true)
        .help("Poll ID");

    let matches = App::new("CryptoPoll CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Runs private polls with homomorphically tallied ballots")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .takes_value(true)
                .help("Data directory - can also be set with CRYPTOPOLL_DATA_DIR"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate and print a poll keypair")
                .arg(
                    Arg::with_name("bits")
                        .long("bits")
                        .takes_value(true)
                        .help("Modulus size - defaults to CRYPTOPOLL_KEY_BITS"),
                ),
        )
        .subcommand(
            SubCommand::with_name("poll")
                .about("Create, inspect and delete polls")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("create")
                        .about("Create a poll")
                        .arg(
                            Arg::with_name("title")
                                .long("title")
                                .takes_value(true)
                                .required(true)
                                .help("Poll title"),
                        )
                        .arg(
                            Arg::with_name("closes")
                                .long("closes")
                                .takes_value(true)
                                .conflicts_with("open-for")
                                .help("Close time in RFC 3339 format"),
                        )
                        .arg(
                            Arg::with_name("open-for")
                                .long("open-for")
                                .takes_value(true)
                                .help("Close the poll this many minutes from now"),
                        )
                        .arg(
                            Arg::with_name("OPTION")
                                .index(1)
                                .multiple(true)
                                .required(true)
                                .help("Option texts, in ballot order"),
                        ),
                )
                .subcommand(SubCommand::with_name("list").about("List polls"))
                .subcommand(
                    SubCommand::with_name("show")
                        .about("Show a poll and its status")
                        .arg(poll_id_arg.clone()),
                )
                .subcommand(
                    SubCommand::with_name("delete")
                        .about("Delete a poll with its ballots and private key")
                        .arg(poll_id_arg.clone()),
                ),
        )
        .subcommand(
            SubCommand::with_name("voter")
                .about("Manage voters")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("register")
                        .about("Register a voter and write their signing key to a file")
                        .arg(
                            Arg::with_name("key-out")
                                .long("key-out")
                                .takes_value(true)
                                .required(true)
                                .help("File to write the voter's credentials to"),
                        ),
                )
                .subcommand(
                    SubCommand::with_name("show")
                        .about("Show a registered voter")
                        .arg(
                            Arg::with_name("VOTER-ID")
                                .index(1)
                                .required(true)
                                .help("Voter ID"),
                        ),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Cast and inspect ballots")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("cast")
                        .about("Encrypt, sign and submit a ballot, replacing any earlier one")
                        .arg(poll_id_arg.clone())
                        .arg(
                            Arg::with_name("OPTION")
                                .index(2)
                                .required(true)
                                .help("Option ID or exact option text"),
                        )
                        .arg(
                            Arg::with_name("key")
                                .long("key")
                                .takes_value(true)
                                .required(true)
                                .help("Voter credentials file written by `voter register`"),
                        ),
                )
                .subcommand(
                    SubCommand::with_name("show")
                        .about("Decrypt a voter's current ballot in a poll")
                        .arg(poll_id_arg.clone())
                        .arg(
                            Arg::with_name("VOTER-ID")
                                .index(2)
                                .required(true)
                                .help("Voter ID"),
                        ),
                ),
        )
        .subcommand(
            SubCommand::with_name("tally")
                .about("Tally a poll")
                .arg(poll_id_arg),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();

    if let Err(e) = run(&matches) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), CliError> {
    let mut config = Config::from_env()?;
    if let Some(data_dir) = matches.value_of("data-dir") {
        config.data_dir = expand(data_dir).into();
    }
    log::debug!("using data directory {}", config.data_dir.display());

    // keygen touches neither the store nor the vault
    if let Some(matches) = matches.subcommand_matches("keygen") {
        return command_keygen(matches, &config);
    }

    let ctx = Context::open(config)?;
    match matches.subcommand() {
        ("poll", Some(matches)) => command_poll(matches, &ctx),
        ("voter", Some(matches)) => command_voter(matches, &ctx),
        ("vote", Some(matches)) => command_vote(matches, &ctx),
        ("tally", Some(matches)) => command_tally(matches, &ctx),
        (name, _) => Err(CliError::Argument(format!("unknown command \"{}\"", name))),
    }
}

/// Expand `~` and environment variables in a user supplied path
pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => input.to_owned(),
    }
}

/// Get a required argument
pub fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, CliError> {
    matches
        .value_of(name)
        .ok_or_else(|| CliError::Argument(format!("{} is required", name)))
}

/// Parse a required ID argument
pub fn parse_id<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, CliError> {
    let value = required(matches, name)?;
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Argument(format!("{} \"{}\" is not a valid ID", name, value)))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
