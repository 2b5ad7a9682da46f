use crate::command_voter::VoterCredentials;
use crate::{expand, parse_id, print_json, required, CliError, Context};
use chrono::Utc;
use cryptopoll::*;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct CastOutput {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub result: Ack,
}

#[derive(Serialize, Debug)]
pub struct ChoiceOutput {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub option_id: OptionId,
    pub text: String,
}

pub fn command_vote(matches: &clap::ArgMatches, ctx: &Context) -> Result<(), CliError> {
    match matches.subcommand() {
        ("cast", Some(matches)) => {
            let credentials = VoterCredentials::read(expand(required(matches, "key")?))?;
            let output = vote_cast(
                ctx,
                parse_id(matches, "POLL-ID")?,
                required(matches, "OPTION")?,
                &credentials,
            )?;
            print_json(&output)
        }
        ("show", Some(matches)) => {
            let output = vote_show(ctx, parse_id(matches, "POLL-ID")?, parse_id(matches, "VOTER-ID")?)?;
            print_json(&output)
        }
        (name, _) => Err(CliError::Argument(format!("unknown vote command \"{}\"", name))),
    }
}

/// Find an option by ID, or failing that by its exact text
pub fn resolve_option(poll: &Poll, option: &str) -> Result<OptionId, CliError> {
    let option = option.trim();

    if let Ok(option_id) = option.parse::<OptionId>() {
        if poll.get_option(option_id).is_some() {
            return Ok(option_id);
        }
    }

    poll.options
        .iter()
        .find(|o| o.text == option)
        .map(|o| o.id)
        .ok_or_else(|| CliError::Argument(format!("\"{}\" is not an option of poll {}", option, poll.id)))
}

pub fn vote_cast(
    ctx: &Context,
    poll_id: PollId,
    option: &str,
    credentials: &VoterCredentials,
) -> Result<CastOutput, CliError> {
    let poll = get_poll(&ctx.store, poll_id)?;
    let option_id = resolve_option(&poll, option)?;
    let signing_key = credentials.signing_key()?;

    let result = cast_ballot(
        &ctx.store,
        &mut rand::thread_rng(),
        poll.id,
        credentials.voter_id,
        option_id,
        &signing_key,
        Utc::now(),
    )?;

    Ok(CastOutput {
        poll_id: poll.id,
        voter_id: credentials.voter_id,
        result,
    })
}

/// Decrypt a voter's live ballot with the poll's private key
pub fn vote_show(ctx: &Context, poll_id: PollId, voter_id: VoterId) -> Result<ChoiceOutput, CliError> {
    let poll = get_poll(&ctx.store, poll_id)?;
    let ballot = get_ballot(&ctx.store, poll.id, voter_id)?;
    let private_key = load_private_key(&ctx.vault, &poll)?;

    let option = ballot
        .decode_choice(&poll.options, &private_key)
        .and_then(|option_id| poll.get_option(option_id))
        .ok_or_else(|| CliError::Argument(format!("ballot from voter {} is not a single choice", voter_id)))?;

    Ok(ChoiceOutput {
        poll_id: poll.id,
        voter_id,
        option_id: option.id,
        text: option.text.clone(),
    })
}
