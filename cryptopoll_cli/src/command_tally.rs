use crate::{parse_id, print_json, CliError, Context};
use chrono::{DateTime, Utc};
use cryptopoll::*;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct OptionCount {
    pub option_id: OptionId,
    pub text: String,
    /// Decimal, since a stuffed ballot can push a count past any fixed width
    pub count: String,
}

#[derive(Serialize, Debug)]
pub struct TallyOutput {
    pub poll_id: PollId,
    pub title: String,
    pub status: PollStatus,
    pub results: Vec<OptionCount>,
    pub counted: usize,
    pub excluded: Vec<Exclusion>,
}

pub fn command_tally(matches: &clap::ArgMatches, ctx: &Context) -> Result<(), CliError> {
    let output = tally_poll(ctx, parse_id(matches, "POLL-ID")?, Utc::now())?;
    print_json(&output)
}

pub fn tally_poll(ctx: &Context, poll_id: PollId, now: DateTime<Utc>) -> Result<TallyOutput, CliError> {
    let poll = get_poll(&ctx.store, poll_id)?;
    let status = poll.status(now);
    if status == PollStatus::Open {
        log::warn!("poll {} is still open, results may change", poll.id);
    }

    let result = tally(&ctx.store, &ctx.vault, poll.id)?;

    let results = poll
        .options
        .into_iter()
        .map(|option| OptionCount {
            count: result.count(option.id).to_string(),
            option_id: option.id,
            text: option.text,
        })
        .collect();

    Ok(TallyOutput {
        poll_id: poll.id,
        title: poll.title,
        status,
        results,
        counted: result.counted,
        excluded: result.excluded,
    })
}
