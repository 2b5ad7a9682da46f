use crate::{parse_id, print_json, required, CliError, Context};
use chrono::{DateTime, Duration, Utc};
use cryptopoll::*;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct PollSummary {
    pub id: PollId,
    pub title: String,
    pub close_time: DateTime<Utc>,
    pub status: PollStatus,
    pub options: usize,
}

#[derive(Serialize, Debug)]
pub struct PollView {
    #[serde(flatten)]
    pub poll: Poll,
    pub status: PollStatus,
    pub ballots: usize,
}

pub fn command_poll(matches: &clap::ArgMatches, ctx: &Context) -> Result<(), CliError> {
    let now = Utc::now();

    match matches.subcommand() {
        ("create", Some(matches)) => {
            let title = required(matches, "title")?;
            let close_time = close_time(matches.value_of("closes"), matches.value_of("open-for"), now)?;
            let options: Vec<String> = matches
                .values_of("OPTION")
                .map(|values| values.map(str::to_owned).collect())
                .unwrap_or_default();

            let poll = poll_create(ctx, title, close_time, options, now)?;
            print_json(&view(ctx, poll, now)?)
        }
        ("list", Some(_)) => print_json(&poll_list(ctx, now)?),
        ("show", Some(matches)) => {
            let poll = get_poll(&ctx.store, parse_id(matches, "POLL-ID")?)?;
            print_json(&view(ctx, poll, now)?)
        }
        ("delete", Some(matches)) => {
            let poll_id: PollId = parse_id(matches, "POLL-ID")?;
            delete_poll(&ctx.store, &ctx.vault, poll_id)?;
            print_json(&serde_json::json!({ "deleted": poll_id }))
        }
        (name, _) => Err(CliError::Argument(format!("unknown poll command \"{}\"", name))),
    }
}

/// Resolve `--closes` or `--open-for` to a close time
pub fn close_time(
    closes: Option<&str>,
    open_for: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, CliError> {
    match (closes, open_for) {
        (Some(closes), None) => DateTime::parse_from_rfc3339(closes.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| CliError::Argument(format!("--closes \"{}\": {}", closes, e))),
        (None, Some(minutes)) => {
            let minutes: i64 = minutes.trim().parse().map_err(|_| {
                CliError::Argument(format!("--open-for must be a number of minutes, got \"{}\"", minutes))
            })?;
            Ok(now + Duration::minutes(minutes))
        }
        _ => Err(CliError::Argument(
            "exactly one of --closes or --open-for is required".to_owned(),
        )),
    }
}

pub fn poll_create(
    ctx: &Context,
    title: &str,
    close_time: DateTime<Utc>,
    options: Vec<String>,
    now: DateTime<Utc>,
) -> Result<Poll, CliError> {
    let request = NewPoll {
        title: title.to_owned(),
        close_time,
        options,
    };

    let poll = create_poll(
        &ctx.store,
        &ctx.vault,
        &mut rand::thread_rng(),
        &request,
        ctx.config.key_bits,
        now,
    )?;
    Ok(poll)
}

pub fn poll_list(ctx: &Context, now: DateTime<Utc>) -> Result<Vec<PollSummary>, CliError> {
    let summaries = list_polls(&ctx.store)?
        .into_iter()
        .map(|poll| PollSummary {
            id: poll.id,
            status: poll.status(now),
            options: poll.options.len(),
            title: poll.title,
            close_time: poll.close_time,
        })
        .collect();
    Ok(summaries)
}

fn view(ctx: &Context, poll: Poll, now: DateTime<Utc>) -> Result<PollView, CliError> {
    let ballots = ctx.store.list_ballots(poll.id)?.len();
    Ok(PollView {
        status: poll.status(now),
        poll,
        ballots,
    })
}
