use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use vigil_core::api::{
    AssessedContent, AuditQuery, CastVoteRequest, ListQuery, NewSubmission, RemoveVoteRequest,
    SubmissionContent,
};
use vigil_core::{SubmissionStatus, TargetKind, TargetRef, VigilClient, VoteValue};

/// Vigil: community review of threats, vulnerabilities, FUD and BIPs
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Command-line client for the Vigil review service", long_about = None)]
struct Cli {
    /// Base URL of the Vigil server
    #[arg(long, env = "VIGIL_URL", default_value = "http://localhost:3000", global = true)]
    url: String,

    /// Session token (required for commands that change state)
    #[arg(long, env = "VIGIL_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a submission
    Create(CreateArgs),
    /// Show a submission with its tally
    Show(TargetArgs),
    /// List submissions, newest first
    List(ListArgs),
    /// Move your draft into review
    Submit(TargetArgs),
    /// Vote on a submission
    Vote(VoteArgs),
    /// Retract your vote
    Unvote(TargetArgs),
    /// Show the current votes on a submission
    Votes(TargetArgs),
    /// Show the status change history of a submission
    Audit(AuditArgs),
}

#[derive(Parser, Debug)]
struct TargetArgs {
    /// Submission kind (threat, vulnerability, fud, bip)
    kind: TargetKind,
    /// Submission id
    id: String,
}

impl TargetArgs {
    fn target(&self) -> TargetRef {
        TargetRef::new(self.kind, self.id.clone())
    }
}

#[derive(Parser, Debug)]
struct CreateArgs {
    /// Submission kind (threat, vulnerability, fud, bip)
    #[arg(long = "type")]
    kind: TargetKind,

    #[arg(long)]
    title: String,

    /// Body text
    #[arg(long, conflicts_with = "body_file")]
    body: Option<String>,

    /// Read the body from a file
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Likelihood rating 1-5 (threats and vulnerabilities only)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    likelihood: Option<u8>,

    /// Impact rating 1-5 (threats and vulnerabilities only)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    impact: Option<u8>,

    /// Create as a draft instead of submitting straight to review
    #[arg(long)]
    draft: bool,
}

#[derive(Parser, Debug)]
struct ListArgs {
    #[arg(long = "type")]
    kind: Option<TargetKind>,

    /// draft, under_review, published or archived
    #[arg(long)]
    status: Option<SubmissionStatus>,

    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Ballot {
    /// +1
    Up,
    /// -1
    Down,
}

impl From<Ballot> for VoteValue {
    fn from(ballot: Ballot) -> Self {
        match ballot {
            Ballot::Up => VoteValue::Approve,
            Ballot::Down => VoteValue::Reject,
        }
    }
}

#[derive(Parser, Debug)]
struct VoteArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(value_enum)]
    ballot: Ballot,
}

#[derive(Parser, Debug)]
struct AuditArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(long)]
    limit: Option<usize>,
}

fn build_submission(args: CreateArgs) -> Result<NewSubmission> {
    let body = match (args.body, args.body_file) {
        (Some(body), _) => body,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read body from {}", path.display()))?,
        (None, None) => String::new(),
    };
    let status = args.draft.then_some(SubmissionStatus::Draft);

    if !args.kind.supports_risk() && (args.likelihood.is_some() || args.impact.is_some()) {
        bail!("{} submissions do not take a likelihood or impact", args.kind);
    }

    let assessed = || AssessedContent {
        title: args.title.clone(),
        body: body.clone(),
        status,
        likelihood: args.likelihood,
        impact: args.impact,
    };
    let plain = || SubmissionContent {
        title: args.title.clone(),
        body: body.clone(),
        status,
    };

    Ok(match args.kind {
        TargetKind::Threat => NewSubmission::Threat(assessed()),
        TargetKind::Vulnerability => NewSubmission::Vulnerability(assessed()),
        TargetKind::Fud => NewSubmission::Fud(plain()),
        TargetKind::Bip => NewSubmission::Bip(plain()),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to format response")?
    );
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let client = VigilClient::new(cli.url, cli.token)?;

    match cli.command {
        Commands::Create(args) => print_json(&client.create_submission(&build_submission(args)?)?),
        Commands::Show(args) => print_json(&client.get_submission(&args.target())?),
        Commands::List(args) => print_json(&client.list_submissions(&ListQuery {
            target_type: args.kind,
            status: args.status,
            limit: args.limit,
        })?),
        Commands::Submit(args) => print_json(&client.submit_for_review(&args.target())?),
        Commands::Vote(args) => print_json(&client.cast_vote(&CastVoteRequest {
            target_type: args.target.kind,
            target_id: args.target.id,
            vote_value: args.ballot.into(),
        })?),
        Commands::Unvote(args) => print_json(&client.remove_vote(&RemoveVoteRequest {
            target_type: args.kind,
            target_id: args.id,
        })?),
        Commands::Votes(args) => print_json(&client.list_votes(&args.target())?),
        Commands::Audit(args) => print_json(&client.audit_log(
            &args.target.target(),
            &AuditQuery { limit: args.limit },
        )?),
    }
}

fn main() -> Result<()> {
    run(Cli::parse())
}
