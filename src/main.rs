#![forbid(unsafe_code)]

mod config;
mod constants;
mod policy;
mod session;
mod sync;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use config::schema::bounded_hint;
use config::{Overrides, Settings};
use constants::limits::{BASE_MAX, OVERDRIVE_MAX};
use session::{EditorSession, FieldEdit};
use sync::Outcome;

/// Borderlands 2 profile editor: edit stats, commit them and patch the payload
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Profile INI file
    #[arg(long, global = true, value_name = "FILE", env = constants::env::CONFIG)]
    config: Option<PathBuf>,

    /// Payload file the transformer patches
    #[arg(long, global = true, value_name = "FILE", env = constants::env::PAYLOAD)]
    payload: Option<PathBuf>,

    /// Transformer program (default: python update_payload.py)
    #[arg(long, global = true, value_name = "PROGRAM", env = constants::env::TRANSFORMER)]
    transformer: Option<String>,

    /// Argument passed to the transformer before -c/-p (repeatable)
    #[arg(long = "transformer-arg", global = true, value_name = "ARG", allow_hyphen_values = true)]
    transformer_args: Vec<String>,

    /// Kill the transformer after this many seconds (0 waits forever)
    #[arg(long, global = true, value_name = "SECS", env = constants::env::SYNC_TIMEOUT_SECS)]
    timeout_secs: Option<u64>,

    /// Rewrite the profile file in place instead of replacing it atomically
    #[arg(long, global = true)]
    in_place: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List editable fields
    Show {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        /// Include every field, not only the known ones
        #[arg(long)]
        all: bool,
    },
    /// Print one field value
    Get { section: String, key: String },
    /// Edit fields and commit the profile (no payload update)
    Set {
        /// SECTION:KEY=VALUE
        #[arg(required = true, value_name = "SECTION:KEY=VALUE")]
        edits: Vec<FieldEdit>,
    },
    /// Normalize and rewrite the profile as it is
    Commit,
    /// Apply edits, commit the profile and update the payload
    Update {
        /// SECTION:KEY=VALUE (repeatable)
        #[arg(long = "set", value_name = "SECTION:KEY=VALUE")]
        edits: Vec<FieldEdit>,
        /// Emit the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the stat limits
    Limits,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            config_path: self.config.clone(),
            payload_path: self.payload.clone(),
            transformer: self.transformer.clone(),
            transformer_args: self.transformer_args.clone(),
            timeout_secs: self.timeout_secs,
            in_place: self.in_place,
        }
    }
}

fn init_logging() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var(constants::env::LOG_LEVEL)
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::resolve(cli.overrides());
    info!(config = %settings.config_path.display(), payload = %settings.payload_path.display(), "Resolved settings");

    match cli.command {
        Command::Limits => {
            println!("BASE_MAX = {BASE_MAX:?}");
            println!("OVERDRIVE_MAX = {OVERDRIVE_MAX:?}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { json, all } => {
            let session = EditorSession::open(settings)?;
            let fields = session.fields(all);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&fields).context("Failed to encode fields")?
                );
            } else {
                for field in &fields {
                    let marker = if field.bounded { " *" } else { "" };
                    println!("[{}] {} = {}{marker}", field.section, field.key, field.value);
                }
                if fields.iter().any(|f| f.bounded) {
                    println!();
                    for line in bounded_hint().lines() {
                        println!("* {line}");
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Get { section, key } => {
            let session = EditorSession::open(settings)?;
            match session.get(&section, &key) {
                Some(value) => {
                    println!("{value}");
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    error!(section = %section, key = %key, "Field not found");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Set { edits } => {
            let mut session = EditorSession::open(settings)?;
            session.apply(&edits)?;
            let report = session.commit()?;
            if !report.policy.is_clean() {
                for field in &report.policy.clamped {
                    println!("{field} clamped to {OVERDRIVE_MAX:?}");
                }
                for field in &report.policy.skipped {
                    println!("{field} is not a number, left unchanged");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Commit => {
            let mut session = EditorSession::open(settings)?;
            let report = session.commit()?;
            println!(
                "Committed {} section(s), {} bytes to {}",
                session.profile().section_count(),
                report.bytes_written,
                session.config_path().display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Update { edits, json } => {
            let mut session = EditorSession::open(settings)?;
            session.apply(&edits)?;
            let outcome = session.update_payload()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&outcome).context("Failed to encode outcome")?
                );
            } else {
                report_outcome(&outcome);
            }
            Ok(ExitCode::from(outcome_status(&outcome)))
        }
    }
}

/// Exit status for a sync outcome: 0 success, 1 transform failure, 2 missing payload
fn outcome_status(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Success => 0,
        Outcome::TransformFailure { .. } => 1,
        Outcome::MissingPayload { .. } => 2,
    }
}

fn report_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Success => println!("Payload updated successfully."),
        Outcome::TransformFailure { detail } => eprintln!("Payload update failed:\n{detail}"),
        Outcome::MissingPayload { path } => eprintln!("PAYLOAD not found:\n{}", path.display()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "Command failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
