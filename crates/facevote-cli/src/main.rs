use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facevote_core::{Choice, Region};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;
use engine::{spawn_engine, EngineHandle, Station};

#[derive(Parser)]
#[command(name = "facevote", version, about = "Face-gated voting station")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a 12-digit identifier against the face in a capture
    Register {
        /// Voter identifier (exactly 12 digits)
        #[arg(long)]
        id: String,
        /// Capture image (PNG, JPEG, ...)
        #[arg(short, long)]
        image: PathBuf,
        /// Face rectangle as x,y,w,h (default: the whole frame)
        #[arg(long)]
        region: Option<Region>,
        /// Also write the registered face crop to this path
        #[arg(long)]
        save_crop: Option<PathBuf>,
    },
    /// Recognise a registered voter and cast their ballot
    Vote {
        /// Capture image (PNG, JPEG, ...)
        #[arg(short, long)]
        image: PathBuf,
        /// Ballot choice by name or list position; prompts when omitted
        #[arg(short, long)]
        choice: Option<String>,
        /// Face rectangle as x,y,w,h (default: the whole frame)
        #[arg(long)]
        region: Option<Region>,
    },
    /// Show station status as JSON
    Status,
    /// List registered identifiers (masked)
    List,
    /// Show the ballot count per choice
    Results,
    /// List the configured ballot choices
    Choices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    if let Some(path) = &config.config_file {
        tracing::debug!(path = %path.display(), "config file applied");
    }

    match cli.command {
        Commands::Register {
            id,
            image,
            region,
            save_crop,
        } => {
            let frame = facevote_capture::load_frame(&image)
                .with_context(|| format!("failed to load capture {}", image.display()))?;
            let engine = start_engine(&config)?;
            let registered = engine.register(id, frame.clone(), region).await?;
            println!("Registered {}", registered.identifier.masked());

            if let Some(path) = save_crop {
                facevote_capture::save_region(&frame, &registered.region, &path)
                    .with_context(|| format!("failed to write face crop {}", path.display()))?;
                println!("Face crop written to {}", path.display());
            }
        }
        Commands::Vote {
            image,
            choice,
            region,
        } => {
            let frame = facevote_capture::load_frame(&image)
                .with_context(|| format!("failed to load capture {}", image.display()))?;
            let engine = start_engine(&config)?;
            let voter = engine.identify(frame, region).await?;
            println!("Recognised {}", voter.identifier().masked());

            let choice = match choice {
                Some(input) => match config.resolve_choice(&input) {
                    Some(c) => c,
                    None => bail!("{input:?} is not on the ballot (see `facevote choices`)"),
                },
                None => prompt_choice(&config).await?,
            };

            let outcome = engine.cast(voter, choice).await?;
            println!();
            print!("{}", outcome.receipt.to_text());
            println!();
            println!("Receipt saved to {}", outcome.handle.location);
        }
        Commands::Status => {
            let status = start_engine(&config)?.status().await?;
            let report = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "data_dir": config.data_dir.display().to_string(),
                "backend": config.store_backend.to_string(),
                "registrations": status.registrations,
                "distinct_identities": status.distinct_identities,
                "ballots": status.ballots,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::List => {
            let identifiers = start_engine(&config)?.list().await?;
            if identifiers.is_empty() {
                println!("No voters registered");
            }
            for identifier in identifiers {
                println!("{}", identifier.masked());
            }
        }
        Commands::Results => {
            let tally = start_engine(&config)?.results().await?;
            for (choice, count) in results_table(&config.choices, &tally) {
                println!("{choice:<12} {count}");
            }
            println!("{:<12} {}", "TOTAL", tally.values().sum::<usize>());
        }
        Commands::Choices => print_choices(&config),
    }

    Ok(())
}

fn start_engine(config: &Config) -> Result<EngineHandle> {
    let station = Station::open(config).with_context(|| {
        format!("failed to open station data in {}", config.data_dir.display())
    })?;
    Ok(spawn_engine(station)?)
}

fn print_choices(config: &Config) {
    for (i, choice) in config.choices.iter().enumerate() {
        let note = if choice.is_abstention() { "  (abstain)" } else { "" };
        println!("{:>2}. {choice}{note}", i + 1);
    }
}

/// Ask on stdin until the voter picks a configured choice.
async fn prompt_choice(config: &Config) -> Result<Choice> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_choices(config);
        println!("Enter your choice:");
        let Some(line) = lines.next_line().await? else {
            bail!("no choice entered; ballot not cast");
        };
        match config.resolve_choice(&line) {
            Some(choice) => return Ok(choice),
            None => println!("{:?} is not on the ballot", line.trim()),
        }
    }
}

/// Configured choices in ballot order (zero counts included), followed by
/// any other choice found in the ledger.
fn results_table(
    choices: &[Choice],
    tally: &std::collections::BTreeMap<Choice, usize>,
) -> Vec<(Choice, usize)> {
    let mut rows: Vec<(Choice, usize)> = choices
        .iter()
        .map(|c| (c.clone(), tally.get(c).copied().unwrap_or(0)))
        .collect();
    rows.extend(
        tally
            .iter()
            .filter(|(c, _)| !choices.contains(*c))
            .map(|(c, n)| (c.clone(), *n)),
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_cli_parses_vote() {
        let cli = Cli::try_parse_from([
            "facevote", "vote", "--image", "face.png", "--choice", "NOTA", "--region", "1,2,30,40",
        ])
        .unwrap();
        match cli.command {
            Commands::Vote { choice, region, .. } => {
                assert_eq!(choice.as_deref(), Some("NOTA"));
                assert_eq!(region, Some(Region::new(1, 2, 30, 40)));
            }
            _ => panic!("expected vote"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_region() {
        assert!(Cli::try_parse_from([
            "facevote", "register", "--id", "123456789012", "--image", "f.png", "--region", "1,2",
        ])
        .is_err());
    }

    #[test]
    fn test_results_table_orders_by_ballot() {
        let choices = vec![Choice::new("BJP"), Choice::new("CONGRESS"), Choice::new("NOTA")];
        let mut tally = BTreeMap::new();
        tally.insert(Choice::new("NOTA"), 2);
        tally.insert(Choice::new("Write-in"), 1);

        let rows = results_table(&choices, &tally);
        let names: Vec<(&str, usize)> = rows.iter().map(|(c, n)| (c.as_str(), *n)).collect();
        assert_eq!(
            names,
            [("BJP", 0), ("CONGRESS", 0), ("NOTA", 2), ("Write-in", 1)]
        );
    }
}
