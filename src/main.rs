//! fretscribe - guitar notation from transcribed MIDI
//!
//! Subcommands:
//! - `fretscribe convert <midi>` - Render MusicXML without touching the data directory
//! - `fretscribe ingest <midi>` - Store a MIDI file and render its notation
//! - `fretscribe transpose <id> <n>` - Render a stored request shifted by n semitones
//! - `fretscribe show <id>` - Print a stored request and its artifacts
//! - `fretscribe health` - Report backend and database status
//! - `fretscribe config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use fretscribe_lib::events::UnavailableOracle;
use fretscribe_lib::service::ErrorResponse;
use fretscribe_lib::{process_midi, FretscribeConfig, Transcriber};

#[derive(Parser)]
#[command(name = "fretscribe")]
#[command(about = "Dual-staff guitar notation and tablature from MIDI")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a MIDI file to MusicXML (stateless)
    Convert {
        /// Standard MIDI file
        midi: PathBuf,

        /// Transpose by this many semitones
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        transpose: i32,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store a MIDI file and render its notation
    Ingest {
        /// Standard MIDI file
        midi: PathBuf,
    },

    /// Render a stored request at a transposition
    Transpose {
        /// Request id printed by `ingest`
        id: Uuid,

        /// Semitones, may be negative
        #[arg(allow_hyphen_values = true)]
        semitones: i32,
    },

    /// Print a stored request and its artifacts
    Show {
        /// Request id printed by `ingest`
        id: Uuid,
    },

    /// Report backend and database status
    Health,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let body = ErrorResponse::from(format!("{:#}", e));
            match serde_json::to_string(&body) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", body.message),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = FretscribeConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    match cli.command {
        Commands::Convert {
            midi,
            transpose,
            output,
        } => {
            let bytes = tokio::fs::read(&midi)
                .await
                .with_context(|| format!("reading {}", midi.display()))?;
            let settings = config.pipeline_settings()?;
            let rendered = process_midi(&bytes, transpose, &settings)?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, rendered.xml.as_bytes())
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    log::info!("Wrote {}", path.display());
                }
                None => println!("{}", rendered.xml),
            }
        }
        Commands::Ingest { midi } => {
            let bytes = tokio::fs::read(&midi)
                .await
                .with_context(|| format!("reading {}", midi.display()))?;
            let service = Transcriber::open(&config, Box::new(UnavailableOracle))?;
            print_json(&service.ingest_midi(bytes).await?)?;
        }
        Commands::Transpose { id, semitones } => {
            let service = Transcriber::open(&config, Box::new(UnavailableOracle))?;
            print_json(&service.transpose(id, semitones).await?)?;
        }
        Commands::Show { id } => {
            let service = Transcriber::open(&config, Box::new(UnavailableOracle))?;
            print_json(&service.describe(&id)?)?;
        }
        Commands::Health => {
            let service = Transcriber::open(&config, Box::new(UnavailableOracle))?;
            print_json(&service.health().await)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
