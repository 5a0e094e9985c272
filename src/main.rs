//! kowairo-ink - speak text through the local KoeiroInk and VOICEVOX engines.

use clap::{Parser, Subcommand};
use kowairo_ink::backends::{DirectSynthesisClient, ProsodyClient};
use kowairo_ink::catalog::VoiceCatalog;
use kowairo_ink::config_loader::{self, Settings};
use kowairo_ink::orchestrator::SynthesisOrchestrator;
use kowairo_ink::storage::{self, FileSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Speak text with any voice offered by the local KoeiroInk or VOICEVOX engine
#[derive(Parser)]
#[command(name = "kowairo-ink")]
#[command(version)]
#[command(about = "Synthesize speech with KoeiroInk and VOICEVOX voices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every voice label both engines offer
    Voices,

    /// Synthesize text and save it as a WAV file
    Speak {
        /// Text to speak
        text: String,
        /// Voice label, e.g. "ずんだもん(ノーマル)"
        #[arg(short, long)]
        voice: String,
        /// Output file (defaults to the configured output_path)
        #[arg(short, long, conflicts_with = "timestamp")]
        output: Option<PathBuf>,
        /// Write to a timestamped file next to the configured output_path
        #[arg(long)]
        timestamp: bool,
    },
}

fn output_path(settings: &Settings, output: Option<PathBuf>, timestamp: bool) -> PathBuf {
    let configured = PathBuf::from(&settings.output_path);
    match output {
        Some(path) => path,
        None if timestamp => {
            let dir = configured
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            storage::timestamped_path(&dir)
        }
        None => configured,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kowairo_ink=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &*config_loader::SETTINGS {
        Ok(settings) => settings.clone(),
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::builder().build()?;
    let prosody = Arc::new(ProsodyClient::from_settings(client.clone(), &settings));
    let direct = Arc::new(DirectSynthesisClient::from_settings(client, &settings));
    let catalog = Arc::new(VoiceCatalog::new());

    let (output, timestamp) = match &cli.command {
        Commands::Speak {
            output, timestamp, ..
        } => (output.clone(), *timestamp),
        Commands::Voices => (None, false),
    };
    let sink = Arc::new(FileSink::new(output_path(&settings, output, timestamp)));
    let orchestrator = SynthesisOrchestrator::new(catalog, prosody, direct, sink);

    let report = match orchestrator.refresh_catalog().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    for failure in &report.failures {
        eprintln!("Warning: {}", failure);
    }

    match cli.command {
        Commands::Voices => {
            let snapshot = orchestrator.catalog().snapshot();
            if snapshot.is_empty() {
                println!("No voices available");
            } else {
                println!("Available Voices");
                println!("────────────────");
                for label in snapshot.labels() {
                    if let Some(voice) = snapshot.get(&label) {
                        println!("  {} [{}]", label, voice.backend);
                    }
                }
            }
            if report.collisions > 0 {
                eprintln!(
                    "Warning: {} voice label(s) were offered by both engines; VOICEVOX wins",
                    report.collisions
                );
            }
        }

        Commands::Speak { text, voice, .. } => match orchestrator.speak(&voice, &text).await {
            Ok(outcome) => {
                println!("Saved {} ({} bytes)", outcome.path.display(), outcome.bytes_written);
                if let Some(wav) = outcome.wav {
                    println!(
                        "  {:.2}s, {} Hz, {} channel(s)",
                        wav.duration.as_secs_f64(),
                        wav.sample_rate,
                        wav.channels
                    );
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
