//! `biocapture`: runs a guided liveness scan and prints the capture as JSON.
//!
//! Usage:
//!   biocapture scan --replay frames.jsonl        # scan a recorded landmark stream
//!   biocapture demo -o capture.json              # scan the built-in synthetic face
//!   biocapture config                            # effective configuration
//!
//! Progress and prompts go to stderr; the capture goes to stdout or `--output`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use biocapture_core::{synthetic, BiometricCapture, VerificationKind};
use biocapture_session::{ScanController, ScanEvent, ScanMode, SessionConfig, SessionError};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod replay;

#[derive(Parser, Debug)]
#[command(name = "biocapture")]
#[command(version, about = "Guided face and ear liveness capture", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a recorded landmark stream
    Scan {
        /// JSON Lines file with one point set (or null) per frame
        #[arg(long)]
        replay: PathBuf,

        /// registration or verification
        #[arg(long, default_value = "verification")]
        mode: ScanMode,

        /// face, ear or both
        #[arg(long, default_value = "both")]
        kind: VerificationKind,

        /// Replay frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scan a synthetic face that performs every step
    Demo {
        /// face, ear or both
        #[arg(long, default_value = "both")]
        kind: VerificationKind,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::from_env();

    match cli.command {
        Command::Scan {
            replay,
            mode,
            kind,
            fps,
            output,
        } => {
            let script = replay::load(&replay)?;
            tracing::info!(path = %replay.display(), frames = script.len(), fps, "replaying landmarks");
            let capture = scan(config, script, fps, mode, kind).await?;
            write_capture(&capture, output)
        }
        Command::Demo { kind, output } => {
            let script = Arc::new(synthetic::guided_sequence());
            let capture = scan(config, script, 15, ScanMode::Registration, kind).await?;
            write_capture(&capture, output)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.to_json())?);
            Ok(())
        }
    }
}

async fn scan(
    config: SessionConfig,
    script: replay::Script,
    fps: u32,
    mode: ScanMode,
    kind: VerificationKind,
) -> Result<BiometricCapture> {
    let controller = ScanController::new(
        config,
        Arc::new(replay::ReplayCamera::new(fps)),
        Arc::new(replay::ReplayDetectorFactory::new(script)),
    );
    let feedback = tokio::spawn(announce(controller.subscribe()));

    let handle = controller.start(mode, kind).map_err(explain)?;

    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let result = handle.wait().await;
    let _ = feedback.await;
    result.map_err(explain)
}

/// Attach the user-facing hint to camera failures.
fn explain(e: SessionError) -> anyhow::Error {
    let hint = match &e {
        SessionError::CameraUnavailable(camera) => Some(camera.suggestion()),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(e).context(hint),
        None => e.into(),
    }
}

/// Print prompts and progress until the session ends.
async fn announce(mut events: broadcast::Receiver<ScanEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "feedback fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        match event {
            ScanEvent::StepEntered { step, .. } => eprintln!("> {}", step.prompt()),
            ScanEvent::Progress { percent, .. } => eprintln!("  {percent}%"),
            ScanEvent::NoFace { .. } => tracing::trace!("no face in frame"),
            ScanEvent::SessionComplete { confidence, .. } => {
                eprintln!("capture confidence {confidence:.2}");
                return;
            }
            ScanEvent::SessionError { reason, .. } => {
                eprintln!("scan failed: {reason}");
                return;
            }
            ScanEvent::SessionCancelled { .. } => {
                eprintln!("scan cancelled");
                return;
            }
        }
    }
}

fn write_capture(capture: &BiometricCapture, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(capture)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("capture written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
