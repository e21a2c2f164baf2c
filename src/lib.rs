//! Online Recorder - screen, camera and microphone recording.
//!
//! Core of a browser-style recorder: stream acquisition, the recording
//! session, seekable WebM export, speech-driven auto pause and the audio
//! level meter. Platform facilities are reached through traits so any
//! media stack can be plugged in.

pub mod audio;
pub mod capture;
pub mod cli;
pub mod export;
pub mod recorder;
pub mod settings;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the default filter. Calling it again is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "online_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Run the command-line interface
pub async fn run() -> anyhow::Result<()> {
    let args = cli::CliArgs::parse();
    init_tracing();
    tracing::debug!("Starting Online Recorder v{}", env!("CARGO_PKG_VERSION"));
    cli::execute(args).await
}
