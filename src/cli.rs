//! Command-line tools
//!
//! `seekable` fixes up a recorded WebM file the same way downloads are
//! processed; `settings` shows what the recording page would do with a
//! settings file.

use crate::capture::traits::PlatformFamily;
use crate::export::seekable::{make_seekable, read_duration, ContainerError};
use crate::settings::{SessionConfig, SettingsStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "online-recorder", about = "Online recorder tools")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed duration metadata in a recorded WebM file
    Seekable {
        input: PathBuf,
        /// Defaults to `<input stem>.seekable.<ext>` next to the input
        output: Option<PathBuf>,
        /// Duration to use when the file has no blocks
        #[arg(long)]
        fallback_ms: Option<u64>,
    },
    /// Print the entry plan for a settings file
    Settings {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = Platform::Chromium)]
        platform: Platform,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Chromium,
    Firefox,
    Safari,
    LegacyEdge,
}

impl From<Platform> for PlatformFamily {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Chromium => PlatformFamily::Chromium,
            Platform::Firefox => PlatformFamily::Firefox,
            Platform::Safari => PlatformFamily::Safari,
            Platform::LegacyEdge => PlatformFamily::LegacyEdge,
        }
    }
}

/// `clip.webm` -> `clip.seekable.webm`
pub fn seekable_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{stem}.seekable.{}", ext.to_string_lossy()),
        None => format!("{stem}.seekable"),
    };
    input.with_file_name(name)
}

pub async fn execute(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Seekable {
            input,
            output,
            fallback_ms,
        } => {
            let output = output.unwrap_or_else(|| seekable_output_path(&input));
            rewrite_seekable(&input, &output, fallback_ms.map(Duration::from_millis)).await
        }
        Command::Settings { path, platform } => show_entry_plan(&path, platform.into()),
    }
}

async fn rewrite_seekable(input: &Path, output: &Path, fallback: Option<Duration>) -> Result<()> {
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let processed = tokio::task::spawn_blocking(move || {
        let result = make_seekable(&data, fallback);
        (data, result)
    })
    .await?;

    let bytes = match processed {
        (_, Ok(bytes)) => bytes,
        (data, Err(ContainerError::NotEbml)) => {
            tracing::warn!(input = %input.display(), "Not a WebM file, copying unchanged");
            data
        }
        (_, Err(err)) => {
            return Err(err).with_context(|| format!("Failed to rewrite {}", input.display()))
        }
    };

    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    match read_duration(&bytes) {
        Ok(Some(duration)) => println!(
            "{} ({:.3}s)",
            output.display(),
            duration.as_secs_f64()
        ),
        _ => println!("{}", output.display()),
    }
    Ok(())
}

fn show_entry_plan(path: &Path, family: PlatformFamily) -> Result<()> {
    let settings = SettingsStore::new(path)
        .load()
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    let config = SessionConfig::from_settings(settings);
    let plan = config.entry_plan(family);

    let summary = serde_json::json!({
        "plan": plan,
        "speakTimeout": config.settings.speak_timeout(),
        "autoPause": plan
            .request()
            .and_then(|request| config.settings.auto_pause_timeout(&request))
            .is_some(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
