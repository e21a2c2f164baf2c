//! Saving finished recordings
//!
//! Recordings are saved as `<prefix>-<YYYY-MM-DD HH:MM:SS>.<ext>`. Where the
//! bytes go is up to the [`FileSaver`]; [`DiskSaver`] writes them into a
//! directory.

use crate::recorder::encoder::RecordingResult;
use crate::recorder::options::RecordingKind;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default file name prefix
pub const DEFAULT_FILE_PREFIX: &str = "record";

/// A recording that has been saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecording {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: RecordingKind,
    /// Duration metadata was embedded before saving
    pub seekable: bool,
}

/// File name for a recording finished at `at`
pub fn recording_file_name(prefix: &str, kind: RecordingKind, at: DateTime<Local>) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        at.format("%Y-%m-%d %H:%M:%S"),
        kind.extension()
    )
}

/// Destination for finished recordings
#[async_trait]
pub trait FileSaver: Send + Sync {
    /// Store `data` under `file_name`, returning where it ended up
    async fn save(&self, file_name: &str, data: &[u8]) -> RecordingResult<PathBuf>;
}

/// Saves recordings into a directory
#[derive(Debug, Clone)]
pub struct DiskSaver {
    dir: PathBuf,
}

impl DiskSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FileSaver for DiskSaver {
    async fn save(&self, file_name: &str, data: &[u8]) -> RecordingResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(sanitize_file_name(file_name));
        tokio::fs::write(&path, data).await?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "Wrote recording");
        Ok(path)
    }
}

/// Replace characters that some filesystems reject
fn sanitize_file_name(name: &str) -> String {
    if cfg!(windows) {
        name.replace([':', '/', '\\'], "-")
    } else {
        name.replace('/', "-")
    }
}
