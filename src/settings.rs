//! Recorder settings
//!
//! Settings are a flat JSON object of string values. Source flags use `"1"`
//! for enabled; anything else, including a missing key, means disabled.

use crate::capture::compositor::MAX_VIDEO_WIDTH;
use crate::capture::traits::{CaptureRequest, PlatformFamily};
use crate::export::download::{DiskSaver, DEFAULT_FILE_PREFIX};
use crate::utils::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MICROPHONE_KEY: &str = "microphone";
pub const SCREEN_KEY: &str = "screen";
pub const CAMERA_KEY: &str = "camera";
pub const SYSTEM_AUDIO_KEY: &str = "systemAudio";
/// Seconds of silence before auto pause, 0 disables
pub const SPEAK_TIMEOUT_KEY: &str = "speakTimeout";

const ENABLED: &str = "1";

/// Persisted key/value settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecorderSettings {
    values: BTreeMap<String, String>,
}

impl RecorderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set `key`, validating the values the recorder interprets
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> AppResult<()> {
        let value = value.into();
        if key == SPEAK_TIMEOUT_KEY && value.trim().parse::<u64>().is_err() {
            return Err(AppError::Settings(format!(
                "{SPEAK_TIMEOUT_KEY} must be a whole number of seconds, got {value:?}"
            )));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some(ENABLED)
    }

    pub fn set_flag(&mut self, key: &str, enabled: bool) {
        self.values
            .insert(key.to_string(), if enabled { ENABLED } else { "0" }.to_string());
    }

    /// Sources selected on the options page
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            camera: self.flag(CAMERA_KEY),
            microphone: self.flag(MICROPHONE_KEY),
            screen: self.flag(SCREEN_KEY),
            system_audio: self.flag(SYSTEM_AUDIO_KEY),
        }
    }

    /// Silence timeout in seconds; unparsable values read as 0
    pub fn speak_timeout(&self) -> u64 {
        self.get(SPEAK_TIMEOUT_KEY)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Silence timeout for auto pause when it applies to `captured`
    ///
    /// Auto pause needs a positive timeout and a captured microphone.
    pub fn auto_pause_timeout(&self, captured: &CaptureRequest) -> Option<Duration> {
        let seconds = self.speak_timeout();
        (seconds > 0 && captured.microphone).then(|| Duration::from_secs(seconds))
    }
}

/// Loads and saves [`RecorderSettings`] as a JSON file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings; a missing file yields empty settings
    pub fn load(&self) -> AppResult<RecorderSettings> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(RecorderSettings::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let settings: RecorderSettings = serde_json::from_str(&contents)?;
        tracing::debug!(path = %self.path.display(), keys = settings.values.len(), "Loaded settings");
        Ok(settings)
    }

    pub fn save(&self, settings: &RecorderSettings) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, contents)?;
        tracing::info!(path = %self.path.display(), "Saved settings");
        Ok(())
    }

    /// Update a single key on disk
    pub fn set(&self, key: &str, value: &str) -> AppResult<RecorderSettings> {
        let mut settings = self.load()?;
        settings.set(key, value)?;
        self.save(&settings)?;
        Ok(settings)
    }
}

/// What to do when the recording page opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "request", rename_all = "camelCase")]
pub enum EntryPlan {
    /// Nothing selected; send the user to the options page
    Redirect,
    /// Ask the user to click before capturing
    ConfirmFirst(CaptureRequest),
    /// Start capturing right away
    StartNow(CaptureRequest),
}

impl EntryPlan {
    pub fn decide(settings: &RecorderSettings, family: PlatformFamily) -> Self {
        let request = settings.capture_request();
        if request.is_empty() {
            EntryPlan::Redirect
        } else if request.screen && family.requires_display_gesture() {
            EntryPlan::ConfirmFirst(request)
        } else {
            EntryPlan::StartNow(request)
        }
    }

    pub fn request(&self) -> Option<CaptureRequest> {
        match self {
            EntryPlan::Redirect => None,
            EntryPlan::ConfirmFirst(request) | EntryPlan::StartNow(request) => Some(*request),
        }
    }
}

/// Configuration of one recording page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Settings snapshot taken when the page opened
    pub settings: RecorderSettings,
    /// A capture has succeeded before in this application instance
    pub last_capture_succeeded: bool,
    /// Download file name prefix
    pub file_prefix: String,
    /// Where saved recordings go
    pub output_dir: PathBuf,
    /// Widest composite video frame
    pub max_video_width: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settings: RecorderSettings::default(),
            last_capture_succeeded: false,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            output_dir: PathBuf::from("."),
            max_video_width: MAX_VIDEO_WIDTH,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: RecorderSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn entry_plan(&self, family: PlatformFamily) -> EntryPlan {
        EntryPlan::decide(&self.settings, family)
    }

    /// Saver writing into the configured output directory
    pub fn disk_saver(&self) -> DiskSaver {
        DiskSaver::new(&self.output_dir)
    }
}
