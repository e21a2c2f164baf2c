//! Encoder trait
//!
//! Defines the interface to the platform media encoder that turns the
//! acquired streams into a single output container, along with the errors a
//! recording session can surface.

use super::options::RecordOptions;
use crate::capture::acquirer::StreamBundle;
use crate::capture::stream::MediaStream;
use crate::capture::traits::{CaptureRequest, DeviceError};
use crate::export::seekable::ContainerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Cannot capture {}: {source}", describe_sources(.failed))]
    Acquisition {
        /// Sources the failed request asked for
        failed: CaptureRequest,
        #[source]
        source: DeviceError,
    },

    #[error("Not ready: {0}")]
    NotReady(&'static str),

    #[error("Encoding error: {0}")]
    Encoder(String),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Human-readable list of sources, e.g. "Camera and Microphone"
pub fn describe_sources(sources: &CaptureRequest) -> String {
    let mut names = Vec::new();
    if sources.camera {
        names.push("Camera");
    }
    if sources.microphone {
        names.push("Microphone");
    }
    if sources.screen {
        names.push("Screen");
    }
    if sources.system_audio {
        names.push("System Audio");
    }
    names.join(" and ")
}

/// State reported by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
    Stopped,
}

/// Finalized encoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutput {
    /// Encoded container bytes
    pub data: Vec<u8>,
    /// Container MIME type, e.g. "video/webm"
    pub mime_type: String,
}

impl RecordedOutput {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Platform media encoder
///
/// One instance records one session. It is created by an [`EncoderFactory`]
/// from the acquired streams and the negotiated options.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Begin encoding, returning a live preview of what is being recorded
    async fn start(&mut self) -> RecordingResult<Option<MediaStream>>;

    fn pause(&mut self) -> RecordingResult<()>;

    fn resume(&mut self) -> RecordingResult<()>;

    /// Finalize the output container
    async fn stop(&mut self) -> RecordingResult<Arc<RecordedOutput>>;

    fn state(&self) -> EncoderState;

    /// The finalized output, once `stop` has completed
    fn output(&self) -> Option<Arc<RecordedOutput>>;

    /// Drop any partial output
    fn reset(&mut self);

    /// Release encoder resources
    fn destroy(&mut self);
}

/// Creates encoders for a session
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        streams: &StreamBundle,
        options: &RecordOptions,
    ) -> RecordingResult<Box<dyn MediaEncoder>>;
}
