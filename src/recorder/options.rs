//! Encoder configuration
//!
//! Chooses the output type, container and encoder backend for a session from
//! the acquired streams and the platform's capabilities.

use crate::capture::acquirer::StreamBundle;
use crate::capture::compositor::VideoLayout;
use crate::capture::traits::{PlatformFamily, Resolution};
use serde::{Deserialize, Serialize};

/// Recording output type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingKind {
    Video,
    Audio,
}

impl RecordingKind {
    /// File extension for downloads
    pub fn extension(&self) -> &'static str {
        match self {
            RecordingKind::Video => "webm",
            RecordingKind::Audio => "mp3",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, RecordingKind::Video)
    }
}

/// Mechanism that encodes the streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EncoderBackend {
    /// The platform's native media recorder
    MediaRecorder,
    /// PCM capture written to a WAV container, for platforms whose native
    /// recorder cannot encode multi-channel audio
    StereoAudio { channels: u16 },
}

impl EncoderBackend {
    /// Pick the backend for `kind` on `family`
    pub fn negotiate(kind: RecordingKind, family: PlatformFamily) -> Self {
        if kind.is_video() || family.has_native_audio_encoding() {
            return EncoderBackend::MediaRecorder;
        }
        match family {
            PlatformFamily::LegacyEdge => EncoderBackend::StereoAudio { channels: 1 },
            _ => EncoderBackend::StereoAudio { channels: 2 },
        }
    }

    pub fn audio_mime_type(&self) -> &'static str {
        match self {
            EncoderBackend::MediaRecorder => "audio/webm",
            EncoderBackend::StereoAudio { .. } => "audio/wav",
        }
    }
}

/// Configuration handed to the encoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOptions {
    #[serde(rename = "type")]
    pub kind: RecordingKind,
    pub mime_type: String,
    pub backend: EncoderBackend,
    /// Output resolution for video recordings
    pub video: Option<Resolution>,
    /// Composite layout for video recordings
    pub layout: Option<VideoLayout>,
}

impl RecordOptions {
    /// Options for recording `streams` on `family`
    pub fn negotiate(streams: &StreamBundle, family: PlatformFamily) -> Self {
        if streams.is_video() {
            let video = streams
                .layout()
                .map(|layout| layout.resolution())
                .filter(|r| r.width > 0 && r.height > 0)
                .unwrap_or(Resolution::FULL_HD);
            return Self {
                kind: RecordingKind::Video,
                mime_type: "video/webm".to_string(),
                backend: EncoderBackend::negotiate(RecordingKind::Video, family),
                video: Some(video),
                layout: streams.layout().copied(),
            };
        }

        let backend = EncoderBackend::negotiate(RecordingKind::Audio, family);
        Self {
            kind: RecordingKind::Audio,
            mime_type: backend.audio_mime_type().to_string(),
            backend,
            video: None,
            layout: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind.is_video()
    }
}
