//! Capture trait definitions
//!
//! Platform-agnostic types for capture sources and the device seam the
//! acquirer talks to.

use super::stream::MediaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the sources a session can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureSource {
    Screen,
    Camera,
    Microphone,
    SystemAudio,
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSource::Screen => write!(f, "screen"),
            CaptureSource::Camera => write!(f, "camera"),
            CaptureSource::Microphone => write!(f, "microphone"),
            CaptureSource::SystemAudio => write!(f, "system-audio"),
        }
    }
}

/// Which sources to capture
///
/// The same shape is reused for "what was actually captured" once
/// acquisition completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub camera: bool,
    pub microphone: bool,
    pub screen: bool,
    pub system_audio: bool,
}

impl CaptureRequest {
    /// True when no source is selected
    pub fn is_empty(&self) -> bool {
        !self.camera && !self.microphone && !self.screen && !self.system_audio
    }

    pub fn contains(&self, source: CaptureSource) -> bool {
        match source {
            CaptureSource::Screen => self.screen,
            CaptureSource::Camera => self.camera,
            CaptureSource::Microphone => self.microphone,
            CaptureSource::SystemAudio => self.system_audio,
        }
    }

    pub fn set(&mut self, source: CaptureSource, enabled: bool) {
        match source {
            CaptureSource::Screen => self.screen = enabled,
            CaptureSource::Camera => self.camera = enabled,
            CaptureSource::Microphone => self.microphone = enabled,
            CaptureSource::SystemAudio => self.system_audio = enabled,
        }
    }
}

/// Constraints handed to the platform when requesting a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    pub fn new(video: bool, audio: bool) -> Self {
        Self { video, audio }
    }

    pub fn video_only() -> Self {
        Self::new(true, false)
    }

    pub fn audio_only() -> Self {
        Self::new(false, true)
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FULL_HD: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Browser/engine family the platform belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlatformFamily {
    Chromium,
    Firefox,
    Safari,
    /// Pre-Chromium Edge
    LegacyEdge,
}

impl PlatformFamily {
    /// Whether the native media encoder can record multi-channel audio
    pub fn has_native_audio_encoding(&self) -> bool {
        matches!(self, PlatformFamily::Chromium | PlatformFamily::Firefox)
    }

    /// Display capture must be started from an explicit user gesture
    pub fn requires_display_gesture(&self) -> bool {
        matches!(self, PlatformFamily::Firefox)
    }
}

/// What the platform can do, probed once per acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCapabilities {
    pub family: PlatformFamily,
    /// Camera/microphone capture is available
    pub user_media: bool,
    /// Screen/system audio capture is available
    pub display_media: bool,
}

/// Why the platform refused a capture request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    NotAllowed(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device not readable: {0}")]
    NotReadable(String),

    #[error("Capture aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

/// Platform capture primitives
///
/// Each request may suspend while the user answers a permission prompt.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Capabilities of this platform
    fn capabilities(&self) -> PlatformCapabilities;

    /// Geometry reported by the OS for the primary display
    fn screen_geometry(&self) -> Resolution;

    /// Request camera and/or microphone
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, DeviceError>;

    /// Request a screen (and/or system audio) capture
    async fn get_display_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_request() {
        assert!(CaptureRequest::default().is_empty());

        let mut request = CaptureRequest::default();
        request.set(CaptureSource::SystemAudio, true);
        assert!(!request.is_empty());
        assert!(request.contains(CaptureSource::SystemAudio));
        assert!(!request.contains(CaptureSource::Screen));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = CaptureRequest {
            system_audio: true,
            ..Default::default()
        };
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(json["systemAudio"], true);
        assert_eq!(json["camera"], false);
    }

    #[test]
    fn test_native_audio_encoding_by_family() {
        assert!(PlatformFamily::Chromium.has_native_audio_encoding());
        assert!(PlatformFamily::Firefox.has_native_audio_encoding());
        assert!(!PlatformFamily::Safari.has_native_audio_encoding());
        assert!(!PlatformFamily::LegacyEdge.has_native_audio_encoding());
    }
}
