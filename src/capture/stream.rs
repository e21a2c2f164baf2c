//! Live media stream handles
//!
//! A `MediaStream` groups the tracks a single capture request produced.
//! Handles are cheap to clone and share liveness state with the platform
//! side, which signals external termination through [`MediaTrack::end`] and
//! [`MediaStream::deactivate`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Settings the platform reports for a track
///
/// Any field may be missing, e.g. screen captures on some platforms report
/// no geometry at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
}

impl TrackSettings {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            aspect_ratio: None,
        }
    }
}

/// Lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    /// Stopped locally; observers are not notified
    Stopped,
    /// Terminated by the platform or the user (permission revoked, shared
    /// tab closed, device unplugged)
    Ended,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    settings: TrackSettings,
    state: watch::Sender<TrackState>,
}

/// A single audio or video track
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>, settings: TrackSettings) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                settings,
                state,
            }),
        }
    }

    pub fn video(label: impl Into<String>, settings: TrackSettings) -> Self {
        Self::new(TrackKind::Video, label, settings)
    }

    pub fn audio(label: impl Into<String>) -> Self {
        Self::new(TrackKind::Audio, label, TrackSettings::default())
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> TrackSettings {
        self.inner.settings
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stop the track from our side
    pub fn stop(&self) {
        let stopped = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Stopped;
                true
            } else {
                false
            }
        });
        if stopped {
            tracing::debug!(track = %self.inner.id, kind = ?self.inner.kind, "Track stopped");
        }
    }

    /// Platform-side termination
    pub fn end(&self) {
        let ended = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        });
        if ended {
            tracing::info!(track = %self.inner.id, label = %self.inner.label, "Track ended externally");
        }
    }

    /// Resolves once the track has been ended externally
    ///
    /// Never resolves for a track that was stopped locally.
    pub async fn ended(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == TrackState::Ended).await;
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

struct StreamInner {
    id: String,
    tracks: Vec<MediaTrack>,
    active: watch::Sender<bool>,
}

/// A group of tracks produced by one capture request
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4().to_string(),
                tracks,
                active,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.inner
            .tracks
            .iter()
            .filter(|track| track.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.inner
            .tracks
            .iter()
            .filter(|track| track.kind() == TrackKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.video_tracks().next().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    /// Active while not deactivated and at least one track is live
    pub fn is_active(&self) -> bool {
        *self.inner.active.borrow() && self.inner.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track
    pub fn stop_all(&self) {
        for track in &self.inner.tracks {
            track.stop();
        }
    }

    /// Platform-side signal that the whole stream went inactive
    pub fn deactivate(&self) {
        self.inner.active.send_if_modified(|active| std::mem::replace(active, false));
    }

    /// Resolves once the stream has been deactivated by the platform
    pub async fn inactive(&self) {
        let mut rx = self.inner.active.subscribe();
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Whether two handles refer to the same stream
    pub fn same_as(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks)
            .finish()
    }
}
