//! Stream composition geometry
//!
//! Derives per-stream geometry and the picture-in-picture layout used when a
//! screen and a camera are recorded together.

use super::stream::MediaStream;
use super::traits::Resolution;
use serde::{Deserialize, Serialize};

/// Widest composite the recorder produces
pub const MAX_VIDEO_WIDTH: u32 = 1920;

/// Camera overlay width as a fraction of the screen width
pub const CAMERA_OVERLAY_RATIO: f64 = 0.15;

/// Upper bound for the camera overlay width
pub const CAMERA_OVERLAY_MAX_WIDTH: u32 = 320;

/// Native geometry of a stream's video
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
}

impl StreamInfo {
    /// Sentinel for streams without video
    pub const NONE: StreamInfo = StreamInfo {
        width: 0,
        height: 0,
        aspect_ratio: -1.0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect_ratio: aspect(width, height),
        }
    }

    pub fn is_none(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Geometry of `stream`, using `fallback` when its video track reports
    /// no size (or there is no video track at all)
    pub fn from_stream(stream: &MediaStream, fallback: Option<Resolution>) -> Self {
        let reported = stream.video_tracks().next().and_then(|track| {
            let settings = track.settings();
            match (settings.width, settings.height) {
                (Some(width), Some(height)) if width > 0 && height > 0 => Some(StreamInfo {
                    width,
                    height,
                    aspect_ratio: settings
                        .aspect_ratio
                        .filter(|ratio| *ratio > 0.0)
                        .unwrap_or_else(|| aspect(width, height)),
                }),
                _ => None,
            }
        });

        reported
            .or_else(|| fallback.map(|r| StreamInfo::new(r.width, r.height)))
            .unwrap_or(StreamInfo::NONE)
    }
}

fn aspect(width: u32, height: u32) -> f64 {
    if width > 0 && height > 0 {
        width as f64 / height as f64
    } else {
        -1.0
    }
}

/// Scale `info` down to `max_width`, keeping its proportions
///
/// Dimensions are floored; anything already within the bound is returned
/// unchanged.
pub fn constrain_width(info: &StreamInfo, max_width: f64) -> Resolution {
    if (info.width as f64) > max_width {
        let height = (info.height as f64 * max_width / info.width as f64).floor();
        Resolution::new(max_width.floor() as u32, height as u32)
    } else {
        Resolution::new(info.width, info.height)
    }
}

/// Where a stream is drawn on the composite canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub top: u32,
    pub left: u32,
    /// Stretches over the whole canvas
    pub full_canvas: bool,
}

/// Geometry for the recorded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoLayout {
    pub width: u32,
    pub height: u32,
    /// Screen placement when the screen is composited with a camera
    pub screen: Option<Placement>,
    /// Camera overlay, flush bottom-right
    pub camera: Option<Placement>,
}

impl VideoLayout {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Compute the layout for the acquired video sources
///
/// Returns `None` for audio-only captures.
pub fn compose(
    screen: Option<&StreamInfo>,
    camera: Option<&StreamInfo>,
    max_width: u32,
) -> Option<VideoLayout> {
    let max_width = max_width as f64;
    match (screen, camera) {
        (Some(screen), Some(camera)) => {
            let canvas = constrain_width(screen, max_width);
            let overlay_max =
                (canvas.width as f64 * CAMERA_OVERLAY_RATIO).min(CAMERA_OVERLAY_MAX_WIDTH as f64);
            let overlay = constrain_width(camera, overlay_max);

            Some(VideoLayout {
                width: canvas.width,
                height: canvas.height,
                screen: Some(Placement {
                    width: canvas.width,
                    height: canvas.height,
                    top: 0,
                    left: 0,
                    full_canvas: true,
                }),
                camera: Some(Placement {
                    width: overlay.width,
                    height: overlay.height,
                    top: canvas.height.saturating_sub(overlay.height),
                    left: canvas.width.saturating_sub(overlay.width),
                    full_canvas: false,
                }),
            })
        }
        (Some(single), None) | (None, Some(single)) => {
            let canvas = constrain_width(single, max_width);
            Some(VideoLayout {
                width: canvas.width,
                height: canvas.height,
                screen: None,
                camera: None,
            })
        }
        (None, None) => None,
    }
}
