//! Media capture
//!
//! Acquires screen, camera, microphone and system audio streams from the
//! platform and derives the composite video layout.

pub mod acquirer;
pub mod compositor;
pub mod stream;
pub mod traits;

pub use acquirer::{AcquiredStream, CaptureSurface, StreamAcquirer, StreamBundle};
pub use compositor::{compose, Placement, StreamInfo, VideoLayout};
pub use stream::{MediaStream, MediaTrack, TrackKind, TrackSettings, TrackState};
pub use traits::{
    CaptureRequest, CaptureSource, DeviceError, MediaConstraints, MediaDevices,
    PlatformCapabilities, PlatformFamily, Resolution,
};
