//! Recording session
//!
//! The coordinator drives one session at a time through capture, encoding,
//! pause/resume and finalization, and notifies listeners along the way.

pub mod coordinator;
pub mod encoder;
pub mod events;
pub mod options;
pub mod state;

pub use coordinator::{RecorderBackends, RecordingCoordinator};
pub use encoder::{
    EncoderFactory, EncoderState, MediaEncoder, RecordedOutput, RecordingError, RecordingResult,
};
pub use events::{EventHooks, EventKind, SessionEvent};
pub use options::{EncoderBackend, RecordOptions, RecordingKind};
pub use state::RecordingState;
