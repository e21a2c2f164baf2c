//! Live audio analysis
//!
//! Speech detection for auto pause and the level meter shown while
//! recording audio.

pub mod analysis;
pub mod speech;
pub mod visualizer;

pub use analysis::{AnalyserOptions, AudioAnalyser, AudioAnalysisBackend};
pub use speech::{SpeechActivityMonitor, VoiceActivityDetector};
pub use visualizer::{AudioVisualizer, BarOptions, DrawSurface};
