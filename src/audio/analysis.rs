//! Audio analysis seam
//!
//! The platform audio graph is reached through [`AudioAnalysisBackend`],
//! which attaches a frequency analyser to an audio stream.

use crate::capture::stream::MediaStream;
use crate::recorder::encoder::RecordingResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Frequency analyser configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyserOptions {
    /// FFT window size; half of it is the number of frequency bins
    pub fft_size: usize,
    /// Averaging constant between successive frames, 0 to 1
    pub smoothing: f32,
}

impl AnalyserOptions {
    /// Settings used for voice activity detection
    pub fn speech() -> Self {
        Self {
            fft_size: 512,
            smoothing: 0.1,
        }
    }

    /// Settings used for the level meter
    pub fn meter() -> Self {
        Self {
            fft_size: 32,
            smoothing: 0.8,
        }
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self::speech()
    }
}

/// A live analyser attached to one audio stream
#[async_trait]
pub trait AudioAnalyser: Send {
    fn frequency_bin_count(&self) -> usize;

    /// Magnitudes scaled to 0..=255, one per bin
    fn byte_frequency_data(&mut self, out: &mut [u8]);

    /// Magnitudes in decibels, one per bin
    fn float_frequency_data(&mut self, out: &mut [f32]);

    /// Detach from the stream and free the audio graph
    async fn close(&mut self);
}

/// Opens analysers on audio streams
#[async_trait]
pub trait AudioAnalysisBackend: Send + Sync {
    async fn open(
        &self,
        stream: &MediaStream,
        options: AnalyserOptions,
    ) -> RecordingResult<Box<dyn AudioAnalyser>>;
}
