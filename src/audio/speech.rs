//! Speech activity monitoring
//!
//! Polls the spectrum of an audio stream and reports when the speaker starts
//! talking and when they have been silent for a configurable time. Used to
//! pause a recording during long silences and resume it on speech.

use super::analysis::{AnalyserOptions, AudioAnalyser, AudioAnalysisBackend};
use crate::capture::stream::MediaStream;
use crate::recorder::encoder::RecordingResult;
use crate::utils::Listeners;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Spectrum sampling period
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Level above which a sample counts as voiced, in dB
pub const SPEECH_THRESHOLD_DB: f32 = -50.0;

/// Number of samples kept to decide transitions
const HISTORY_LEN: usize = 10;

/// Lowest bins carry hum and DC offset
const FIRST_BIN: usize = 4;

/// Onset needs this many voiced samples among the most recent three
const ONSET_WINDOW: usize = 3;
const ONSET_MIN_VOICED: usize = 2;

/// Speaking state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechTransition {
    Started,
    Stopped,
}

/// Voice activity detection over successive spectrum peaks
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    threshold: f32,
    history: VecDeque<bool>,
    speaking: bool,
}

impl VoiceActivityDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            history: std::iter::repeat(false).take(HISTORY_LEN).collect(),
            speaking: false,
        }
    }

    /// Loudest negative bin, skipping the lowest ones
    ///
    /// Returns negative infinity when no bin qualifies.
    pub fn peak_level(bins: &[f32]) -> f32 {
        bins.iter()
            .skip(FIRST_BIN)
            .copied()
            .filter(|level| *level < 0.0)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Feed one sample, returning a transition if one happened
    ///
    /// Decisions look at the history before `level` is added to it.
    pub fn update(&mut self, level: f32) -> Option<SpeechTransition> {
        let mut transition = None;
        if level > self.threshold && !self.speaking {
            let recent = self
                .history
                .iter()
                .rev()
                .take(ONSET_WINDOW)
                .filter(|voiced| **voiced)
                .count();
            if recent >= ONSET_MIN_VOICED {
                self.speaking = true;
                transition = Some(SpeechTransition::Started);
            }
        } else if level < self.threshold && self.speaking && self.history.iter().all(|v| !v) {
            self.speaking = false;
            transition = Some(SpeechTransition::Stopped);
        }

        self.history.pop_front();
        self.history.push_back(level > self.threshold);
        transition
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.threshold);
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(SPEECH_THRESHOLD_DB)
    }
}

#[derive(Default)]
struct SpeechHooks {
    speaking: Listeners<()>,
    stopped: Listeners<()>,
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Watches a microphone stream for speech
///
/// `on_speaking` listeners fire on every onset. `on_stopped_speaking`
/// listeners fire once the speaker has been silent for the timeout given to
/// [`listen`](Self::listen); speech before then cancels the notification.
#[derive(Default)]
pub struct SpeechActivityMonitor {
    hooks: Arc<SpeechHooks>,
    worker: Option<Worker>,
}

impl SpeechActivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_speaking<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.speaking.add(move |_: &()| handler());
    }

    pub fn on_stopped_speaking<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.stopped.add(move |_: &()| handler());
    }

    pub fn is_listening(&self) -> bool {
        self.worker.is_some()
    }

    /// Start monitoring `stream`, replacing any previous monitoring
    pub async fn listen(
        &mut self,
        stream: &MediaStream,
        backend: &dyn AudioAnalysisBackend,
        timeout: Duration,
        options: AnalyserOptions,
    ) -> RecordingResult<()> {
        self.stop().await;

        let analyser = backend.open(stream, options).await?;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_detector(
            analyser,
            self.hooks.clone(),
            timeout,
            shutdown_rx,
        ));
        self.worker = Some(Worker { shutdown, handle });

        tracing::info!(
            stream = stream.id(),
            timeout_secs = timeout.as_secs_f64(),
            "Listening for speech"
        );
        Ok(())
    }

    /// Stop monitoring and cancel any pending silence notification
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.shutdown.send(());
        if let Err(err) = worker.handle.await {
            tracing::warn!(error = %err, "Speech monitor task ended abnormally");
        }
        tracing::debug!("Speech monitor stopped");
    }
}

async fn run_detector(
    mut analyser: Box<dyn AudioAnalyser>,
    hooks: Arc<SpeechHooks>,
    timeout: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut detector = VoiceActivityDetector::default();
    let mut bins = vec![f32::NEG_INFINITY; analyser.frequency_bin_count()];
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut silence_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {
                analyser.float_frequency_data(&mut bins);
                match detector.update(VoiceActivityDetector::peak_level(&bins)) {
                    Some(SpeechTransition::Started) => {
                        silence_deadline = None;
                        tracing::debug!("Speech started");
                        hooks.speaking.emit(&());
                    }
                    Some(SpeechTransition::Stopped) => {
                        tracing::debug!("Speech stopped");
                        silence_deadline = Some(Instant::now() + timeout);
                    }
                    None => {}
                }
            }
            _ = tokio::time::sleep_until(silence_deadline.unwrap_or_else(Instant::now)),
                if silence_deadline.is_some() =>
            {
                silence_deadline = None;
                tracing::info!("Silence timeout reached");
                hooks.stopped.emit(&());
            }
        }
    }

    analyser.close().await;
}
