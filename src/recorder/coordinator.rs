//! Recording coordinator
//!
//! Owns the capture streams and the encoder of the active session and drives
//! the recording lifecycle. Only one session is active at a time: starting a
//! new one tears the previous one down first.

use super::encoder::{EncoderFactory, EncoderState, MediaEncoder, RecordedOutput, RecordingError, RecordingResult};
use super::events::{
    CaptureSuccessEvent, EventHooks, RecordTime, SessionEvent, StartEvent, StopEvent,
};
use super::options::{RecordOptions, RecordingKind};
use super::state::{format_elapsed, ElapsedClock, RecordingState};
use crate::audio::speech::SpeechActivityMonitor;
use crate::capture::acquirer::{StreamAcquirer, StreamBundle, TerminationHandler};
use crate::capture::traits::{CaptureRequest, MediaDevices};
use crate::export::download::{recording_file_name, FileSaver, SavedRecording};
use crate::export::seekable::make_seekable;
use crate::settings::SessionConfig;
use chrono::Local;
use parking_lot::Mutex as ParkingMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Interval between elapsed-time notifications
const TICK: Duration = Duration::from_secs(1);

/// Platform collaborators a coordinator works with
#[derive(Clone)]
pub struct RecorderBackends {
    pub devices: Arc<dyn MediaDevices>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub saver: Arc<dyn FileSaver>,
}

#[derive(Default)]
struct SessionInner {
    state: RecordingState,
    /// Set by the first `stop` call of a session
    stop_requested: bool,
    streams: Option<StreamBundle>,
    options: Option<RecordOptions>,
    encoder: Option<Box<dyn MediaEncoder>>,
    ticker: Option<JoinHandle<()>>,
    /// Elapsed time captured when the output was finalized
    final_duration: Duration,
}

struct Shared {
    backends: RecorderBackends,
    config: SessionConfig,
    hooks: EventHooks,
    clock: ParkingMutex<ElapsedClock>,
    inner: Mutex<SessionInner>,
    last_capture_succeeded: AtomicBool,
    /// Bumped on every start so stale termination observers are ignored
    generation: AtomicU64,
}

/// Manages the recording session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct RecordingCoordinator {
    shared: Arc<Shared>,
}

impl RecordingCoordinator {
    /// Create a new recording coordinator
    pub fn new(backends: RecorderBackends, config: SessionConfig) -> Self {
        let last_capture_succeeded = AtomicBool::new(config.last_capture_succeeded);
        Self {
            shared: Arc::new(Shared {
                backends,
                config,
                hooks: EventHooks::new(),
                clock: ParkingMutex::new(ElapsedClock::new()),
                inner: Mutex::new(SessionInner::default()),
                last_capture_succeeded,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Listener registry for session events
    pub fn hooks(&self) -> &EventHooks {
        &self.shared.hooks
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Whether any capture has succeeded during this application instance
    pub fn last_capture_succeeded(&self) -> bool {
        self.shared.last_capture_succeeded.load(Ordering::SeqCst)
    }

    /// Current session state
    pub async fn state(&self) -> RecordingState {
        self.shared.inner.lock().await.state
    }

    /// State reported by the encoder
    pub async fn encoder_state(&self) -> RecordingResult<EncoderState> {
        let inner = self.shared.inner.lock().await;
        inner
            .encoder
            .as_ref()
            .map(|encoder| encoder.state())
            .ok_or(RecordingError::NotReady("recorder is not ready yet"))
    }

    /// The finalized output, if any
    pub async fn blob(&self) -> Option<Arc<RecordedOutput>> {
        let inner = self.shared.inner.lock().await;
        inner.encoder.as_ref().and_then(|encoder| encoder.output())
    }

    /// Type of the current recording
    pub async fn recording_kind(&self) -> Option<RecordingKind> {
        self.shared.inner.lock().await.options.as_ref().map(|o| o.kind)
    }

    /// Elapsed recording time, pauses excluded
    pub fn elapsed(&self) -> Duration {
        self.shared.clock.lock().elapsed(Instant::now())
    }

    /// Start a new recording
    ///
    /// Does nothing when no source is selected. Any previous session is
    /// discarded first.
    pub async fn start(&self, request: CaptureRequest) -> RecordingResult<()> {
        if request.is_empty() {
            tracing::warn!("Please select at least one media source to record");
            return Ok(());
        }

        let mut inner = self.shared.inner.lock().await;
        inner.stop_requested = false;
        self.teardown(&mut inner, false);

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.state = RecordingState::Capturing;
        tracing::info!(?request, generation, "Starting recording");

        match self.begin(&mut inner, request, generation).await {
            Ok(event) => {
                inner.state = RecordingState::Recording;
                self.start_ticker(&mut inner);
                drop(inner);
                tracing::info!(is_video = event.is_video, "Recording started");
                self.shared.hooks.emit(SessionEvent::Start(event));
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to start recording");
                self.teardown(&mut inner, false);
                inner.state = RecordingState::Idle;
                Err(err)
            }
        }
    }

    async fn begin(
        &self,
        inner: &mut SessionInner,
        mut request: CaptureRequest,
        generation: u64,
    ) -> RecordingResult<StartEvent> {
        let shared = &self.shared;
        shared.hooks.emit(SessionEvent::CaptureBefore(request));

        let acquirer = StreamAcquirer::new(
            shared.backends.devices.as_ref(),
            &shared.hooks,
            shared.config.max_video_width,
        );
        let mut streams = acquirer.acquire(&mut request).await?;
        shared.last_capture_succeeded.store(true, Ordering::SeqCst);
        shared.hooks.emit(SessionEvent::CaptureAfter(CaptureSuccessEvent {
            is_video: streams.is_video(),
            captured: streams.captured(),
            layout: streams.layout().copied(),
        }));

        streams.observe_termination(self.termination_handler(generation));
        let has_microphone = streams.captured().microphone;

        let family = shared.backends.devices.capabilities().family;
        let options = RecordOptions::negotiate(&streams, family);
        if let Some(layout) = &options.layout {
            tracing::info!(?layout, "Video layout");
        }
        tracing::info!(
            options = %serde_json::to_string(&options).unwrap_or_default(),
            "Record options"
        );

        let encoder = shared.backends.encoders.create(&streams, &options);
        let is_video = options.is_video();
        inner.streams = Some(streams);
        inner.options = Some(options);
        let encoder = inner.encoder.insert(encoder?);
        let preview = encoder.start().await?;

        Ok(StartEvent {
            is_video,
            preview,
            has_microphone,
        })
    }

    /// Stop recording and finalize the output
    ///
    /// Only the first call of a session does anything.
    pub async fn stop(&self) -> RecordingResult<()> {
        self.stop_session(None).await
    }

    /// Stop, limited to the session `generation` when given
    async fn stop_session(&self, generation: Option<u64>) -> RecordingResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if let Some(generation) = generation {
            let current = self.shared.generation.load(Ordering::SeqCst);
            if current != generation {
                tracing::debug!(generation, current, "Ignoring stop for a replaced session");
                return Ok(());
            }
        }
        if inner.stop_requested {
            tracing::debug!("Stop already requested");
            return Ok(());
        }
        inner.stop_requested = true;

        let Some(encoder) = inner.encoder.as_mut() else {
            return Ok(());
        };

        tracing::info!("Stopping recording");
        let output = match encoder.stop().await {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(error = %err, "Encoder failed to finalize");
                inner.stop_requested = false;
                return Err(err);
            }
        };

        Self::halt_ticker(&mut inner);
        let duration = {
            let mut clock = self.shared.clock.lock();
            let elapsed = clock.elapsed(Instant::now());
            clock.reset();
            elapsed
        };
        inner.final_duration = duration;
        if let Some(mut streams) = inner.streams.take() {
            streams.release();
        }
        inner.state = RecordingState::Stopped;
        let kind = inner
            .options
            .as_ref()
            .map(|o| o.kind)
            .unwrap_or(RecordingKind::Video);
        drop(inner);

        tracing::info!(
            duration_ms = duration.as_millis() as u64,
            bytes = output.len(),
            "Recording stopped"
        );
        self.shared.hooks.emit(SessionEvent::Stop(StopEvent {
            kind,
            output,
            duration,
        }));
        Ok(())
    }

    /// Pause recording
    pub async fn pause(&self) -> RecordingResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != RecordingState::Recording {
            tracing::debug!(state = ?inner.state, "Ignoring pause");
            return Ok(());
        }
        let Some(encoder) = inner.encoder.as_mut() else {
            return Ok(());
        };
        encoder.pause()?;

        Self::halt_ticker(&mut inner);
        self.shared.clock.lock().pause(Instant::now());
        inner.state = RecordingState::Paused;
        drop(inner);

        tracing::info!("Recording paused");
        self.shared.hooks.emit(SessionEvent::Pause);
        Ok(())
    }

    /// Resume recording
    pub async fn resume(&self) -> RecordingResult<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != RecordingState::Paused {
            tracing::debug!(state = ?inner.state, "Ignoring resume");
            return Ok(());
        }
        let Some(encoder) = inner.encoder.as_mut() else {
            return Ok(());
        };
        encoder.resume()?;

        self.start_ticker(&mut inner);
        inner.state = RecordingState::Recording;
        drop(inner);

        tracing::info!("Recording resumed");
        self.shared.hooks.emit(SessionEvent::Resume);
        Ok(())
    }

    /// Save the finalized output
    ///
    /// With `seekable`, duration metadata is embedded in the container
    /// first.
    pub async fn download(&self, seekable: bool) -> RecordingResult<SavedRecording> {
        let (output, kind, duration) = {
            let inner = self.shared.inner.lock().await;
            let encoder = inner
                .encoder
                .as_ref()
                .ok_or(RecordingError::NotReady("recorder is not ready yet"))?;
            let output = encoder
                .output()
                .ok_or(RecordingError::NotReady("blob is not ready yet"))?;
            let kind = inner
                .options
                .as_ref()
                .map(|o| o.kind)
                .unwrap_or(RecordingKind::Video);
            (output, kind, inner.final_duration)
        };

        let mut seekable_applied = false;
        let data = if seekable {
            let source = output.clone();
            let processed =
                tokio::task::spawn_blocking(move || -> RecordingResult<Vec<u8>> {
                    Ok(make_seekable(&source.data, Some(duration))?)
                })
                .await?;
            match processed {
                Ok(data) => {
                    seekable_applied = true;
                    data
                }
                Err(err) => {
                    tracing::warn!(error = %err, mime = %output.mime_type, "Saving output without duration metadata");
                    output.data.clone()
                }
            }
        } else {
            output.data.clone()
        };

        let file_name = recording_file_name(&self.shared.config.file_prefix, kind, Local::now());
        let path = self.shared.backends.saver.save(&file_name, &data).await?;
        tracing::info!(path = %path.display(), seekable = seekable_applied, "Recording saved");

        Ok(SavedRecording {
            path,
            file_name,
            kind,
            seekable: seekable_applied,
        })
    }

    /// Drop the session: streams released, encoder destroyed, output lost
    pub async fn discard(&self) {
        let mut inner = self.shared.inner.lock().await;
        self.teardown(&mut inner, true);
        if inner.state != RecordingState::Idle {
            inner.state = RecordingState::Discarded;
            tracing::info!("Recording discarded");
        }
    }

    /// Pause on sustained silence and resume on speech
    pub fn enable_auto_pause(&self, monitor: &SpeechActivityMonitor) {
        let weak = Arc::downgrade(&self.shared);
        monitor.on_speaking(move || {
            if let Some(coordinator) = Self::upgrade(&weak) {
                tokio::spawn(async move {
                    if let Err(err) = coordinator.resume().await {
                        tracing::warn!(error = %err, "Auto resume failed");
                    }
                });
            }
        });

        let weak = Arc::downgrade(&self.shared);
        monitor.on_stopped_speaking(move || {
            if let Some(coordinator) = Self::upgrade(&weak) {
                tokio::spawn(async move {
                    if let Err(err) = coordinator.pause().await {
                        tracing::warn!(error = %err, "Auto pause failed");
                    }
                });
            }
        });
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn termination_handler(&self, generation: u64) -> TerminationHandler {
        let weak = Arc::downgrade(&self.shared);
        Arc::new(move || {
            let Some(coordinator) = Self::upgrade(&weak) else {
                return;
            };
            if coordinator.shared.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            tracing::info!("Capture source ended, stopping recording");
            tokio::spawn(async move {
                if let Err(err) = coordinator.stop_session(Some(generation)).await {
                    tracing::error!(error = %err, "Failed to stop after source ended");
                }
            });
        })
    }

    fn start_ticker(&self, inner: &mut SessionInner) {
        Self::halt_ticker(inner);
        self.shared.clock.lock().start(Instant::now());

        let weak = Arc::downgrade(&self.shared);
        inner.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK, TICK);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let elapsed = shared.clock.lock().elapsed(Instant::now());
                shared.hooks.emit(SessionEvent::UpdateRecordTime(RecordTime {
                    elapsed,
                    formatted: format_elapsed(elapsed),
                }));
            }
        }));
    }

    fn halt_ticker(inner: &mut SessionInner) {
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
    }

    fn teardown(&self, inner: &mut SessionInner, reset: bool) {
        Self::halt_ticker(inner);
        self.shared.clock.lock().reset();
        if let Some(mut streams) = inner.streams.take() {
            streams.release();
        }
        if let Some(mut encoder) = inner.encoder.take() {
            if reset {
                encoder.reset();
            }
            encoder.destroy();
        }
        inner.options = None;
        inner.final_duration = Duration::ZERO;
    }
}
