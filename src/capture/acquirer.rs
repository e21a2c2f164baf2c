//! Stream acquisition
//!
//! Requests every selected source from the platform, in a fixed order
//! (screen, system audio, camera, microphone). Companion audio is first
//! requested together with its video source; if that fails the request is
//! narrowed to video only and the companion flag is cleared. A standalone
//! audio source tolerates failure when another stream has already been
//! acquired.

use super::compositor::{compose, StreamInfo, VideoLayout};
use super::stream::MediaStream;
use super::traits::{
    CaptureRequest, CaptureSource, DeviceError, MediaConstraints, MediaDevices, Resolution,
};
use crate::recorder::encoder::{RecordingError, RecordingResult};
use crate::recorder::events::{CaptureErrorEvent, EventHooks, SessionEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Callback fired when an acquired stream is terminated externally
pub type TerminationHandler = Arc<dyn Fn() + Send + Sync>;

/// Platform entry point a request goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSurface {
    /// Camera and microphone
    User,
    /// Screen and system audio
    Display,
}

impl CaptureSurface {
    /// Sources covered by a request on this surface
    fn sources(&self, constraints: MediaConstraints) -> CaptureRequest {
        match self {
            CaptureSurface::User => CaptureRequest {
                camera: constraints.video,
                microphone: constraints.audio,
                ..Default::default()
            },
            CaptureSurface::Display => CaptureRequest {
                screen: constraints.video,
                system_audio: constraints.audio,
                ..Default::default()
            },
        }
    }
}

impl std::fmt::Display for CaptureSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSurface::User => write!(f, "user media"),
            CaptureSurface::Display => write!(f, "display media"),
        }
    }
}

/// A stream together with the role it was acquired for
#[derive(Debug, Clone)]
pub struct AcquiredStream {
    pub source: CaptureSource,
    pub stream: MediaStream,
    pub info: StreamInfo,
}

/// The live streams owned by a session
#[derive(Default)]
pub struct StreamBundle {
    streams: Vec<AcquiredStream>,
    captured: CaptureRequest,
    layout: Option<VideoLayout>,
    observers: Vec<JoinHandle<()>>,
}

impl StreamBundle {
    /// Add a stream acquired for `source`
    pub fn push(&mut self, source: CaptureSource, stream: MediaStream, info: StreamInfo) {
        self.captured.set(source, true);
        self.streams.push(AcquiredStream {
            source,
            stream,
            info,
        });
    }

    /// Record whether `source` was captured as part of another stream
    pub fn mark_captured(&mut self, source: CaptureSource, captured: bool) {
        self.captured.set(source, captured);
    }

    pub fn streams(&self) -> &[AcquiredStream] {
        &self.streams
    }

    pub fn stream(&self, source: CaptureSource) -> Option<&AcquiredStream> {
        self.streams.iter().find(|s| s.source == source)
    }

    /// Sources that were actually captured
    pub fn captured(&self) -> CaptureRequest {
        self.captured
    }

    /// A screen or camera is part of the bundle
    pub fn is_video(&self) -> bool {
        self.streams
            .iter()
            .any(|s| matches!(s.source, CaptureSource::Screen | CaptureSource::Camera))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn layout(&self) -> Option<&VideoLayout> {
        self.layout.as_ref()
    }

    /// Derive the video layout from the screen and camera geometry
    pub fn compose(&mut self, max_width: u32) {
        let screen = self.stream(CaptureSource::Screen).map(|s| s.info);
        let camera = self.stream(CaptureSource::Camera).map(|s| s.info);
        self.layout = compose(screen.as_ref(), camera.as_ref(), max_width);
    }

    /// Call `on_ended` when a stream, or any of its tracks, is terminated
    /// from outside
    ///
    /// Fires at most once per stream.
    pub fn observe_termination(&mut self, on_ended: TerminationHandler) {
        for acquired in &self.streams {
            let once: Arc<Mutex<Option<TerminationHandler>>> =
                Arc::new(Mutex::new(Some(on_ended.clone())));

            let stream = acquired.stream.clone();
            let guard = once.clone();
            self.observers.push(tokio::spawn(async move {
                stream.inactive().await;
                fire_once(&guard);
            }));

            for track in acquired.stream.tracks() {
                let track = track.clone();
                let guard = once.clone();
                self.observers.push(tokio::spawn(async move {
                    track.ended().await;
                    fire_once(&guard);
                }));
            }
        }
    }

    /// Stop every track of every stream and drop the observers
    pub fn release(&mut self) {
        for observer in self.observers.drain(..) {
            observer.abort();
        }
        for acquired in &self.streams {
            acquired.stream.stop_all();
        }
        if !self.streams.is_empty() {
            tracing::debug!(streams = self.streams.len(), "Released capture streams");
        }
        self.streams.clear();
        self.layout = None;
    }
}

impl Drop for StreamBundle {
    fn drop(&mut self) {
        for observer in self.observers.drain(..) {
            observer.abort();
        }
    }
}

fn fire_once(guard: &Mutex<Option<TerminationHandler>>) {
    let handler = guard.lock().take();
    if let Some(handler) = handler {
        handler();
    }
}

/// Acquires the streams for a capture request
pub struct StreamAcquirer<'a> {
    devices: &'a dyn MediaDevices,
    hooks: &'a EventHooks,
    max_width: u32,
}

impl<'a> StreamAcquirer<'a> {
    pub fn new(devices: &'a dyn MediaDevices, hooks: &'a EventHooks, max_width: u32) -> Self {
        Self {
            devices,
            hooks,
            max_width,
        }
    }

    /// Acquire every source in `request`
    ///
    /// Companion flags in `request` are cleared when the companion could not
    /// be captured. On failure, anything acquired so far is released.
    pub async fn acquire(&self, request: &mut CaptureRequest) -> RecordingResult<StreamBundle> {
        let mut bundle = StreamBundle::default();
        match self.acquire_into(&mut bundle, request).await {
            Ok(()) => {
                bundle.compose(self.max_width);
                Ok(bundle)
            }
            Err(err) => {
                bundle.release();
                Err(err)
            }
        }
    }

    async fn acquire_into(
        &self,
        bundle: &mut StreamBundle,
        request: &mut CaptureRequest,
    ) -> RecordingResult<()> {
        if request.screen {
            let mut constraints = MediaConstraints::new(true, request.system_audio);
            let retry = request.system_audio.then(MediaConstraints::video_only);
            if let Some(screen) = self
                .request_with_fallback(CaptureSurface::Display, &mut constraints, retry, false)
                .await?
            {
                let info = StreamInfo::from_stream(&screen, Some(self.devices.screen_geometry()));
                tracing::info!(width = info.width, height = info.height, "Screen acquired");
                bundle.push(CaptureSource::Screen, screen, info);
                bundle.mark_captured(CaptureSource::SystemAudio, constraints.audio);
                request.system_audio = constraints.audio;
            }
        }

        if !bundle.captured().system_audio && request.system_audio {
            let mut constraints = MediaConstraints::audio_only();
            let tolerate = !bundle.is_empty();
            match self
                .request_with_fallback(CaptureSurface::Display, &mut constraints, None, tolerate)
                .await?
            {
                Some(stream) => bundle.push(CaptureSource::SystemAudio, stream, StreamInfo::NONE),
                None => request.system_audio = false,
            }
        }

        if request.camera {
            let mut constraints = MediaConstraints::new(true, request.microphone);
            let retry = request.microphone.then(MediaConstraints::video_only);
            if let Some(camera) = self
                .request_with_fallback(CaptureSurface::User, &mut constraints, retry, false)
                .await?
            {
                let info = StreamInfo::from_stream(&camera, Some(Resolution::FULL_HD));
                tracing::info!(width = info.width, height = info.height, "Camera acquired");
                bundle.push(CaptureSource::Camera, camera, info);
                bundle.mark_captured(CaptureSource::Microphone, constraints.audio);
                request.microphone = constraints.audio;
            }
        }

        if !bundle.captured().microphone && request.microphone {
            let mut constraints = MediaConstraints::audio_only();
            let tolerate = !bundle.is_empty();
            match self
                .request_with_fallback(CaptureSurface::User, &mut constraints, None, tolerate)
                .await?
            {
                Some(stream) => bundle.push(CaptureSource::Microphone, stream, StreamInfo::NONE),
                None => request.microphone = false,
            }
        }

        Ok(())
    }

    fn ensure_supported(&self, surface: CaptureSurface) -> RecordingResult<()> {
        let capabilities = self.devices.capabilities();
        let supported = match surface {
            CaptureSurface::User => capabilities.user_media,
            CaptureSurface::Display => capabilities.display_media,
        };
        if supported {
            return Ok(());
        }
        let message = format!("{surface} capture is not supported on this platform");
        tracing::error!(family = ?capabilities.family, "{message}");
        Err(RecordingError::UnsupportedPlatform(message))
    }

    async fn request(
        &self,
        surface: CaptureSurface,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, DeviceError> {
        match surface {
            CaptureSurface::User => self.devices.get_user_media(constraints).await,
            CaptureSurface::Display => self.devices.get_display_media(constraints).await,
        }
    }

    /// Request `constraints`, retrying once with `retry` on failure
    ///
    /// When the retry succeeds `constraints` is overwritten with it so the
    /// caller can see which companions were dropped. With `tolerate_failure`
    /// a failure yields `Ok(None)` instead of an error.
    async fn request_with_fallback(
        &self,
        surface: CaptureSurface,
        constraints: &mut MediaConstraints,
        retry: Option<MediaConstraints>,
        tolerate_failure: bool,
    ) -> RecordingResult<Option<MediaStream>> {
        self.ensure_supported(surface)?;

        let attempt = match self.request(surface, *constraints).await {
            Ok(stream) => Ok(stream),
            Err(err) => match retry {
                Some(narrowed) => {
                    tracing::info!(
                        error = %err,
                        video = narrowed.video,
                        audio = narrowed.audio,
                        "{surface} request failed, retrying with narrowed constraints"
                    );
                    let result = self.request(surface, narrowed).await;
                    if result.is_ok() {
                        *constraints = narrowed;
                    }
                    result
                }
                None => Err(err),
            },
        };

        match attempt {
            Ok(stream) => Ok(Some(stream)),
            Err(err) if tolerate_failure => {
                tracing::warn!(error = %err, "{surface} request failed, continuing without it");
                Ok(None)
            }
            Err(err) => {
                let failed = surface.sources(*constraints);
                let event = CaptureErrorEvent {
                    error: err.clone(),
                    failed,
                };
                tracing::error!("{}", event.describe());
                self.hooks.emit(SessionEvent::CaptureError(event));
                Err(RecordingError::Acquisition {
                    failed,
                    source: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::compositor::MAX_VIDEO_WIDTH;
    use crate::capture::traits::{PlatformCapabilities, PlatformFamily};
    use crate::testing::FakeDevices;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn error_counter(hooks: &EventHooks) -> Arc<Mutex<Vec<CaptureErrorEvent>>> {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        hooks.on_capture_error(move |event| sink.lock().push(event.clone()));
        errors
    }

    #[tokio::test]
    async fn test_screen_and_camera_with_companions() {
        let devices = FakeDevices::new();
        let hooks = EventHooks::new();
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            camera: true,
            microphone: true,
            screen: true,
            system_audio: true,
        };
        let bundle = acquirer.acquire(&mut request).await.unwrap();

        // Companions ride along with their video source
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.captured(), request);
        assert!(bundle.is_video());
        let layout = bundle.layout().unwrap();
        assert_eq!((layout.width, layout.height), (1920, 1080));
        assert_eq!(layout.camera.unwrap().width, 288);

        let requests = devices.requests();
        assert_eq!(
            requests,
            vec![
                (CaptureSurface::Display, MediaConstraints::new(true, true)),
                (CaptureSurface::User, MediaConstraints::new(true, true)),
            ]
        );
    }

    #[tokio::test]
    async fn test_system_audio_companion_failure_is_tolerated() {
        let devices = FakeDevices::new().deny(|surface, constraints| {
            (surface == CaptureSurface::Display && constraints.audio)
                .then(|| DeviceError::NotAllowed("audio sharing declined".to_string()))
        });
        let hooks = EventHooks::new();
        let errors = error_counter(&hooks);
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            screen: true,
            system_audio: true,
            ..Default::default()
        };
        let bundle = acquirer.acquire(&mut request).await.unwrap();

        assert!(!request.system_audio);
        assert!(!bundle.captured().system_audio);
        assert!(bundle.captured().screen);
        assert!(errors.lock().is_empty());
        assert_eq!(
            devices.requests().last().copied(),
            Some((CaptureSurface::Display, MediaConstraints::video_only()))
        );
    }

    #[tokio::test]
    async fn test_secondary_microphone_failure_is_tolerated() {
        let devices = FakeDevices::new().deny(|surface, _| {
            (surface == CaptureSurface::User)
                .then(|| DeviceError::NotFound("no microphone".to_string()))
        });
        let hooks = EventHooks::new();
        let errors = error_counter(&hooks);
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            screen: true,
            microphone: true,
            ..Default::default()
        };
        let bundle = acquirer.acquire(&mut request).await.unwrap();

        assert_eq!(bundle.len(), 1);
        assert!(!request.microphone);
        assert!(errors.lock().is_empty());
    }

    #[tokio::test]
    async fn test_primary_microphone_failure_raises_capture_error() {
        let devices = FakeDevices::new().deny(|_, _| {
            Some(DeviceError::NotAllowed("permission denied".to_string()))
        });
        let hooks = EventHooks::new();
        let errors = error_counter(&hooks);
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            microphone: true,
            ..Default::default()
        };
        let err = acquirer.acquire(&mut request).await.err().unwrap();

        assert!(matches!(err, RecordingError::Acquisition { failed, .. } if failed.microphone));
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].failed.microphone);
        assert!(!errors[0].failed.camera);
    }

    #[tokio::test]
    async fn test_failure_releases_partial_streams() {
        let devices = FakeDevices::new().deny(|surface, _| {
            (surface == CaptureSurface::User)
                .then(|| DeviceError::NotReadable("camera busy".to_string()))
        });
        let hooks = EventHooks::new();
        let errors = error_counter(&hooks);
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            screen: true,
            camera: true,
            ..Default::default()
        };
        assert!(acquirer.acquire(&mut request).await.is_err());

        let issued = devices.issued();
        assert_eq!(issued.len(), 1);
        assert!(!issued[0].is_active());
        assert!(errors.lock()[0].failed.camera);
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let devices = FakeDevices::with_capabilities(PlatformCapabilities {
            family: PlatformFamily::Safari,
            user_media: true,
            display_media: false,
        });
        let hooks = EventHooks::new();
        let errors = error_counter(&hooks);
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            screen: true,
            ..Default::default()
        };
        let err = acquirer.acquire(&mut request).await.err().unwrap();
        assert!(matches!(err, RecordingError::UnsupportedPlatform(_)));
        assert!(errors.lock().is_empty());
        assert!(devices.requests().is_empty());
    }

    #[tokio::test]
    async fn test_termination_fires_once_per_stream() {
        let devices = FakeDevices::new();
        let hooks = EventHooks::new();
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            screen: true,
            system_audio: true,
            ..Default::default()
        };
        let mut bundle = acquirer.acquire(&mut request).await.unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        bundle.observe_termination(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let screen = bundle.stream(CaptureSource::Screen).unwrap().stream.clone();
        for track in screen.tracks() {
            track.end();
        }
        screen.deactivate();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_silences_observers() {
        let devices = FakeDevices::new();
        let hooks = EventHooks::new();
        let acquirer = StreamAcquirer::new(&devices, &hooks, MAX_VIDEO_WIDTH);

        let mut request = CaptureRequest {
            camera: true,
            ..Default::default()
        };
        let mut bundle = acquirer.acquire(&mut request).await.unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        bundle.observe_termination(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let camera = bundle.stream(CaptureSource::Camera).unwrap().stream.clone();
        bundle.release();
        assert!(bundle.is_empty());
        assert!(!camera.is_active());

        camera.deactivate();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
