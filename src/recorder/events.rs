//! Session notifications
//!
//! Typed publish/subscribe registry for recording lifecycle events. Every
//! event kind supports any number of listeners, invoked synchronously in
//! registration order.

use super::encoder::{describe_sources, RecordedOutput};
use super::options::RecordingKind;
use crate::capture::compositor::VideoLayout;
use crate::capture::stream::MediaStream;
use crate::capture::traits::{CaptureRequest, DeviceError};
use crate::utils::Listeners;
use std::sync::Arc;
use std::time::Duration;

/// Kinds of events emitted during recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Stop,
    Pause,
    Resume,
    CaptureBefore,
    CaptureAfter,
    CaptureError,
    UpdateRecordTime,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::CaptureBefore => "capturebefore",
            EventKind::CaptureAfter => "captureafter",
            EventKind::CaptureError => "captureerror",
            EventKind::UpdateRecordTime => "updateRecordTime",
        };
        f.write_str(name)
    }
}

/// Encoding began
#[derive(Debug, Clone)]
pub struct StartEvent {
    pub is_video: bool,
    /// Live preview of what is being recorded
    pub preview: Option<MediaStream>,
    /// A microphone is part of the recording
    pub has_microphone: bool,
}

/// Output finalized
#[derive(Debug, Clone)]
pub struct StopEvent {
    pub kind: RecordingKind,
    pub output: Arc<RecordedOutput>,
    /// Elapsed recording time, pauses excluded
    pub duration: Duration,
}

impl StopEvent {
    pub fn is_video(&self) -> bool {
        self.kind.is_video()
    }
}

/// Streams acquired
#[derive(Debug, Clone)]
pub struct CaptureSuccessEvent {
    pub is_video: bool,
    /// Sources actually captured
    pub captured: CaptureRequest,
    pub layout: Option<VideoLayout>,
}

/// A primary source could not be acquired
#[derive(Debug, Clone)]
pub struct CaptureErrorEvent {
    pub error: DeviceError,
    /// Sources the failed request asked for
    pub failed: CaptureRequest,
}

impl CaptureErrorEvent {
    /// "Camera and Microphone", in a fixed order
    pub fn failed_devices(&self) -> String {
        describe_sources(&self.failed)
    }

    pub fn describe(&self) -> String {
        format!("Cannot capture {}. Error: {}", self.failed_devices(), self.error)
    }
}

/// Elapsed-time tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTime {
    pub elapsed: Duration,
    /// `mm:ss`, or `h:mm:ss` once past an hour
    pub formatted: String,
}

/// An event with its payload
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start(StartEvent),
    Stop(StopEvent),
    Pause,
    Resume,
    CaptureBefore(CaptureRequest),
    CaptureAfter(CaptureSuccessEvent),
    CaptureError(CaptureErrorEvent),
    UpdateRecordTime(RecordTime),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Start(_) => EventKind::Start,
            SessionEvent::Stop(_) => EventKind::Stop,
            SessionEvent::Pause => EventKind::Pause,
            SessionEvent::Resume => EventKind::Resume,
            SessionEvent::CaptureBefore(_) => EventKind::CaptureBefore,
            SessionEvent::CaptureAfter(_) => EventKind::CaptureAfter,
            SessionEvent::CaptureError(_) => EventKind::CaptureError,
            SessionEvent::UpdateRecordTime(_) => EventKind::UpdateRecordTime,
        }
    }
}

/// Listener registry, one list per event kind
#[derive(Default)]
pub struct EventHooks {
    start: Listeners<SessionEvent>,
    stop: Listeners<SessionEvent>,
    pause: Listeners<SessionEvent>,
    resume: Listeners<SessionEvent>,
    capture_before: Listeners<SessionEvent>,
    capture_after: Listeners<SessionEvent>,
    capture_error: Listeners<SessionEvent>,
    update_record_time: Listeners<SessionEvent>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self, kind: EventKind) -> &Listeners<SessionEvent> {
        match kind {
            EventKind::Start => &self.start,
            EventKind::Stop => &self.stop,
            EventKind::Pause => &self.pause,
            EventKind::Resume => &self.resume,
            EventKind::CaptureBefore => &self.capture_before,
            EventKind::CaptureAfter => &self.capture_after,
            EventKind::CaptureError => &self.capture_error,
            EventKind::UpdateRecordTime => &self.update_record_time,
        }
    }

    /// Register a listener for every event of `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.listeners(kind).add(handler);
    }

    /// Dispatch `event` to the listeners of its kind
    pub fn emit(&self, event: SessionEvent) -> usize {
        let kind = event.kind();
        let count = self.listeners(kind).emit(&event);
        tracing::debug!(event = %kind, listeners = count, "Dispatched session event");
        count
    }

    pub fn on_start<F>(&self, handler: F)
    where
        F: Fn(&StartEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Start, move |event| {
            if let SessionEvent::Start(payload) = event {
                handler(payload);
            }
        });
    }

    pub fn on_stop<F>(&self, handler: F)
    where
        F: Fn(&StopEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::Stop, move |event| {
            if let SessionEvent::Stop(payload) = event {
                handler(payload);
            }
        });
    }

    pub fn on_pause<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::Pause, move |_| handler());
    }

    pub fn on_resume<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::Resume, move |_| handler());
    }

    pub fn on_capture_before<F>(&self, handler: F)
    where
        F: Fn(&CaptureRequest) + Send + Sync + 'static,
    {
        self.on(EventKind::CaptureBefore, move |event| {
            if let SessionEvent::CaptureBefore(request) = event {
                handler(request);
            }
        });
    }

    pub fn on_capture_success<F>(&self, handler: F)
    where
        F: Fn(&CaptureSuccessEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::CaptureAfter, move |event| {
            if let SessionEvent::CaptureAfter(payload) = event {
                handler(payload);
            }
        });
    }

    pub fn on_capture_error<F>(&self, handler: F)
    where
        F: Fn(&CaptureErrorEvent) + Send + Sync + 'static,
    {
        self.on(EventKind::CaptureError, move |event| {
            if let SessionEvent::CaptureError(payload) = event {
                handler(payload);
            }
        });
    }

    pub fn on_update_record_time<F>(&self, handler: F)
    where
        F: Fn(&RecordTime) + Send + Sync + 'static,
    {
        self.on(EventKind::UpdateRecordTime, move |event| {
            if let SessionEvent::UpdateRecordTime(time) = event {
                handler(time);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_events_route_by_kind() {
        let hooks = EventHooks::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let log = log.clone();
            hooks.on_pause(move || log.lock().push("pause".to_string()));
        }
        {
            let log = log.clone();
            hooks.on_update_record_time(move |time| log.lock().push(time.formatted.clone()));
        }

        assert_eq!(hooks.emit(SessionEvent::Pause), 1);
        assert_eq!(hooks.emit(SessionEvent::Resume), 0);
        hooks.emit(SessionEvent::UpdateRecordTime(RecordTime {
            elapsed: Duration::from_secs(61),
            formatted: "01:01".to_string(),
        }));

        assert_eq!(*log.lock(), vec!["pause", "01:01"]);
    }

    #[test]
    fn test_capture_error_description() {
        let event = CaptureErrorEvent {
            error: DeviceError::NotFound("no camera".to_string()),
            failed: CaptureRequest {
                camera: true,
                microphone: true,
                ..Default::default()
            },
        };
        assert_eq!(event.failed_devices(), "Camera and Microphone");
        assert_eq!(
            event.describe(),
            "Cannot capture Camera and Microphone. Error: Device not found: no camera"
        );
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::CaptureBefore.to_string(), "capturebefore");
        assert_eq!(EventKind::UpdateRecordTime.to_string(), "updateRecordTime");
    }
}
