//! Recording state management
//!
//! Defines the recording state machine and elapsed-time tracking.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Current state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session has been started
    #[default]
    Idle,
    /// Waiting for the platform to hand over the streams
    Capturing,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
    /// Output finalized
    Stopped,
    /// Session dropped without output
    Discarded,
}

impl RecordingState {
    /// An encoder is running (possibly paused)
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Paused)
    }
}

/// Elapsed recording time across pause/resume cycles
///
/// Time is an accumulator of finished segments plus the start of the
/// running one, so pausing and resuming continues the count instead of
/// resetting it.
#[derive(Debug, Clone, Default)]
pub struct ElapsedClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl ElapsedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or continue) counting from `now`
    pub fn start(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Stop counting, keeping the elapsed time
    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.accumulated + running
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }
}

/// Format as `mm:ss`, or `h:mm:ss` once an hour has passed
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours == 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(9_999)), "00:09");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3599)), "59:59");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(36_000 + 62)), "10:01:02");
    }

    #[test]
    fn test_pause_resume_preserves_elapsed() {
        let t0 = Instant::now();
        let mut clock = ElapsedClock::new();
        clock.start(t0);

        let t1 = t0 + Duration::from_secs(5);
        clock.pause(t1);
        assert_eq!(clock.elapsed(t1 + Duration::from_secs(30)), Duration::from_secs(5));

        let t2 = t1 + Duration::from_secs(30);
        clock.start(t2);
        let t3 = t2 + Duration::from_secs(7);
        assert_eq!(clock.elapsed(t3), Duration::from_secs(12));
    }

    #[test]
    fn test_double_start_keeps_origin() {
        let t0 = Instant::now();
        let mut clock = ElapsedClock::new();
        clock.start(t0);
        clock.start(t0 + Duration::from_secs(3));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(4)), Duration::from_secs(4));

        clock.reset();
        assert!(!clock.is_running());
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&RecordingState::Discarded).unwrap();
        assert_eq!(json, "\"discarded\"");
        assert!(RecordingState::Paused.is_active());
        assert!(!RecordingState::Stopped.is_active());
    }
}
