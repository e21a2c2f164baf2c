//! Audio level bars
//!
//! Draws a row of vertically centered bars whose heights follow the spectrum
//! of an audio stream, redrawn on every display frame.

use super::analysis::{AnalyserOptions, AudioAnalyser, AudioAnalysisBackend};
use crate::capture::stream::MediaStream;
use crate::recorder::encoder::RecordingResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Redraw period, about 60 frames per second
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Bar appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BarOptions {
    pub bar_width: f64,
    pub bar_spacing: f64,
    pub bar_count: usize,
    /// CSS color string
    pub bar_color: String,
    pub bar_min_height: f64,
}

impl Default for BarOptions {
    fn default() -> Self {
        Self {
            bar_width: 8.0,
            bar_spacing: 10.0,
            bar_count: 15,
            bar_color: "#ffffff".to_string(),
            bar_min_height: 8.0,
        }
    }
}

/// A filled rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Layout of the bars for one frame
///
/// Bar `i` reads level `levels[i * 2]`; missing levels count as silence.
/// The row is centered horizontally and each bar vertically.
pub fn compute_bars(levels: &[u8], width: f64, height: f64, options: &BarOptions) -> Vec<BarRect> {
    let stride = options.bar_width + options.bar_spacing;
    let start_x = (width - stride * options.bar_count as f64 + options.bar_spacing) / 2.0;
    let center_y = height / 2.0;

    (0..options.bar_count)
        .map(|i| {
            let level = levels.get(i * 2).copied().unwrap_or(0);
            let bar_height = (f64::from(level) / 255.0 * height).max(options.bar_min_height);
            BarRect {
                x: (start_x + stride * i as f64).floor(),
                y: (center_y - bar_height / 2.0).floor(),
                width: options.bar_width,
                height: bar_height.floor(),
            }
        })
        .collect()
}

/// Something the bars can be drawn on
pub trait DrawSurface: Send {
    /// Width and height in pixels
    fn size(&self) -> (f64, f64);

    fn set_fill_color(&mut self, color: &str);

    fn clear(&mut self);

    fn fill_rect(&mut self, rect: BarRect);
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Box<dyn DrawSurface>>,
}

/// Draws live level bars for an audio stream
#[derive(Default)]
pub struct AudioVisualizer {
    worker: Option<Worker>,
}

impl AudioVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start drawing `stream` onto `surface`
    ///
    /// A visualization already running is stopped first and its surface
    /// dropped.
    pub async fn start(
        &mut self,
        stream: &MediaStream,
        backend: &dyn AudioAnalysisBackend,
        surface: Box<dyn DrawSurface>,
        options: BarOptions,
    ) -> RecordingResult<()> {
        self.stop().await;

        let analyser = backend.open(stream, AnalyserOptions::meter()).await?;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(draw_loop(analyser, surface, options, shutdown_rx));
        self.worker = Some(Worker { shutdown, handle });
        tracing::debug!(stream = stream.id(), "Audio visualizer started");
        Ok(())
    }

    /// Stop drawing, clear the surface and hand it back
    ///
    /// Returns `None` when nothing was running.
    pub async fn stop(&mut self) -> Option<Box<dyn DrawSurface>> {
        let worker = self.worker.take()?;
        let _ = worker.shutdown.send(());
        match worker.handle.await {
            Ok(surface) => {
                tracing::debug!("Audio visualizer stopped");
                Some(surface)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Audio visualizer task ended abnormally");
                None
            }
        }
    }
}

async fn draw_loop(
    mut analyser: Box<dyn AudioAnalyser>,
    mut surface: Box<dyn DrawSurface>,
    options: BarOptions,
    mut shutdown: oneshot::Receiver<()>,
) -> Box<dyn DrawSurface> {
    let mut levels = vec![0u8; analyser.frequency_bin_count()];
    let mut frames = tokio::time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    surface.set_fill_color(&options.bar_color);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = frames.tick() => {
                analyser.byte_frequency_data(&mut levels);
                let (width, height) = surface.size();
                surface.clear();
                for bar in compute_bars(&levels, width, height, &options) {
                    surface.fill_rect(bar);
                }
            }
        }
    }

    surface.clear();
    analyser.close().await;
    surface
}
