//! Test doubles for the platform seams

use crate::audio::analysis::{AnalyserOptions, AudioAnalyser, AudioAnalysisBackend};
use crate::audio::visualizer::{BarRect, DrawSurface};
use crate::capture::acquirer::{CaptureSurface, StreamBundle};
use crate::capture::stream::{MediaStream, MediaTrack, TrackSettings};
use crate::capture::traits::{
    DeviceError, MediaConstraints, MediaDevices, PlatformCapabilities, PlatformFamily, Resolution,
};
use crate::recorder::encoder::{
    EncoderFactory, EncoderState, MediaEncoder, RecordedOutput, RecordingError, RecordingResult,
};
use crate::recorder::options::RecordOptions;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

type DenyRule = Box<dyn Fn(CaptureSurface, MediaConstraints) -> Option<DeviceError> + Send + Sync>;

/// Media devices that hand out synthetic streams
///
/// Display requests yield a 1920x1080 screen track, user requests a
/// 1280x720 camera track, each with an audio track when asked for.
pub struct FakeDevices {
    capabilities: PlatformCapabilities,
    deny: Option<DenyRule>,
    requests: Mutex<Vec<(CaptureSurface, MediaConstraints)>>,
    issued: Mutex<Vec<MediaStream>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::with_capabilities(PlatformCapabilities {
            family: PlatformFamily::Chromium,
            user_media: true,
            display_media: true,
        })
    }

    pub fn with_capabilities(capabilities: PlatformCapabilities) -> Self {
        Self {
            capabilities,
            deny: None,
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Fail requests for which `rule` returns an error
    pub fn deny<F>(mut self, rule: F) -> Self
    where
        F: Fn(CaptureSurface, MediaConstraints) -> Option<DeviceError> + Send + Sync + 'static,
    {
        self.deny = Some(Box::new(rule));
        self
    }

    /// Every request made, in order
    pub fn requests(&self) -> Vec<(CaptureSurface, MediaConstraints)> {
        self.requests.lock().clone()
    }

    /// Every stream handed out, in order
    pub fn issued(&self) -> Vec<MediaStream> {
        self.issued.lock().clone()
    }

    fn serve(
        &self,
        surface: CaptureSurface,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, DeviceError> {
        self.requests.lock().push((surface, constraints));
        if let Some(err) = self.deny.as_ref().and_then(|rule| rule(surface, constraints)) {
            return Err(err);
        }

        let mut tracks = Vec::new();
        match surface {
            CaptureSurface::Display => {
                if constraints.video {
                    tracks.push(MediaTrack::video("screen", TrackSettings::sized(1920, 1080)));
                }
                if constraints.audio {
                    tracks.push(MediaTrack::audio("system audio"));
                }
            }
            CaptureSurface::User => {
                if constraints.video {
                    tracks.push(MediaTrack::video("camera", TrackSettings::sized(1280, 720)));
                }
                if constraints.audio {
                    tracks.push(MediaTrack::audio("microphone"));
                }
            }
        }
        let stream = MediaStream::new(tracks);
        self.issued.lock().push(stream.clone());
        Ok(stream)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn screen_geometry(&self) -> Resolution {
        Resolution::FULL_HD
    }

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, DeviceError> {
        self.serve(CaptureSurface::User, constraints)
    }

    async fn get_display_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, DeviceError> {
        self.serve(CaptureSurface::Display, constraints)
    }
}

/// Encoder factory whose encoders log every call
#[derive(Default)]
pub struct FakeEncoderFactory {
    created: Mutex<Vec<RecordOptions>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
    output: Option<Vec<u8>>,
}

impl FakeEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoders finalize to `data` instead of a live WebM recording
    pub fn with_output(data: Vec<u8>) -> Self {
        Self {
            output: Some(data),
            ..Self::default()
        }
    }

    /// Options of every encoder created, in order
    pub fn created(&self) -> Vec<RecordOptions> {
        self.created.lock().clone()
    }

    /// Encoder method calls across all encoders
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create(
        &self,
        _streams: &StreamBundle,
        options: &RecordOptions,
    ) -> RecordingResult<Box<dyn MediaEncoder>> {
        self.created.lock().push(options.clone());
        Ok(Box::new(FakeEncoder {
            options: options.clone(),
            state: EncoderState::Inactive,
            output: None,
            data: self.output.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct FakeEncoder {
    options: RecordOptions,
    state: EncoderState,
    output: Option<Arc<RecordedOutput>>,
    data: Option<Vec<u8>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeEncoder {
    fn transition(
        &mut self,
        call: &'static str,
        from: EncoderState,
        to: EncoderState,
    ) -> RecordingResult<()> {
        if self.state != from {
            return Err(RecordingError::Encoder(format!(
                "cannot {call} while {:?}",
                self.state
            )));
        }
        self.calls.lock().push(call);
        self.state = to;
        Ok(())
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn start(&mut self) -> RecordingResult<Option<MediaStream>> {
        self.transition("start", EncoderState::Inactive, EncoderState::Recording)?;
        let preview = self.options.video.map(|video| {
            MediaStream::new(vec![MediaTrack::video(
                "preview",
                TrackSettings::sized(video.width, video.height),
            )])
        });
        Ok(preview)
    }

    fn pause(&mut self) -> RecordingResult<()> {
        self.transition("pause", EncoderState::Recording, EncoderState::Paused)
    }

    fn resume(&mut self) -> RecordingResult<()> {
        self.transition("resume", EncoderState::Paused, EncoderState::Recording)
    }

    async fn stop(&mut self) -> RecordingResult<Arc<RecordedOutput>> {
        self.calls.lock().push("stop");
        self.state = EncoderState::Stopped;
        let data = self
            .data
            .clone()
            .unwrap_or_else(|| webm::live_recording(&[(0, &[0, 40, 80]), (1000, &[0, 480])]));
        let output = Arc::new(RecordedOutput::new(data, self.options.mime_type.clone()));
        self.output = Some(output.clone());
        Ok(output)
    }

    fn state(&self) -> EncoderState {
        self.state
    }

    fn output(&self) -> Option<Arc<RecordedOutput>> {
        self.output.clone()
    }

    fn reset(&mut self) {
        self.calls.lock().push("reset");
        self.output = None;
    }

    fn destroy(&mut self) {
        self.calls.lock().push("destroy");
        self.state = EncoderState::Inactive;
    }
}

struct Levels {
    decibels: f32,
    bytes: u8,
    open: usize,
}

/// Analysis backend reporting a flat spectrum set by the test
#[derive(Clone)]
pub struct FakeAnalysisBackend {
    levels: Arc<Mutex<Levels>>,
}

impl FakeAnalysisBackend {
    pub fn new() -> Self {
        Self {
            levels: Arc::new(Mutex::new(Levels {
                decibels: -100.0,
                bytes: 0,
                open: 0,
            })),
        }
    }

    /// Level of every bin in decibels
    pub fn set_level(&self, decibels: f32) {
        self.levels.lock().decibels = decibels;
    }

    /// Level of every bin on the 0..=255 scale
    pub fn set_bytes(&self, bytes: u8) {
        self.levels.lock().bytes = bytes;
    }

    /// Any analyser is still attached
    pub fn is_open(&self) -> bool {
        self.levels.lock().open > 0
    }
}

#[async_trait]
impl AudioAnalysisBackend for FakeAnalysisBackend {
    async fn open(
        &self,
        _stream: &MediaStream,
        options: AnalyserOptions,
    ) -> RecordingResult<Box<dyn AudioAnalyser>> {
        self.levels.lock().open += 1;
        Ok(Box::new(FakeAnalyser {
            levels: self.levels.clone(),
            bins: options.frequency_bin_count(),
            closed: false,
        }))
    }
}

struct FakeAnalyser {
    levels: Arc<Mutex<Levels>>,
    bins: usize,
    closed: bool,
}

#[async_trait]
impl AudioAnalyser for FakeAnalyser {
    fn frequency_bin_count(&self) -> usize {
        self.bins
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        out.fill(self.levels.lock().bytes);
    }

    fn float_frequency_data(&mut self, out: &mut [f32]) {
        out.fill(self.levels.lock().decibels);
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.levels.lock().open -= 1;
        }
    }
}

/// A drawing call made on a [`RecordingSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Fill(String),
    Clear,
    Rect(BarRect),
}

/// Surface that logs drawing calls
pub struct RecordingSurface {
    width: f64,
    height: f64,
    ops: Arc<Mutex<Vec<DrawOp>>>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ops(&self) -> Arc<Mutex<Vec<DrawOp>>> {
        self.ops.clone()
    }
}

impl DrawSurface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn set_fill_color(&mut self, color: &str) {
        self.ops.lock().push(DrawOp::Fill(color.to_string()));
    }

    fn clear(&mut self) {
        self.ops.lock().push(DrawOp::Clear);
    }

    fn fill_rect(&mut self, rect: BarRect) {
        self.ops.lock().push(DrawOp::Rect(rect));
    }
}

/// Synthetic WebM files
pub mod webm {
    use crate::export::seekable::{
        encode_element, encode_id, CLUSTER, CUES, CUE_CLUSTER_POSITION, CUE_POINT, CUE_TIME,
        CUE_TRACK_POSITIONS, EBML_HEADER, INFO, MUXING_APP, SEEK, SEEK_HEAD, SEEK_ID,
        SEEK_POSITION, SEGMENT, SIMPLE_BLOCK, TIMECODE, TIMECODE_SCALE, TRACKS,
    };

    const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

    fn uint(id: u32, value: u64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
        encode_element(id, &bytes[skip..])
    }

    fn fixed_uint(id: u32, value: u64, width: usize) -> Vec<u8> {
        encode_element(id, &value.to_be_bytes()[8 - width..])
    }

    fn header() -> Vec<u8> {
        let body = [
            uint(0x4286, 1),
            uint(0x42F7, 1),
            encode_element(0x4282, b"webm"),
        ]
        .concat();
        encode_element(EBML_HEADER, &body)
    }

    fn info() -> Vec<u8> {
        let body = [
            uint(TIMECODE_SCALE, 1_000_000),
            encode_element(MUXING_APP, b"Chrome"),
        ]
        .concat();
        encode_element(INFO, &body)
    }

    fn tracks() -> Vec<u8> {
        let entry = [uint(0xD7, 1), uint(0x83, 1)].concat();
        encode_element(TRACKS, &encode_element(0xAE, &entry))
    }

    fn simple_block(timecode: i16) -> Vec<u8> {
        let mut body = vec![0x81];
        body.extend(timecode.to_be_bytes());
        body.push(0x80);
        body.extend([0u8; 4]);
        encode_element(SIMPLE_BLOCK, &body)
    }

    fn cluster_body(timecode: u64, blocks: &[i16]) -> Vec<u8> {
        let mut body = uint(TIMECODE, timecode);
        for block in blocks {
            body.extend(simple_block(*block));
        }
        body
    }

    /// What a live encoder writes: unknown-size segment and clusters, no
    /// duration, no index
    pub fn live_recording(clusters: &[(u64, &[i16])]) -> Vec<u8> {
        let mut out = header();
        out.extend(encode_id(SEGMENT));
        out.extend(UNKNOWN_SIZE);
        out.extend(info());
        out.extend(tracks());
        for (timecode, blocks) in clusters {
            out.extend(encode_id(CLUSTER));
            out.extend(UNKNOWN_SIZE);
            out.extend(cluster_body(*timecode, blocks));
        }
        out
    }

    fn seek_head(info: u64, tracks: u64, cues: u64) -> Vec<u8> {
        let entry = |id: u32, position: u64| {
            let body = [
                encode_element(SEEK_ID, &encode_id(id)),
                fixed_uint(SEEK_POSITION, position, 4),
            ]
            .concat();
            encode_element(SEEK, &body)
        };
        let body = [entry(INFO, info), entry(TRACKS, tracks), entry(CUES, cues)].concat();
        encode_element(SEEK_HEAD, &body)
    }

    /// A fully indexed file: known sizes, SeekHead first and Cues last
    pub fn indexed_recording(clusters: &[(u64, &[i16])]) -> Vec<u8> {
        let info = info();
        let tracks = tracks();
        let encoded: Vec<Vec<u8>> = clusters
            .iter()
            .map(|(timecode, blocks)| encode_element(CLUSTER, &cluster_body(*timecode, blocks)))
            .collect();

        let info_pos = seek_head(0, 0, 0).len() as u64;
        let tracks_pos = info_pos + info.len() as u64;
        let mut cluster_positions = Vec::new();
        let mut pos = tracks_pos + tracks.len() as u64;
        for cluster in &encoded {
            cluster_positions.push(pos);
            pos += cluster.len() as u64;
        }
        let cues_pos = pos;

        let mut cue_points = Vec::new();
        for ((timecode, _), position) in clusters.iter().zip(&cluster_positions) {
            let track_positions = [uint(0xF7, 1), fixed_uint(CUE_CLUSTER_POSITION, *position, 4)].concat();
            let point = [
                uint(CUE_TIME, *timecode),
                encode_element(CUE_TRACK_POSITIONS, &track_positions),
            ]
            .concat();
            cue_points.extend(encode_element(CUE_POINT, &point));
        }

        let mut body = seek_head(info_pos, tracks_pos, cues_pos);
        body.extend(info);
        body.extend(tracks);
        for cluster in encoded {
            body.extend(cluster);
        }
        body.extend(encode_element(CUES, &cue_points));

        let mut out = header();
        out.extend(encode_element(SEGMENT, &body));
        out
    }
}
