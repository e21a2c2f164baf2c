//! Seekable WebM rewrite
//!
//! Live encoders write WebM without a duration, which leaves players unable
//! to seek. This module walks the EBML structure of the finished output,
//! derives the duration from the last block timecode and rewrites the
//! segment Info with a Duration element. Seek and cue positions that point
//! past the Info element are shifted by the size change.

use std::time::Duration;
use thiserror::Error;

pub(crate) const EBML_HEADER: u32 = 0x1A45_DFA3;
pub(crate) const SEGMENT: u32 = 0x1853_8067;
pub(crate) const SEEK_HEAD: u32 = 0x114D_9B74;
pub(crate) const SEEK: u32 = 0x4DBB;
pub(crate) const SEEK_ID: u32 = 0x53AB;
pub(crate) const SEEK_POSITION: u32 = 0x53AC;
pub(crate) const INFO: u32 = 0x1549_A966;
pub(crate) const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub(crate) const DURATION: u32 = 0x4489;
pub(crate) const MUXING_APP: u32 = 0x4D80;
pub(crate) const TRACKS: u32 = 0x1654_AE6B;
pub(crate) const CUES: u32 = 0x1C53_BB6B;
pub(crate) const CUE_POINT: u32 = 0xBB;
pub(crate) const CUE_TIME: u32 = 0xB3;
pub(crate) const CUE_TRACK_POSITIONS: u32 = 0xB7;
pub(crate) const CUE_CLUSTER_POSITION: u32 = 0xF1;
pub(crate) const CLUSTER: u32 = 0x1F43_B675;
pub(crate) const TIMECODE: u32 = 0xE7;
pub(crate) const SIMPLE_BLOCK: u32 = 0xA3;
pub(crate) const BLOCK_GROUP: u32 = 0xA0;
pub(crate) const BLOCK: u32 = 0xA1;

const CHAPTERS: u32 = 0x1043_A770;
const TAGS: u32 = 0x1254_C367;
const ATTACHMENTS: u32 = 0x1941_A469;

/// Children of Segment; an unknown-size cluster ends where one of these starts
const LEVEL_ONE: [u32; 8] = [
    SEEK_HEAD,
    INFO,
    TRACKS,
    CUES,
    CLUSTER,
    CHAPTERS,
    TAGS,
    ATTACHMENTS,
];

const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Errors raised while rewriting a container
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Not an EBML container")]
    NotEbml,

    #[error("Container truncated at byte {0}")]
    Truncated(usize),

    #[error("Malformed element at byte {0}")]
    Malformed(usize),

    #[error("Missing {0} element")]
    MissingElement(&'static str),

    #[error("Position {0} does not fit its field after rewrite")]
    PositionOverflow(u64),
}

type ContainerResult<T> = Result<T, ContainerError>;

/// Location of one element in the input
#[derive(Debug, Clone, Copy)]
struct Span {
    id: u32,
    /// First byte of the ID
    start: usize,
    /// First byte of the payload
    data: usize,
    /// One past the last payload byte
    end: usize,
}

impl Span {
    fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.data..self.end]
    }
}

struct Header {
    id: u32,
    data: usize,
    size: Option<u64>,
}

fn read_id(bytes: &[u8], pos: usize) -> ContainerResult<(u32, usize)> {
    let first = *bytes.get(pos).ok_or(ContainerError::Truncated(pos))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return Err(ContainerError::Malformed(pos));
    }
    let raw = bytes
        .get(pos..pos + len)
        .ok_or(ContainerError::Truncated(pos))?;
    let id = raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    Ok((id, len))
}

/// Read a size vint. `None` means unknown size.
fn read_size(bytes: &[u8], pos: usize) -> ContainerResult<(Option<u64>, usize)> {
    let first = *bytes.get(pos).ok_or(ContainerError::Truncated(pos))?;
    if first == 0 {
        return Err(ContainerError::Malformed(pos));
    }
    let len = first.leading_zeros() as usize + 1;
    let raw = bytes
        .get(pos..pos + len)
        .ok_or(ContainerError::Truncated(pos))?;

    // An 8-byte vint carries no value bits in its first byte
    let mut value = if len == 8 {
        0
    } else {
        u64::from(first) & ((1u64 << (8 - len)) - 1)
    };
    for b in &raw[1..] {
        value = (value << 8) | u64::from(*b);
    }
    let all_ones = (1u64 << (7 * len)) - 1;
    Ok(((value != all_ones).then_some(value), len))
}

fn read_header(bytes: &[u8], pos: usize) -> ContainerResult<Header> {
    let (id, id_len) = read_id(bytes, pos)?;
    let (size, size_len) = read_size(bytes, pos + id_len)?;
    Ok(Header {
        id,
        data: pos + id_len + size_len,
        size,
    })
}

fn span_end(bytes: &[u8], start: usize, data: usize, size: u64, limit: usize) -> ContainerResult<usize> {
    let end = usize::try_from(size)
        .ok()
        .and_then(|size| data.checked_add(size))
        .ok_or(ContainerError::Malformed(start))?;
    if end > limit || end > bytes.len() {
        return Err(ContainerError::Truncated(start));
    }
    Ok(end)
}

/// Known-size children of `parent`
fn children(bytes: &[u8], parent: &Span) -> ContainerResult<Vec<Span>> {
    let mut spans = Vec::new();
    let mut pos = parent.data;
    while pos < parent.end {
        let header = read_header(bytes, pos)?;
        let size = header.size.ok_or(ContainerError::Malformed(pos))?;
        let end = span_end(bytes, pos, header.data, size, parent.end)?;
        spans.push(Span {
            id: header.id,
            start: pos,
            data: header.data,
            end,
        });
        pos = end;
    }
    Ok(spans)
}

/// Where an unknown-size cluster starting its payload at `from` ends
fn cluster_end(bytes: &[u8], from: usize, limit: usize) -> ContainerResult<usize> {
    let mut pos = from;
    while pos < limit {
        let (id, _) = read_id(bytes, pos)?;
        if LEVEL_ONE.contains(&id) {
            return Ok(pos);
        }
        let header = read_header(bytes, pos)?;
        let size = header.size.ok_or(ContainerError::Malformed(pos))?;
        pos = span_end(bytes, pos, header.data, size, limit)?;
    }
    Ok(limit)
}

fn read_uint(payload: &[u8]) -> u64 {
    payload.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn read_float(payload: &[u8], at: usize) -> ContainerResult<f64> {
    match payload.len() {
        4 => {
            let raw: [u8; 4] = payload.try_into().map_err(|_| ContainerError::Malformed(at))?;
            Ok(f64::from(f32::from_be_bytes(raw)))
        }
        8 => {
            let raw: [u8; 8] = payload.try_into().map_err(|_| ContainerError::Malformed(at))?;
            Ok(f64::from_be_bytes(raw))
        }
        0 => Ok(0.0),
        _ => Err(ContainerError::Malformed(at)),
    }
}

/// Overwrite a fixed-width unsigned integer payload
fn write_uint_fixed(field: &mut [u8], value: u64) -> ContainerResult<()> {
    let width = field.len();
    if width < 8 && value >> (8 * width) != 0 {
        return Err(ContainerError::PositionOverflow(value));
    }
    for (i, byte) in field.iter_mut().enumerate() {
        let shift = 8 * (width - 1 - i);
        *byte = if shift >= 64 { 0 } else { (value >> shift) as u8 };
    }
    Ok(())
}

pub(crate) fn encode_id(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(3);
    bytes[skip..].to_vec()
}

pub(crate) fn encode_size(size: u64) -> Vec<u8> {
    let len = (1..=8usize)
        .find(|len| size < (1u64 << (7 * len)) - 1)
        .unwrap_or(8);
    encode_size_with_width(size, len)
}

fn encode_size_with_width(size: u64, len: usize) -> Vec<u8> {
    let marked = if len == 8 { size | (1 << 56) } else { size | (1u64 << (7 * len)) };
    marked.to_be_bytes()[8 - len..].to_vec()
}

pub(crate) fn encode_element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = encode_id(id);
    out.extend(encode_size(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

/// Top-level structure of a WebM file
struct Layout {
    segment: Span,
    /// Size field of the Segment, `None` when unknown
    segment_size: Option<u64>,
    elements: Vec<Span>,
}

impl Layout {
    fn parse(bytes: &[u8]) -> ContainerResult<Self> {
        let (first, _) = read_id(bytes, 0).map_err(|_| ContainerError::NotEbml)?;
        if first != EBML_HEADER {
            return Err(ContainerError::NotEbml);
        }

        let mut pos = 0;
        let segment = loop {
            if pos >= bytes.len() {
                return Err(ContainerError::MissingElement("Segment"));
            }
            let header = read_header(bytes, pos)?;
            if header.id == SEGMENT {
                let end = match header.size {
                    Some(size) => span_end(bytes, pos, header.data, size, bytes.len())?,
                    None => bytes.len(),
                };
                break (
                    Span {
                        id: SEGMENT,
                        start: pos,
                        data: header.data,
                        end,
                    },
                    header.size,
                );
            }
            let size = header.size.ok_or(ContainerError::Malformed(pos))?;
            pos = span_end(bytes, pos, header.data, size, bytes.len())?;
        };
        let (segment, segment_size) = segment;

        let mut elements = Vec::new();
        let mut pos = segment.data;
        while pos < segment.end {
            let header = read_header(bytes, pos)?;
            let end = match header.size {
                Some(size) => span_end(bytes, pos, header.data, size, segment.end)?,
                None if header.id == CLUSTER => cluster_end(bytes, header.data, segment.end)?,
                None => return Err(ContainerError::Malformed(pos)),
            };
            elements.push(Span {
                id: header.id,
                start: pos,
                data: header.data,
                end,
            });
            pos = end;
        }

        Ok(Self {
            segment,
            segment_size,
            elements,
        })
    }

    fn find(&self, id: u32) -> Option<&Span> {
        self.elements.iter().find(|span| span.id == id)
    }

    fn all(&self, id: u32) -> impl Iterator<Item = &Span> {
        self.elements.iter().filter(move |span| span.id == id)
    }

    /// Offset of `span` relative to the segment payload
    fn relative(&self, span: &Span) -> u64 {
        (span.start - self.segment.data) as u64
    }

    /// Largest absolute block timecode, in timecode-scale units
    fn last_timecode(&self, bytes: &[u8]) -> ContainerResult<Option<i64>> {
        let mut last: Option<i64> = None;
        for cluster in self.all(CLUSTER) {
            let parts = children(bytes, cluster)?;
            let base = parts
                .iter()
                .find(|c| c.id == TIMECODE)
                .map(|c| read_uint(c.payload(bytes)) as i64)
                .unwrap_or(0);

            for part in &parts {
                let relative = match part.id {
                    SIMPLE_BLOCK => Some(block_timecode(bytes, part)?),
                    BLOCK_GROUP => match children(bytes, part)?.iter().find(|c| c.id == BLOCK) {
                        Some(block) => Some(block_timecode(bytes, block)?),
                        None => None,
                    },
                    _ => None,
                };
                if let Some(relative) = relative {
                    let absolute = base + i64::from(relative);
                    last = Some(last.map_or(absolute, |l| l.max(absolute)));
                }
            }
        }
        Ok(last)
    }
}

/// Relative timecode of a (Simple)Block: track number vint, then i16
fn block_timecode(bytes: &[u8], block: &Span) -> ContainerResult<i16> {
    let (_, track_len) = read_size(bytes, block.data)?;
    let at = block.data + track_len;
    if at + 2 > block.end {
        return Err(ContainerError::Truncated(block.start));
    }
    Ok(i16::from_be_bytes([bytes[at], bytes[at + 1]]))
}

fn timecode_scale(bytes: &[u8], info: &[Span]) -> u64 {
    info.iter()
        .find(|c| c.id == TIMECODE_SCALE)
        .map(|c| read_uint(c.payload(bytes)))
        .filter(|scale| *scale > 0)
        .unwrap_or(DEFAULT_TIMECODE_SCALE)
}

/// Shift a position field past the Info element by `delta`
fn shift_position(out: &mut [u8], field: &Span, info_offset: u64, delta: i64) -> ContainerResult<()> {
    let value = read_uint(field.payload(out));
    if value <= info_offset {
        return Ok(());
    }
    let shifted = u64::try_from(value as i64 + delta)
        .map_err(|_| ContainerError::PositionOverflow(value))?;
    write_uint_fixed(&mut out[field.data..field.end], shifted)
}

/// Embed the recording duration in a WebM file
///
/// The duration comes from the last block timecode; `fallback` is used when
/// the file carries no blocks.
pub fn make_seekable(bytes: &[u8], fallback: Option<Duration>) -> ContainerResult<Vec<u8>> {
    let layout = Layout::parse(bytes)?;
    let info = *layout
        .find(INFO)
        .ok_or(ContainerError::MissingElement("Info"))?;
    let info_children = children(bytes, &info)?;
    let scale = timecode_scale(bytes, &info_children);

    let duration = match layout.last_timecode(bytes)? {
        Some(last) => last.max(0) as f64,
        None => {
            let fallback = fallback.ok_or(ContainerError::MissingElement("Cluster"))?;
            fallback.as_nanos() as f64 / scale as f64
        }
    };

    let mut body = Vec::with_capacity(info.end - info.data + 11);
    for child in info_children.iter().filter(|c| c.id != DURATION) {
        body.extend_from_slice(&bytes[child.start..child.end]);
    }
    body.extend(encode_element(DURATION, &duration.to_be_bytes()));
    let rewritten = encode_element(INFO, &body);
    let delta = rewritten.len() as i64 - (info.end - info.start) as i64;
    let info_offset = layout.relative(&info);

    let mut out = bytes.to_vec();
    for seek_head in layout.all(SEEK_HEAD) {
        for seek in children(bytes, seek_head)?.iter().filter(|c| c.id == SEEK) {
            for field in children(bytes, seek)?.iter().filter(|c| c.id == SEEK_POSITION) {
                shift_position(&mut out, field, info_offset, delta)?;
            }
        }
    }
    for cues in layout.all(CUES) {
        for point in children(bytes, cues)?.iter().filter(|c| c.id == CUE_POINT) {
            for positions in children(bytes, point)?
                .iter()
                .filter(|c| c.id == CUE_TRACK_POSITIONS)
            {
                for field in children(bytes, positions)?
                    .iter()
                    .filter(|c| c.id == CUE_CLUSTER_POSITION)
                {
                    shift_position(&mut out, field, info_offset, delta)?;
                }
            }
        }
    }

    if let Some(size) = layout.segment_size {
        let (_, id_len) = read_id(bytes, layout.segment.start)?;
        let field = layout.segment.start + id_len..layout.segment.data;
        let resized = u64::try_from(size as i64 + delta)
            .map_err(|_| ContainerError::PositionOverflow(size))?;
        let width = field.len();
        if width < 8 && resized >= (1u64 << (7 * width)) - 1 {
            return Err(ContainerError::PositionOverflow(resized));
        }
        out[field].copy_from_slice(&encode_size_with_width(resized, width));
    }

    let mut result = Vec::with_capacity(out.len() + rewritten.len());
    result.extend_from_slice(&out[..info.start]);
    result.extend(rewritten);
    result.extend_from_slice(&out[info.end..]);

    tracing::debug!(
        duration,
        scale,
        delta,
        "Embedded duration in container"
    );
    Ok(result)
}

/// Duration stored in the Info element, if any
pub fn read_duration(bytes: &[u8]) -> ContainerResult<Option<Duration>> {
    let layout = Layout::parse(bytes)?;
    let info = layout
        .find(INFO)
        .ok_or(ContainerError::MissingElement("Info"))?;
    let info_children = children(bytes, info)?;
    let scale = timecode_scale(bytes, &info_children);

    let Some(field) = info_children.iter().find(|c| c.id == DURATION) else {
        return Ok(None);
    };
    let units = read_float(field.payload(bytes), field.start)?;
    Ok(Some(Duration::from_nanos((units * scale as f64) as u64)))
}
