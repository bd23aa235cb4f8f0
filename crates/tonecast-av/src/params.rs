//! Transcoding request parameters.

use crate::format::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default audio bitrate in bits per second.
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;

/// Default video bitrate in bits per second.
pub const DEFAULT_VIDEO_BITRATE: u32 = 500_000;

/// Kind of an input media stream.
///
/// Ordered so that selector iteration (and therefore argv construction) is
/// reproducible across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Audio,
    Video,
    Subtitle,
}

/// Chosen mapping of input streams to include in the output.
///
/// One source stream index per kind, produced upstream from a media probe and
/// consumed read-only by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelector(BTreeMap<StreamKind, u32>);

impl StreamSelector {
    /// Create an empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the source stream index for a kind, replacing any previous choice.
    pub fn select(mut self, kind: StreamKind, index: u32) -> Self {
        self.0.insert(kind, index);
        self
    }

    /// Get the selected index for a kind.
    pub fn get(&self, kind: StreamKind) -> Option<u32> {
        self.0.get(&kind).copied()
    }

    /// Iterate over the selected streams in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (StreamKind, u32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Number of selected streams.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no stream has been selected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Immutable description of one transcoding request.
///
/// Constructed once per request and owned by a single [`Transcoder`] for its
/// lifetime.
///
/// [`Transcoder`]: crate::transcoder::Transcoder
#[derive(Debug, Clone)]
pub struct TranscodeParameters {
    input: PathBuf,
    streams: StreamSelector,
    offset: Duration,
    encoding: Encoding,
    audio_bitrate: u32,
    video_bitrate: u32,
}

impl TranscodeParameters {
    /// Create parameters for transcoding `input` to `encoding`, with default
    /// bitrates, no offset and no stream selection.
    pub fn new(input: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            input: input.into(),
            streams: StreamSelector::new(),
            offset: Duration::ZERO,
            encoding,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            video_bitrate: DEFAULT_VIDEO_BITRATE,
        }
    }

    /// Set the start offset into the input.
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    /// Set the stream selection.
    pub fn with_streams(mut self, streams: StreamSelector) -> Self {
        self.streams = streams;
        self
    }

    /// Set the target audio bitrate in bits per second.
    pub fn with_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    /// Set the target video bitrate in bits per second.
    ///
    /// Only meaningful when the output encoding carries video.
    pub fn with_video_bitrate(mut self, bitrate: u32) -> Self {
        self.video_bitrate = bitrate;
        self
    }

    /// Path of the input media file.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Selected input streams.
    pub fn streams(&self) -> &StreamSelector {
        &self.streams
    }

    /// Start offset into the input.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Requested output encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Target audio bitrate in bits per second.
    pub fn audio_bitrate(&self) -> u32 {
        self.audio_bitrate
    }

    /// Target video bitrate in bits per second.
    pub fn video_bitrate(&self) -> u32 {
        self.video_bitrate
    }
}
