//! Media probing via ffprobe.
//!
//! A read-only collaborator of the transcoding pipeline: given an input file,
//! it reports which stream indices exist per kind and the overall duration.
//! Its output is used upstream to populate the stream selection and default
//! parameter choices; the pipeline itself never re-validates it.

use crate::params::{StreamKind, StreamSelector};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: String,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Stream layout and duration of an input file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaProbe {
    /// Overall duration, when the container reports one.
    pub duration: Option<Duration>,
    /// Audio stream indices, in file order.
    pub audio_streams: Vec<u32>,
    /// Video stream indices, in file order. Attached pictures (cover art)
    /// are not playable video and are excluded.
    pub video_streams: Vec<u32>,
    /// Subtitle stream indices, in file order.
    pub subtitle_streams: Vec<u32>,
}

impl MediaProbe {
    /// Build a stream selection from the first stream of each kind.
    ///
    /// Video and subtitle streams are only selected when `include_video` is
    /// set; an audio-only output never maps them.
    pub fn selector(&self, include_video: bool) -> StreamSelector {
        let mut selector = StreamSelector::new();
        if let Some(&index) = self.audio_streams.first() {
            selector = selector.select(StreamKind::Audio, index);
        }
        if include_video {
            if let Some(&index) = self.video_streams.first() {
                selector = selector.select(StreamKind::Video, index);
            }
            if let Some(&index) = self.subtitle_streams.first() {
                selector = selector.select(StreamKind::Subtitle, index);
            }
        }
        selector
    }

    /// Whether the file has at least one playable stream.
    pub fn has_streams(&self) -> bool {
        !self.audio_streams.is_empty() || !self.video_streams.is_empty()
    }
}

/// Probe `input` with the given ffprobe binary.
pub fn probe(ffprobe: &Path, input: &Path) -> Result<MediaProbe> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(input)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", e.to_string()))?;
    Ok(parse_probe_output(parsed))
}

fn parse_probe_output(output: FfprobeOutput) -> MediaProbe {
    let duration = output
        .format
        .duration
        .and_then(|s| s.parse::<f64>().ok())
        .map(Duration::from_secs_f64);

    let mut probe = MediaProbe {
        duration,
        ..Default::default()
    };

    for stream in output.streams {
        match stream.codec_type.as_str() {
            "audio" => probe.audio_streams.push(stream.index),
            "video" if stream.disposition.attached_pic == 0 => {
                probe.video_streams.push(stream.index)
            }
            "subtitle" => probe.subtitle_streams.push(stream.index),
            _ => {}
        }
    }

    probe
}
