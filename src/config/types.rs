use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// Path to the encoder binary (falls back to `ffmpeg` on PATH).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Path to the probe binary (falls back to `ffprobe` on PATH).
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Default target audio bitrate in bits per second.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    /// Default target video bitrate in bits per second.
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u32,
}

fn default_audio_bitrate() -> u32 {
    128_000
}
fn default_video_bitrate() -> u32 {
    500_000
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            path: None,
            ffprobe_path: None,
            audio_bitrate: default_audio_bitrate(),
            video_bitrate: default_video_bitrate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Per-invocation byte quota: how much output one round trip may pump
    /// and deliver. Bounds both memory use and per-call latency.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,

    /// Seconds after which a continuation whose client has not returned is
    /// released and its encoder terminated.
    #[serde(default = "default_continuation_expiry")]
    pub continuation_expiry_secs: u64,

    /// How often the expiry sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_quota_bytes() -> usize {
    65_536
}
fn default_continuation_expiry() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    30
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
            continuation_expiry_secs: default_continuation_expiry(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}
