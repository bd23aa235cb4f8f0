//! # tonecast-av
//!
//! Encoder process driving and media probing library for tonecast.
//!
//! This crate provides the pieces of the on-demand transcoding pipeline that
//! face the external encoder:
//! - A static format catalog mapping output encodings to encoder arguments
//!   and MIME types
//! - Immutable transcoding parameters and input stream selection
//! - Deterministic encoder command-line construction
//! - [`Transcoder`]: ownership of one encoder child process and incremental,
//!   bounded consumption of its output pipe
//! - ffprobe-based media probing to discover input stream layout
//!
//! All codec work is delegated to an external encoder binary; nothing here
//! decodes or encodes media in-process.
//!
//! ## Example
//!
//! ```no_run
//! use tonecast_av::{Encoding, SpawnLock, Transcoder, TranscodeParameters};
//! use std::path::Path;
//!
//! let params = TranscodeParameters::new("/music/track.flac", Encoding::Mp3);
//! let lock = SpawnLock::new();
//! let mut transcoder = Transcoder::spawn(Path::new("ffmpeg"), &params, &lock)?;
//! while !transcoder.is_complete() {
//!     transcoder.pump(4096);
//!     let chunk = transcoder.take_buffered();
//!     // deliver chunk to the consumer
//!     # drop(chunk);
//! }
//! # Ok::<(), tonecast_av::Error>(())
//! ```

mod error;
pub mod command;
pub mod format;
pub mod params;
pub mod probe;
pub mod tools;
pub mod transcoder;

// Re-exports
pub use command::build_args;
pub use error::{Error, Result};
pub use format::{Encoding, FormatSpec, MediaKind};
pub use params::{StreamKind, StreamSelector, TranscodeParameters};
pub use probe::MediaProbe;
pub use tools::{check_tool, check_tools, require_tool, resolve_tool, ToolInfo};
pub use transcoder::{EncoderChild, SpawnLock, Transcoder};

/// Probe a media file and return its stream layout and duration.
pub fn probe<F, P>(ffprobe: F, input: P) -> Result<MediaProbe>
where
    F: AsRef<std::path::Path>,
    P: AsRef<std::path::Path>,
{
    probe::probe(ffprobe.as_ref(), input.as_ref())
}
