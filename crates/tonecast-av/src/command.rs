//! Encoder command-line construction.
//!
//! Turns [`TranscodeParameters`] into an ordered argv token list. Tokens are
//! never joined into a shell string, so paths need no quoting and cannot be
//! reinterpreted by a shell.

use crate::format::MediaKind;
use crate::params::{StreamKind, TranscodeParameters};

/// Build the encoder argv for one transcoding request.
///
/// The output is deterministic: the same parameters always produce the same
/// token list. The seek flag, when present, precedes the input flag so the
/// encoder can seek instead of decoding from zero.
pub fn build_args(params: &TranscodeParameters) -> Vec<String> {
    let spec = params.encoding().spec();
    let mut args = Vec::new();

    // Input offset, before -i so the encoder seeks instead of decoding.
    let offset_secs = params.offset().as_secs();
    if offset_secs > 0 {
        args.push("-ss".to_string());
        args.push(offset_secs.to_string());
    }

    // Input file, as a single token.
    args.push("-i".to_string());
    args.push(params.input().to_string_lossy().into_owned());

    // Output bitrates.
    args.push("-b:a".to_string());
    args.push(params.audio_bitrate().to_string());
    if spec.kind == MediaKind::Video {
        args.push("-b:v".to_string());
        args.push(params.video_bitrate().to_string());
    }

    // Stream mapping. Subtitle passthrough is unsupported; subtitle entries
    // are dropped rather than rejected.
    for (kind, index) in params.streams().iter() {
        if kind == StreamKind::Subtitle {
            continue;
        }
        args.push("-map".to_string());
        args.push(format!("0:{index}"));
    }

    // Codecs, then container.
    args.extend(spec.codec_args.iter().map(|s| s.to_string()));
    args.extend(spec.container_args.iter().map(|s| s.to_string()));

    // Write the encoded stream to standard output.
    args.push("-".to_string());

    args
}
