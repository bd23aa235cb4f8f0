//! Output format catalog.
//!
//! Maps a requested output encoding to the encoder arguments, media kind and
//! MIME type needed to produce it. The catalog is static; an encoding that is
//! not listed here is rejected when the request is parsed, never defaulted.

use crate::{Error, Result};

/// Kind of media an encoding produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio-only output.
    Audio,
    /// Video output (carries an audio track as well).
    Video,
}

/// Supported output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// MPEG-1 Layer III audio
    Mp3,
    /// Vorbis audio in Ogg
    Oga,
    /// Theora/Vorbis video in Ogg
    Ogv,
    /// Vorbis audio in WebM
    Webma,
    /// VP8/Vorbis video in WebM
    Webmv,
    /// AAC audio in MP4
    M4a,
    /// H.264/AAC video in M4V
    M4v,
    /// H.264/MP3 video in FLV
    Flv,
}

/// Catalog entry for one output encoding.
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
    /// Codec selection arguments (empty when the container default applies).
    pub codec_args: &'static [&'static str],
    /// Container selection arguments.
    pub container_args: &'static [&'static str],
    /// Whether the output carries video.
    pub kind: MediaKind,
    /// MIME type to declare on the response.
    pub mime_type: &'static str,
}

impl Encoding {
    /// All encodings with a catalog entry.
    pub const ALL: [Encoding; 8] = [
        Encoding::Mp3,
        Encoding::Oga,
        Encoding::Ogv,
        Encoding::Webma,
        Encoding::Webmv,
        Encoding::M4a,
        Encoding::M4v,
        Encoding::Flv,
    ];

    /// Get the catalog entry for this encoding.
    pub fn spec(&self) -> &'static FormatSpec {
        match self {
            Encoding::Mp3 => &FormatSpec {
                codec_args: &[],
                container_args: &["-f", "mp3"],
                kind: MediaKind::Audio,
                mime_type: "audio/mpeg",
            },
            Encoding::Oga => &FormatSpec {
                codec_args: &["-acodec", "libvorbis"],
                container_args: &["-f", "ogg"],
                kind: MediaKind::Audio,
                mime_type: "audio/ogg",
            },
            Encoding::Ogv => &FormatSpec {
                codec_args: &[
                    "-acodec",
                    "libvorbis",
                    "-ac",
                    "2",
                    "-ar",
                    "44100",
                    "-vcodec",
                    "libtheora",
                    "-threads",
                    "4",
                ],
                container_args: &["-f", "ogg"],
                kind: MediaKind::Video,
                mime_type: "video/ogg",
            },
            Encoding::Webma => &FormatSpec {
                codec_args: &["-codec:a", "libvorbis"],
                container_args: &["-f", "webm"],
                kind: MediaKind::Audio,
                mime_type: "audio/webm",
            },
            Encoding::Webmv => &FormatSpec {
                codec_args: &[
                    "-acodec",
                    "libvorbis",
                    "-ac",
                    "2",
                    "-ar",
                    "44100",
                    "-vcodec",
                    "libvpx",
                    "-threads",
                    "4",
                ],
                container_args: &["-f", "webm"],
                kind: MediaKind::Video,
                mime_type: "video/webm",
            },
            Encoding::M4a => &FormatSpec {
                codec_args: &["-acodec", "aac"],
                container_args: &["-f", "mp4"],
                kind: MediaKind::Audio,
                mime_type: "audio/mp4",
            },
            Encoding::M4v => &FormatSpec {
                codec_args: &[
                    "-acodec",
                    "aac",
                    "-strict",
                    "experimental",
                    "-ac",
                    "2",
                    "-ar",
                    "44100",
                    "-vcodec",
                    "libx264",
                ],
                container_args: &["-f", "m4v"],
                kind: MediaKind::Video,
                mime_type: "video/mp4",
            },
            Encoding::Flv => &FormatSpec {
                codec_args: &[
                    "-acodec",
                    "libmp3lame",
                    "-ac",
                    "2",
                    "-ar",
                    "44100",
                    "-vcodec",
                    "libx264",
                ],
                container_args: &["-f", "flv"],
                kind: MediaKind::Video,
                mime_type: "video/x-flv",
            },
        }
    }

    /// Get the canonical lowercase name of this encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Mp3 => "mp3",
            Encoding::Oga => "oga",
            Encoding::Ogv => "ogv",
            Encoding::Webma => "webma",
            Encoding::Webmv => "webmv",
            Encoding::M4a => "m4a",
            Encoding::M4v => "m4v",
            Encoding::Flv => "flv",
        }
    }

    /// Whether the output carries video.
    pub fn is_video(&self) -> bool {
        self.spec().kind == MediaKind::Video
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Encoding::Mp3),
            "oga" | "ogg" => Ok(Encoding::Oga),
            "ogv" => Ok(Encoding::Ogv),
            "webma" => Ok(Encoding::Webma),
            "webmv" | "webm" => Ok(Encoding::Webmv),
            "m4a" => Ok(Encoding::M4a),
            "m4v" => Ok(Encoding::M4v),
            "flv" => Ok(Encoding::Flv),
            other => Err(Error::unsupported_format(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_encodings() {
        assert_eq!("mp3".parse::<Encoding>().unwrap(), Encoding::Mp3);
        assert_eq!("MP3".parse::<Encoding>().unwrap(), Encoding::Mp3);
        assert_eq!("webmv".parse::<Encoding>().unwrap(), Encoding::Webmv);
        assert_eq!("ogg".parse::<Encoding>().unwrap(), Encoding::Oga);
    }

    #[test]
    fn test_resolve_unknown_encoding() {
        let err = "wav".parse::<Encoding>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { encoding } if encoding == "wav"));
    }

    #[test]
    fn test_media_kinds() {
        assert_eq!(Encoding::Mp3.spec().kind, MediaKind::Audio);
        assert_eq!(Encoding::M4a.spec().kind, MediaKind::Audio);
        assert_eq!(Encoding::Ogv.spec().kind, MediaKind::Video);
        assert_eq!(Encoding::Flv.spec().kind, MediaKind::Video);
        assert!(!Encoding::Webma.is_video());
        assert!(Encoding::Webmv.is_video());
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(Encoding::Mp3.spec().mime_type, "audio/mpeg");
        assert_eq!(Encoding::Webma.spec().mime_type, "audio/webm");
        assert_eq!(Encoding::M4v.spec().mime_type, "video/mp4");
    }

    #[test]
    fn test_container_args_always_present() {
        for enc in Encoding::ALL {
            assert!(
                enc.spec().container_args.contains(&"-f"),
                "{enc} is missing a container flag"
            );
        }
    }
}
