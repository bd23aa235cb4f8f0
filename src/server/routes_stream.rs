//! Transcoding stream route.
//!
//! `/api/stream` runs the whole pipeline for one client: probe the input,
//! build transcode parameters, then drive the streaming responder. Responder
//! invocations are blocking (they read a pipe and may reap a process), so
//! they run on the blocking pool; each delivered chunk crosses an mpsc
//! channel into the response body. The channel capacity is one chunk, so a
//! slow client suspends the pipeline instead of piling up encoder output.

use crate::server::AppContext;
use crate::streaming::responder::Error as StreamError;
use crate::streaming::{Outcome, StreamSummary, Transport};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonecast_av::{Encoding, MediaKind, TranscodeParameters};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Input media file path.
    input: String,
    /// Output encoding name (catalog key).
    format: String,
    /// Start offset in seconds.
    #[serde(default)]
    offset: u64,
    /// Target audio bitrate in bits per second.
    ab: Option<u32>,
    /// Target video bitrate in bits per second.
    vb: Option<u32>,
}

/// Transport for the first invocation: collects the MIME type and at most one
/// quota of body bytes before the response head is built.
#[derive(Default)]
struct BufferTransport {
    mime: Option<String>,
    body: Vec<u8>,
}

impl Transport for BufferTransport {
    fn set_mime_type(&mut self, mime: &str) {
        self.mime = Some(mime.to_string());
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }
}

/// Transport for follow-up invocations: hands chunks to the response body
/// channel. A dropped receiver means the client disconnected, which surfaces
/// as a failed write and drives the forced-termination teardown.
struct ChannelTransport {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl Transport for ChannelTransport {
    fn set_mime_type(&mut self, _mime: &str) {
        // The MIME type is declared on the first invocation, which uses
        // BufferTransport; resumed invocations never declare one.
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(data)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))?;
        Ok(data.len())
    }
}

/// Serve one transcoding stream.
pub async fn stream_media(
    State(ctx): State<AppContext>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, StatusCode> {
    let encoding: Encoding = query.format.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    let input = PathBuf::from(&query.input);
    if !input.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }

    // Probe the input to choose which streams to map.
    let ffprobe = ctx.ffprobe.clone();
    let probe_input = input.clone();
    let probe = tokio::task::spawn_blocking(move || tonecast_av::probe(&ffprobe, &probe_input))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|e| {
            tracing::warn!(error = %e, input = %query.input, "probe failed");
            StatusCode::UNPROCESSABLE_ENTITY
        })?;

    let params = TranscodeParameters::new(input, encoding)
        .with_streams(probe.selector(encoding.is_video()))
        .with_offset(Duration::from_secs(query.offset))
        .with_audio_bitrate(query.ab.unwrap_or(ctx.config.encoder.audio_bitrate))
        .with_video_bitrate(query.vb.unwrap_or(ctx.config.encoder.video_bitrate));

    // First invocation: input validation, encoder spawn, first chunk.
    let responder = ctx.responder.clone();
    let (first, outcome) = tokio::task::spawn_blocking(move || {
        let mut transport = BufferTransport::default();
        let outcome = responder.invoke(&params, None, &mut transport)?;
        Ok::<_, StreamError>((transport, outcome))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(|e| {
        tracing::warn!(error = %e, "failed to start transcode");
        status_for(&e)
    })?;

    let mime = first.mime.ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let first_chunk = Bytes::from(first.body);

    let body = match outcome {
        Outcome::Finished => Body::from(first_chunk),
        Outcome::Pending(token) => {
            let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(1);
            let responder = ctx.responder.clone();
            let registry = ctx.registry.clone();

            tokio::task::spawn_blocking(move || {
                let mut transport = ChannelTransport { tx };

                // Deliver the chunk from the first invocation; if the client
                // is already gone the continuation must still be released.
                if !first_chunk.is_empty() && transport.write(&first_chunk).is_err() {
                    registry.release(&token);
                    return;
                }

                loop {
                    match responder.resume(&token, &mut transport) {
                        Ok(Outcome::Pending(_)) => continue,
                        Ok(Outcome::Finished) => break,
                        Err(e) => {
                            tracing::debug!(error = %e, "stream ended early");
                            break;
                        }
                    }
                }
            });

            Body::from_stream(ReceiverStream::new(rx))
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn status_for(error: &StreamError) -> StatusCode {
    match error {
        StreamError::Encode(tonecast_av::Error::InvalidInput { .. }) => StatusCode::NOT_FOUND,
        StreamError::Encode(tonecast_av::Error::UnsupportedFormat { .. }) => {
            StatusCode::BAD_REQUEST
        }
        StreamError::UnknownContinuation(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Catalog entry as served by `/api/formats`.
#[derive(Debug, Serialize)]
pub struct FormatInfo {
    pub name: &'static str,
    pub kind: &'static str,
    pub mime_type: &'static str,
}

/// List the supported output formats.
pub async fn list_formats() -> Json<Vec<FormatInfo>> {
    let formats = Encoding::ALL
        .iter()
        .map(|encoding| {
            let spec = encoding.spec();
            FormatInfo {
                name: encoding.name(),
                kind: match spec.kind {
                    MediaKind::Audio => "audio",
                    MediaKind::Video => "video",
                },
                mime_type: spec.mime_type,
            }
        })
        .collect();
    Json(formats)
}

/// List the exchanges currently suspended behind a continuation.
pub async fn list_streams(State(ctx): State<AppContext>) -> Json<Vec<StreamSummary>> {
    Json(ctx.registry.summaries())
}
