//! Quota-bounded delivery of encoder output across suspended round trips.
//!
//! The responder bridges a [`Transcoder`] to a request/response exchange
//! whose total output size is unknown up front. Each invocation pumps at most
//! one quota of bytes, writes them to the transport, and either suspends the
//! exchange behind a continuation token or finishes it. A slow client
//! therefore governs how much transcoding work gets done, and memory use per
//! exchange never exceeds one quota.

use crate::streaming::registry::{ActiveStream, StreamRegistry};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tonecast_av::{SpawnLock, TranscodeParameters, Transcoder};
use tracing::{debug, warn};

/// Result type alias using the streaming Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a responder invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Starting the transcode failed (bad input, unknown format, spawn
    /// failure). The exchange never produced any bytes.
    #[error(transparent)]
    Encode(#[from] tonecast_av::Error),

    /// Writing buffered bytes to the client failed. Bytes already delivered
    /// are not rolled back; the exchange is over and the transcoder has been
    /// torn down.
    #[error("transport write failed after {written} bytes")]
    TransportWriteFailed { written: usize },

    /// The continuation token does not reference a live transcode.
    #[error("unknown continuation: {0}")]
    UnknownContinuation(String),
}

/// Where one invocation's bytes go.
///
/// Implemented by the HTTP body adapter in production and by in-memory
/// recorders in tests.
pub trait Transport {
    /// Declare the response MIME type. Invoked exactly once per exchange, on
    /// the first invocation, before any body bytes are written.
    fn set_mime_type(&mut self, mime: &str);

    /// Write bytes to the client, returning how many were accepted. `Ok(0)`
    /// means the client is not accepting any more data.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// What an invocation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// More data is pending; resume with this continuation token.
    Pending(String),
    /// All bytes were delivered and the transcoder has been released.
    Finished,
}

impl Outcome {
    /// The continuation token, when the exchange is suspended.
    pub fn continuation(&self) -> Option<&str> {
        match self {
            Outcome::Pending(token) => Some(token),
            Outcome::Finished => None,
        }
    }
}

/// Drives transcoders on behalf of request/response exchanges.
pub struct StreamingResponder {
    registry: StreamRegistry,
    encoder: PathBuf,
    spawn_lock: SpawnLock,
    quota: usize,
}

impl StreamingResponder {
    /// Create a responder spawning `encoder` binaries, delivering at most
    /// `quota` bytes per invocation.
    pub fn new(registry: StreamRegistry, encoder: PathBuf, quota: usize) -> Self {
        Self {
            registry,
            encoder,
            spawn_lock: SpawnLock::new(),
            quota,
        }
    }

    /// One invocation of the exchange: start a transcode or resume the one
    /// behind `continuation`, then deliver up to one quota of bytes.
    pub fn invoke<T: Transport>(
        &self,
        params: &TranscodeParameters,
        continuation: Option<&str>,
        transport: &mut T,
    ) -> Result<Outcome> {
        match continuation {
            Some(token) => self.resume(token, transport),
            None => self.start(params, transport),
        }
    }

    /// First invocation: spawn the encoder and declare the MIME type.
    pub fn start<T: Transport>(
        &self,
        params: &TranscodeParameters,
        transport: &mut T,
    ) -> Result<Outcome> {
        let transcoder = Transcoder::spawn(&self.encoder, params, &self.spawn_lock)?;
        self.start_prepared(transcoder, params.encoding().spec().mime_type, transport)
    }

    /// First invocation against an already-spawned transcoder.
    pub fn start_prepared<T: Transport>(
        &self,
        transcoder: Transcoder,
        mime_type: &str,
        transport: &mut T,
    ) -> Result<Outcome> {
        transport.set_mime_type(mime_type);
        let entry = self.registry.register(transcoder);
        self.drive(&entry, transport)
    }

    /// Follow-up invocation: recover the suspended transcoder. The MIME type
    /// is not re-declared.
    pub fn resume<T: Transport>(&self, token: &str, transport: &mut T) -> Result<Outcome> {
        let entry = self
            .registry
            .resolve(token)
            .ok_or_else(|| Error::UnknownContinuation(token.to_string()))?;
        self.drive(&entry, transport)
    }

    fn drive<T: Transport>(&self, entry: &Arc<ActiveStream>, transport: &mut T) -> Result<Outcome> {
        let mut transcoder = entry.transcoder.lock();

        // Pump until the transcode is done or one quota is buffered.
        while !transcoder.is_complete() && transcoder.buffered().len() < self.quota {
            let want = self.quota - transcoder.buffered().len();
            if transcoder.pump(want) == 0 {
                break;
            }
        }

        // Deliver, consuming only what the transport accepted. Anything the
        // client did not take stays buffered for the next invocation.
        let mut written = 0;
        let mut write_failed = false;
        while !transcoder.buffered().is_empty() {
            match transport.write(transcoder.buffered()) {
                Ok(0) => {
                    write_failed = true;
                    break;
                }
                Ok(n) => {
                    transcoder.consume(n);
                    written += n;
                }
                Err(e) => {
                    warn!(error = %e, "write to client failed");
                    write_failed = true;
                    break;
                }
            }
        }

        let complete = transcoder.is_complete();
        drop(transcoder);

        debug!(token = entry.id(), bytes = written, "delivered chunk");

        if write_failed {
            // The client is gone; release the continuation, which terminates
            // a still-running encoder.
            self.registry.release(entry.id());
            return Err(Error::TransportWriteFailed { written });
        }

        if complete {
            self.registry.release(entry.id());
            Ok(Outcome::Finished)
        } else {
            Ok(Outcome::Pending(entry.id().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::sync::Mutex;
    use tonecast_av::EncoderChild;

    #[derive(Clone, Default)]
    struct MockChild {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MockChild {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EncoderChild for MockChild {
        fn wait(&mut self) -> io::Result<ExitStatus> {
            self.events.lock().unwrap().push("wait");
            Ok(ExitStatus::from_raw(0))
        }

        fn kill(&mut self) -> io::Result<()> {
            self.events.lock().unwrap().push("kill");
            Ok(())
        }
    }

    /// Transport recording everything; can be told to refuse writes.
    #[derive(Default)]
    struct MockTransport {
        mime: Option<String>,
        body: Vec<u8>,
        fail_writes: bool,
    }

    impl Transport for MockTransport {
        fn set_mime_type(&mut self, mime: &str) {
            assert!(self.mime.is_none(), "MIME type declared twice");
            self.mime = Some(mime.to_string());
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"));
            }
            self.body.extend_from_slice(data);
            Ok(data.len())
        }
    }

    fn mock_transcoder(total_bytes: usize) -> (Transcoder, MockChild) {
        let child = MockChild::default();
        let data: Vec<u8> = (0..total_bytes).map(|i| (i % 251) as u8).collect();
        let t = Transcoder::from_process(Box::new(child.clone()), Box::new(Cursor::new(data)));
        (t, child)
    }

    fn responder(quota: usize) -> StreamingResponder {
        StreamingResponder::new(StreamRegistry::new(60), PathBuf::from("ffmpeg"), quota)
    }

    #[test]
    fn test_exchange_completes_in_quota_sized_rounds() {
        // 10 000 bytes at a 4 096-byte quota: three invocations, with a
        // continuation after the first two only.
        let responder = responder(4096);
        let (transcoder, _child) = mock_transcoder(10_000);
        let mut transport = MockTransport::default();

        let outcome = responder
            .start_prepared(transcoder, "audio/mpeg", &mut transport)
            .unwrap();
        let token = outcome.continuation().expect("first round must suspend").to_string();
        assert_eq!(transport.body.len(), 4096);

        let outcome = responder.resume(&token, &mut transport).unwrap();
        assert_eq!(outcome.continuation(), Some(token.as_str()));
        assert_eq!(transport.body.len(), 8192);

        let outcome = responder.resume(&token, &mut transport).unwrap();
        assert_eq!(outcome, Outcome::Finished);
        assert_eq!(transport.body.len(), 10_000);

        // Continuation is gone once the exchange finished.
        assert!(matches!(
            responder.resume(&token, &mut transport),
            Err(Error::UnknownContinuation(_))
        ));
        assert!(responder.registry.is_empty());
    }

    #[test]
    fn test_mime_type_set_once_on_first_invocation() {
        let responder = responder(4096);
        let (transcoder, _child) = mock_transcoder(10_000);
        let mut transport = MockTransport::default();

        let outcome = responder
            .start_prepared(transcoder, "audio/ogg", &mut transport)
            .unwrap();
        assert_eq!(transport.mime.as_deref(), Some("audio/ogg"));

        // Resumes must not re-declare it; MockTransport panics if they do.
        let token = outcome.continuation().unwrap().to_string();
        responder.resume(&token, &mut transport).unwrap();
        assert_eq!(transport.mime.as_deref(), Some("audio/ogg"));
    }

    #[test]
    fn test_bytes_delivered_in_order_without_duplication() {
        let responder = responder(1000);
        let (transcoder, _child) = mock_transcoder(3500);
        let mut transport = MockTransport::default();

        let mut outcome = responder
            .start_prepared(transcoder, "audio/mpeg", &mut transport)
            .unwrap();
        let mut rounds = 1;
        while let Some(token) = outcome.continuation().map(str::to_string) {
            outcome = responder.resume(&token, &mut transport).unwrap();
            rounds += 1;
        }

        assert_eq!(rounds, 4);
        let expected: Vec<u8> = (0..3500).map(|i| (i % 251) as u8).collect();
        assert_eq!(transport.body, expected);
    }

    #[test]
    fn test_write_failure_terminates_running_encoder() {
        // Client disconnects on the first round while the encoder still has
        // output pending: forced termination, not a wait.
        let responder = responder(4096);
        let (transcoder, child) = mock_transcoder(100_000);
        let mut transport = MockTransport {
            fail_writes: true,
            ..Default::default()
        };

        let err = responder
            .start_prepared(transcoder, "audio/mpeg", &mut transport)
            .unwrap_err();
        assert!(matches!(err, Error::TransportWriteFailed { written: 0 }));
        assert_eq!(child.events().first(), Some(&"kill"));
        assert!(responder.registry.is_empty());
    }

    #[test]
    fn test_disconnect_on_later_round_releases_continuation() {
        let responder = responder(1024);
        let (transcoder, child) = mock_transcoder(100_000);
        let mut transport = MockTransport::default();

        let outcome = responder
            .start_prepared(transcoder, "audio/mpeg", &mut transport)
            .unwrap();
        let token = outcome.continuation().unwrap().to_string();

        transport.fail_writes = true;
        let err = responder.resume(&token, &mut transport).unwrap_err();
        assert!(matches!(err, Error::TransportWriteFailed { .. }));
        assert_eq!(child.events().first(), Some(&"kill"));
        assert!(responder.registry.is_empty());
    }

    /// Transport accepting at most a fixed number of bytes per write call.
    struct TricklingTransport {
        body: Vec<u8>,
        max_per_write: usize,
    }

    impl Transport for TricklingTransport {
        fn set_mime_type(&mut self, _mime: &str) {}

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let n = data.len().min(self.max_per_write);
            self.body.extend_from_slice(&data[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_partial_writes_preserve_byte_order() {
        let responder = responder(1000);
        let (transcoder, _child) = mock_transcoder(2500);
        let mut transport = TricklingTransport {
            body: Vec::new(),
            max_per_write: 17,
        };

        let mut outcome = responder
            .start_prepared(transcoder, "audio/mpeg", &mut transport)
            .unwrap();
        while let Some(token) = outcome.continuation().map(str::to_string) {
            outcome = responder.resume(&token, &mut transport).unwrap();
        }

        let expected: Vec<u8> = (0..2500).map(|i| (i % 251) as u8).collect();
        assert_eq!(transport.body, expected);
    }

    #[test]
    fn test_completed_encoder_is_not_killed_on_finish() {
        let responder = responder(8192);
        let (transcoder, child) = mock_transcoder(500);
        let mut transport = MockTransport::default();

        let outcome = responder
            .start_prepared(transcoder, "audio/mpeg", &mut transport)
            .unwrap();
        assert_eq!(outcome, Outcome::Finished);
        assert_eq!(child.events(), vec!["wait"]);
    }

    #[test]
    fn test_unknown_continuation() {
        let responder = responder(4096);
        let mut transport = MockTransport::default();
        assert!(matches!(
            responder.resume("bogus", &mut transport),
            Err(Error::UnknownContinuation(_))
        ));
    }
}
