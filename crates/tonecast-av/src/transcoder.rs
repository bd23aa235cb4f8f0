//! Encoder process ownership and incremental pipe consumption.
//!
//! A [`Transcoder`] owns one child encoder process and the read end of its
//! standard-output pipe. Bytes are moved from the pipe into an in-memory
//! buffer by bounded [`pump`] calls and handed to the consumer through
//! [`buffered`]/[`consume`] or [`take_buffered`]; the buffer only grows by
//! pumping and only shrinks by delivery.
//!
//! [`pump`]: Transcoder::pump
//! [`buffered`]: Transcoder::buffered
//! [`consume`]: Transcoder::consume
//! [`take_buffered`]: Transcoder::take_buffered

use crate::command::build_args;
use crate::params::TranscodeParameters;
use crate::{Error, Result};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Read granularity for pump operations.
const READ_CHUNK: usize = 4096;

/// Process-wide lock serializing encoder spawns.
///
/// Concurrent spawn and descriptor setup sequences must not interleave; every
/// transcode spawned in this process must go through the same lock. The lock
/// guards nothing else.
#[derive(Debug, Clone, Default)]
pub struct SpawnLock(Arc<Mutex<()>>);

impl SpawnLock {
    /// Create a new spawn lock.
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running encoder process.
///
/// The seam between the transcoder and the operating system: production code
/// wraps [`std::process::Child`], tests substitute a recording mock to verify
/// the wait-versus-kill teardown paths.
pub trait EncoderChild: Send {
    /// Wait for the process to exit, reaping it.
    fn wait(&mut self) -> io::Result<ExitStatus>;

    /// Forcibly terminate the process.
    fn kill(&mut self) -> io::Result<()>;
}

impl EncoderChild for Child {
    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Completed,
    Aborted,
}

/// One in-flight transcode: an encoder child process, the read end of its
/// output pipe, and the bytes read but not yet delivered.
///
/// Serves exactly one consumer; dropped (or torn down) when the exchange ends.
pub struct Transcoder {
    child: Option<Box<dyn EncoderChild>>,
    output: Box<dyn Read + Send>,
    buf: Vec<u8>,
    state: State,
    exit_status: Option<ExitStatus>,
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("buffered", &self.buf.len())
            .field("state", &self.state)
            .field("exit_status", &self.exit_status)
            .finish_non_exhaustive()
    }
}

impl Transcoder {
    /// Validate the input, build the encoder command line and spawn the
    /// encoder with its standard output captured through a pipe.
    ///
    /// The child's standard input and standard error are bound to the null
    /// device so it can neither block on input nor leak descriptors into the
    /// pipe protocol. The spawn itself is serialized through `lock`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the input path is missing or not a regular file
    /// (checked before any process is created), `SpawnFailed` or
    /// `ToolNotFound` if process creation fails.
    pub fn spawn(encoder: &Path, params: &TranscodeParameters, lock: &SpawnLock) -> Result<Self> {
        let input = params.input();
        let meta = std::fs::metadata(input)
            .map_err(|_| Error::invalid_input(input, "does not exist"))?;
        if !meta.is_file() {
            return Err(Error::invalid_input(input, "not a regular file"));
        }

        let args = build_args(params);
        debug!(encoder = %encoder.display(), ?args, "spawning encoder");

        let mut command = Command::new(encoder);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = {
            let _guard = lock.acquire();
            command.spawn().map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    Error::tool_not_found(encoder.to_string_lossy())
                } else {
                    Error::spawn_failed(encoder.to_string_lossy(), e.to_string())
                }
            })?
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn_failed(encoder.to_string_lossy(), "no stdout pipe"))?;

        debug!(pid = child.id(), input = %input.display(), "transcoding started");

        Ok(Self {
            child: Some(Box::new(child)),
            output: Box::new(stdout),
            buf: Vec::new(),
            state: State::Running,
            exit_status: None,
        })
    }

    /// Wrap an already-running encoder process.
    ///
    /// `output` must be the read end of the process's standard-output pipe.
    pub fn from_process(child: Box<dyn EncoderChild>, output: Box<dyn Read + Send>) -> Self {
        Self {
            child: Some(child),
            output,
            buf: Vec::new(),
            state: State::Running,
            exit_status: None,
        }
    }

    /// Move up to `max_bytes` from the output pipe into the internal buffer.
    ///
    /// Blocks until data, end-of-stream or an error is observed, never past
    /// `max_bytes`. On end-of-stream or a pipe error the child is waited for
    /// synchronously and the transcode becomes complete; a non-zero exit
    /// status is logged, not escalated, since bytes already produced are
    /// still deliverable. Returns the number of bytes read; no-op once
    /// complete or aborted.
    pub fn pump(&mut self, max_bytes: usize) -> usize {
        if self.state != State::Running {
            return 0;
        }

        let mut read_total = 0;
        let mut chunk = [0u8; READ_CHUNK];
        while read_total < max_bytes {
            let want = (max_bytes - read_total).min(READ_CHUNK);
            match self.output.read(&mut chunk[..want]) {
                Ok(0) => {
                    debug!("encoder output reached end of stream");
                    self.finish();
                    break;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    read_total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "encoder output pipe error");
                    self.finish();
                    break;
                }
            }
        }
        read_total
    }

    /// Whether the encoder output has been fully consumed from the pipe.
    ///
    /// Monotone: once complete, stays complete. Buffered bytes may still be
    /// pending delivery.
    pub fn is_complete(&self) -> bool {
        self.state == State::Completed
    }

    /// Bytes read from the pipe but not yet delivered.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Mark the first `n` buffered bytes as delivered, removing them.
    pub fn consume(&mut self, n: usize) {
        self.buf.drain(..n.min(self.buf.len()));
    }

    /// Take ownership of all buffered bytes, leaving the buffer empty.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Exit status of the encoder, once it has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Release the child process.
    ///
    /// After a clean end-of-stream the child has already been waited for and
    /// this is a no-op. A still-running child is forcibly terminated and then
    /// reaped; an abandoned consumer must never block on a process that may
    /// not finish on its own. Idempotent.
    pub fn teardown(&mut self) {
        if self.state != State::Running {
            return;
        }
        if let Some(mut child) = self.child.take() {
            debug!("terminating encoder");
            if let Err(e) = child.kill() {
                warn!(error = %e, "failed to terminate encoder");
            }
            // Reap the terminated child so it cannot linger as a zombie.
            let _ = child.wait();
        }
        self.state = State::Aborted;
    }

    /// Wait for the child after end-of-stream and record its exit status.
    fn finish(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!("waiting for encoder to exit");
            match child.wait() {
                Ok(status) => {
                    self.exit_status = Some(status);
                    if status.success() {
                        debug!("transcode complete");
                    } else {
                        warn!(%status, "encoder exited with non-zero status");
                    }
                }
                Err(e) => warn!(error = %e, "failed to reap encoder"),
            }
        }
        self.state = State::Completed;
    }
}

impl Drop for Transcoder {
    fn drop(&mut self) {
        self.teardown();
    }
}
