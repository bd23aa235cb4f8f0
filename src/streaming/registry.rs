//! Continuation tracking for in-flight transcodes.
//!
//! Every suspended exchange is represented by one registry entry: an opaque
//! token mapped to the live [`Transcoder`]. Entries whose client never comes
//! back are swept out and their encoder processes terminated.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tonecast_av::Transcoder;
use uuid::Uuid;

/// One in-flight transcode held across suspended round trips.
pub struct ActiveStream {
    id: String,
    pub(crate) transcoder: Mutex<Transcoder>,
    started_at: DateTime<Utc>,
    last_seen: Mutex<DateTime<Utc>>,
}

impl ActiveStream {
    /// The continuation token identifying this stream.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Serializable view of an active stream, for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Thread-safe map from continuation token to live transcoder.
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<DashMap<String, Arc<ActiveStream>>>,
    expiry: Duration,
}

impl StreamRegistry {
    /// Create a registry whose entries expire after `expiry_secs` of client
    /// inactivity.
    pub fn new(expiry_secs: u64) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            expiry: Duration::from_secs(expiry_secs),
        }
    }

    /// Register a transcoder, returning its entry with a fresh token.
    pub fn register(&self, transcoder: Transcoder) -> Arc<ActiveStream> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let stream = Arc::new(ActiveStream {
            id: id.clone(),
            transcoder: Mutex::new(transcoder),
            started_at: now,
            last_seen: Mutex::new(now),
        });

        self.streams.insert(id.clone(), stream.clone());
        tracing::debug!(token = %id, "registered stream continuation");

        stream
    }

    /// Look up a continuation, refreshing its activity timestamp.
    pub fn resolve(&self, token: &str) -> Option<Arc<ActiveStream>> {
        let stream = self.streams.get(token).map(|e| e.value().clone())?;
        *stream.last_seen.lock() = Utc::now();
        Some(stream)
    }

    /// Release a continuation, tearing its transcoder down.
    ///
    /// A transcoder whose pipe reached a clean end of stream has already
    /// reaped its child; any other is forcibly terminated by the teardown.
    pub fn release(&self, token: &str) {
        if let Some((_, stream)) = self.streams.remove(token) {
            stream.transcoder.lock().teardown();
            tracing::info!(
                token = %token,
                duration_secs = (Utc::now() - stream.started_at).num_seconds(),
                "released stream continuation"
            );
        }
    }

    /// Remove entries whose client has been away longer than the expiry,
    /// terminating their encoders. Returns the number of entries removed.
    ///
    /// Entries currently being driven by an exchange are skipped.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expiry = chrono::Duration::from_std(self.expiry)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut removed = 0;
        self.streams.retain(|token, stream| {
            let idle = now - *stream.last_seen.lock();
            if idle <= expiry {
                return true;
            }
            // An exchange invocation holds the transcoder lock; leave such
            // entries alone, their activity timestamp refreshes on return.
            match stream.transcoder.try_lock() {
                Some(mut transcoder) => {
                    tracing::info!(
                        token = %token,
                        idle_secs = idle.num_seconds(),
                        "expiring abandoned stream continuation"
                    );
                    transcoder.teardown();
                    removed += 1;
                    false
                }
                None => true,
            }
        });

        removed
    }

    /// List all registered continuations.
    pub fn summaries(&self) -> Vec<StreamSummary> {
        self.streams
            .iter()
            .map(|entry| {
                let stream = entry.value();
                StreamSummary {
                    id: stream.id.clone(),
                    started_at: stream.started_at,
                    last_seen: *stream.last_seen.lock(),
                }
            })
            .collect()
    }

    /// Number of registered continuations.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no continuation is registered.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        // Default: 60 second expiry
        Self::new(60)
    }
}

/// Start a background task that periodically sweeps expired continuations.
pub fn start_sweep_task(
    registry: StreamRegistry,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            registry.sweep_expired();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // A long-lived child standing in for a still-running encoder; the cursor
    // plays the output pipe.
    fn idle_transcoder(data: &[u8]) -> Transcoder {
        let child = std::process::Command::new("sleep")
            .arg("30")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .spawn()
            .unwrap();
        Transcoder::from_process(Box::new(child), Box::new(Cursor::new(data.to_vec())))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = StreamRegistry::new(60);
        let stream = registry.register(idle_transcoder(b"abc"));
        let token = stream.id().to_string();

        assert_eq!(registry.len(), 1);
        assert!(registry.resolve(&token).is_some());
        assert!(registry.resolve("no-such-token").is_none());

        registry.release(&token);
        assert!(registry.is_empty());
        assert!(registry.resolve(&token).is_none());
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = StreamRegistry::new(60);
        let token = registry.register(idle_transcoder(b"abc")).id().to_string();
        registry.release(&token);
        registry.release(&token);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let registry = StreamRegistry::new(0);
        registry.register(idle_transcoder(b"abc"));
        std::thread::sleep(std::time::Duration::from_millis(1100));

        assert_eq!(registry.sweep_expired(), 1);
        assert!(registry.is_empty());

        let registry = StreamRegistry::new(60);
        registry.register(idle_transcoder(b"abc"));
        assert_eq!(registry.sweep_expired(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_skips_streams_in_use() {
        let registry = StreamRegistry::new(0);
        let stream = registry.register(idle_transcoder(b"abc"));
        std::thread::sleep(std::time::Duration::from_millis(1100));

        let guard = stream.transcoder.lock();
        assert_eq!(registry.sweep_expired(), 0);
        drop(guard);
        assert_eq!(registry.sweep_expired(), 1);
    }

    #[tokio::test]
    async fn test_sweep_task() {
        let registry = StreamRegistry::new(1);
        registry.register(idle_transcoder(b"abc"));

        let handle = start_sweep_task(registry.clone(), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(registry.is_empty());
        handle.abort();
    }
}
