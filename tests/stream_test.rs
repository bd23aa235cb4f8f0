//! Integration tests for the transcoding stream route.
//!
//! A stub encoder and a stub probe stand in for the real binaries: the probe
//! prints a fixed stream layout, the encoder ignores its arguments and emits
//! a deterministic payload on stdout. This exercises the whole pipeline
//! (probe, parameter construction, spawn, quota-sized delivery, completion)
//! without depending on ffmpeg being installed.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tonecast::config::Config;
use tonecast::server::{build_context, create_router};

/// The stub encoder emits this 16-byte pattern 100 times (1600 bytes).
const PATTERN: &str = "0123456789abcdef";
const REPEATS: usize = 100;

struct TestHarness {
    dir: tempfile::TempDir,
    input: PathBuf,
}

impl TestHarness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let encoder = dir.path().join("stub-encoder");
        std::fs::write(
            &encoder,
            format!(
                "#!/bin/sh\ni=0\nwhile [ $i -lt {REPEATS} ]; do printf '{PATTERN}'; i=$((i+1)); done\n"
            ),
        )
        .unwrap();
        make_executable(&encoder);

        let probe = dir.path().join("stub-probe");
        std::fs::write(
            &probe,
            "#!/bin/sh\nprintf '%s' '{\"format\":{\"duration\":\"10.0\"},\"streams\":[{\"index\":0,\"codec_type\":\"audio\"}]}'\n",
        )
        .unwrap();
        make_executable(&probe);

        let input = dir.path().join("track.flac");
        std::fs::write(&input, b"not really flac").unwrap();

        Self { dir, input }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.encoder.path = Some(self.dir.path().join("stub-encoder"));
        config.encoder.ffprobe_path = Some(self.dir.path().join("stub-probe"));
        // A small quota so the exchange takes several rounds.
        config.streaming.quota_bytes = 512;
        config
    }

    async fn serve(&self) -> SocketAddr {
        let ctx = build_context(self.config()).unwrap();
        let app = create_router(ctx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

fn make_executable(path: &Path) {
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

#[tokio::test]
async fn stream_delivers_full_encoder_output() {
    let h = TestHarness::new();
    let addr = h.serve().await;

    let resp = reqwest::get(format!(
        "http://{addr}/api/stream?input={}&format=mp3",
        h.input.display()
    ))
    .await
    .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "audio/mpeg"
    );

    let body = resp.bytes().await.unwrap();
    assert_eq!(body.len(), PATTERN.len() * REPEATS);
    assert_eq!(&body[..16], PATTERN.as_bytes());
    assert_eq!(&body[body.len() - 16..], PATTERN.as_bytes());
}

#[tokio::test]
async fn stream_rejects_unknown_format() {
    let h = TestHarness::new();
    let addr = h.serve().await;

    let resp = reqwest::get(format!(
        "http://{addr}/api/stream?input={}&format=wav",
        h.input.display()
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn stream_rejects_missing_input() {
    let h = TestHarness::new();
    let addr = h.serve().await;

    let resp = reqwest::get(format!(
        "http://{addr}/api/stream?input=/nonexistent/file.flac&format=mp3"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn formats_listing_includes_catalog() {
    let h = TestHarness::new();
    let addr = h.serve().await;

    let formats: Vec<serde_json::Value> = reqwest::get(format!("http://{addr}/api/formats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(formats.len(), 8);
    let mp3 = formats
        .iter()
        .find(|f| f["name"] == "mp3")
        .expect("mp3 in catalog");
    assert_eq!(mp3["mime_type"], "audio/mpeg");
    assert_eq!(mp3["kind"], "audio");
}

#[tokio::test]
async fn no_continuation_left_after_completed_stream() {
    let h = TestHarness::new();
    let addr = h.serve().await;

    let resp = reqwest::get(format!(
        "http://{addr}/api/stream?input={}&format=mp3",
        h.input.display()
    ))
    .await
    .unwrap();
    let _ = resp.bytes().await.unwrap();

    let streams: Vec<serde_json::Value> = reqwest::get(format!("http://{addr}/api/streams"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(streams.is_empty());
}

#[tokio::test]
async fn health_check_responds() {
    let h = TestHarness::new();
    let addr = h.serve().await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
}
