use crate::config::Config;
use crate::streaming::{start_sweep_task, StreamRegistry, StreamingResponder};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod routes_stream;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Resolved probe binary.
    pub ffprobe: PathBuf,
    /// Responder driving transcoders for the stream route.
    pub responder: Arc<StreamingResponder>,
    /// Registry of suspended exchanges (shared with the responder).
    pub registry: StreamRegistry,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/api/formats", get(routes_stream::list_formats))
        .route("/api/streams", get(routes_stream::list_streams))
        .route("/api/stream", get(routes_stream::stream_media))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Build the application context, resolving external tools once.
pub fn build_context(config: Config) -> Result<AppContext> {
    let encoder = tonecast_av::resolve_tool("ffmpeg", config.encoder.path.as_deref())
        .context("Encoder binary not found")?;
    let ffprobe = tonecast_av::resolve_tool("ffprobe", config.encoder.ffprobe_path.as_deref())
        .context("Probe binary not found")?;

    tracing::info!(encoder = %encoder.display(), "Using encoder");

    let registry = StreamRegistry::new(config.streaming.continuation_expiry_secs);
    let responder = Arc::new(StreamingResponder::new(
        registry.clone(),
        encoder,
        config.streaming.quota_bytes,
    ));

    Ok(AppContext {
        config: Arc::new(config),
        ffprobe,
        responder,
        registry,
    })
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let sweep_interval = config.streaming.sweep_interval_secs;
    let ctx = build_context(config)?;
    start_sweep_task(ctx.registry.clone(), sweep_interval);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
