use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use narrator::config::Config;
use narrator::format::OutputFormat;
use narrator::orchestrator::{Orchestrator, RunOutcome};
use narrator::parser::PlainTextParser;
use narrator::process_backend::ProcessSynthesizer;
use narrator::voice::VoiceSynthesizer;

#[derive(Parser, Debug)]
#[command(name = "narrator-server")]
#[command(about = "HTTP server for audiobook narration")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8090)]
    port: u16,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", default_value_t = 50 * 1024 * 1024)]
    max_bytes: usize,

    /// External TTS program implementing the `ProcessSynthesizer` wire
    /// protocol (see `narrator::process_backend`).
    #[arg(long = "tts-command", required = true)]
    tts_command: String,

    /// Root directory for per-request workspaces and output artifacts.
    #[arg(long = "data-dir", default_value = "./narrator-server-data")]
    data_dir: PathBuf,
}

#[derive(Clone)]
struct AppState {
    backend: Arc<dyn VoiceSynthesizer>,
    backend_model_identity: String,
    data_dir: PathBuf,
    max_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct NarrateQuery {
    #[serde(default)]
    narrator_voice: Option<String>,
    #[serde(default)]
    speed: Option<f32>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    character_voices: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody { error: self.message });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    narrator::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "narrator-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    std::fs::create_dir_all(&params.data_dir).context("failed to create data dir")?;

    let state = AppState {
        backend: Arc::new(ProcessSynthesizer::new(&params.tts_command)),
        backend_model_identity: params.tts_command.clone(),
        data_dir: params.data_dir,
        max_bytes: params.max_bytes,
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/v1/narrate", post(narrate))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(params.max_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn root() -> &'static str {
    "narrator-server: POST /v1/narrate (raw document body)"
}

async fn healthz() -> &'static str {
    "ok"
}

/// Streams one newline-delimited JSON progress event per chunk completed,
/// followed by a final `{"event":"completed", ...}` or
/// `{"event":"cancelled"}`/`{"event":"failed", ...}` line. Mirrors
/// `scribble-server`'s `spawn_blocking` + `tokio::io::duplex` +
/// `SyncIoBridge` streaming pattern: the Orchestrator's `run` is
/// synchronous, so it runs on a blocking thread while progress events are
/// written through a bridge the async side reads as a byte stream.
async fn narrate(
    State(state): State<AppState>,
    Query(query): Query<NarrateQuery>,
    body: Body,
) -> std::result::Result<Response, AppError> {
    let bytes = axum::body::to_bytes(body, state.max_bytes)
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("request body was empty"));
    }

    let format = match query.format.as_deref() {
        None => OutputFormat::Wav,
        Some("mp3") => OutputFormat::Mp3,
        Some("wav") => OutputFormat::Wav,
        Some("m4a") => OutputFormat::M4a,
        Some("m4b") => OutputFormat::M4b,
        Some(other) => return Err(AppError::bad_request(format!("unknown format '{other}'"))),
    };

    let request_id = format!("{:x}", crc32fast::hash(&bytes));
    let request_dir = state.data_dir.join(&request_id);
    std::fs::create_dir_all(&request_dir).map_err(|e| AppError::internal(e.to_string()))?;
    let input_path = request_dir.join("input.txt");
    std::fs::write(&input_path, &bytes).map_err(|e| AppError::internal(e.to_string()))?;

    let config = Config {
        narrator_voice: query.narrator_voice.unwrap_or_else(|| "am_michael".to_string()),
        speed: query.speed.unwrap_or(1.0),
        sample_rate: query.sample_rate.unwrap_or(48_000),
        output_format: format,
        character_voices: query.character_voices.unwrap_or(false),
        output_dir: request_dir.join("out"),
        workspace_dir: request_dir.join("workspace"),
        ..Config::default()
    };

    let backend = state.backend.clone();
    let backend_model_identity = state.backend_model_identity.clone();

    let (duplex_read, duplex_write) = tokio::io::duplex(64 * 1024);

    tokio::task::spawn_blocking(move || {
        use std::io::Write as _;

        let mut writer = SyncIoBridge::new(duplex_write);
        let orchestrator = Orchestrator::new(config, backend, backend_model_identity);
        let cancel = AtomicBool::new(false);

        let outcome = {
            let mut on_progress = |progress: narrator::progress::Progress| {
                let line = serde_json::json!({
                    "event": "progress",
                    "state": format!("{:?}", progress.state),
                    "chunks_completed": progress.chunks_completed,
                    "chunks_total": progress.chunks_total,
                });
                let _ = writeln!(writer, "{line}");
            };
            orchestrator.run(&input_path, &PlainTextParser, &cancel, Some(&mut on_progress))
        };

        match outcome {
            Ok(RunOutcome::Completed(path)) => {
                metrics::record_narration_outcome("completed");
                let line = serde_json::json!({"event": "completed", "path": path.to_string_lossy()});
                let _ = writeln!(writer, "{line}");
            }
            Ok(RunOutcome::Cancelled) => {
                metrics::record_narration_outcome("cancelled");
                let _ = writeln!(writer, "{}", serde_json::json!({"event": "cancelled"}));
            }
            Err(err) => {
                metrics::record_narration_outcome("failed");
                let line = serde_json::json!({"event": "failed", "message": err.to_string()});
                let _ = writeln!(writer, "{line}");
            }
        }
    });

    let body = Body::from_stream(ReaderStream::new(duplex_read));
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"))],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_serializes_message() {
        let err = AppError::bad_request("nope");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "nope");
    }
}
