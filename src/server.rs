use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::context;
use crate::dispatch::{ProviderRequest, ProviderResult};
use crate::dispatch::http::HttpDispatch;
use crate::error::AgentError;
use crate::request::GenerateRequest;
use crate::response::{GenerateResponse, HealthResponse};

/// Largest accepted `/generate` body; larger requests get 413.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared by every request. Read-only: nothing here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    http: Arc<HttpDispatch>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AgentError> {
        Ok(Self {
            config: Arc::new(config),
            http: Arc::new(HttpDispatch::new()?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Bind `0.0.0.0:PORT` and serve until `shutdown` is cancelled.
pub async fn serve(config: Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_on(listener, config, shutdown).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound address")?;
    let skill_path = config.skill_path_display();
    let state = AppState::new(config).context("failed to build HTTP client")?;

    tracing::info!("opsmeeting-agent listening on :{}", local_addr.port());
    tracing::info!("Using SKILL_PATH={skill_path}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server exited unexpectedly")
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        skill_path: state.config.skill_path_display(),
    })
}

async fn generate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let start = Instant::now();
    match run_generate(&state, &headers, &body, start).await {
        Ok(result) => {
            tracing::info!(
                model = %result.model,
                provider = %result.provider,
                upstream_ms = result.latency_ms,
                duration_ms = start.elapsed().as_millis() as u64,
                output_bytes = result.text.len(),
                "generate ok"
            );
            Json(GenerateResponse::success(result.text)).into_response()
        }
        Err(e) => {
            tracing::warn!(
                provider = e.provider().unwrap_or("none"),
                duration_ms = start.elapsed().as_millis() as u64,
                "generate failed: {e}"
            );
            e.into_response()
        }
    }
}

/// validate → credential → skill + prompt → one completion call.
/// The completion deadline counts from `start`, when the request arrived.
async fn run_generate(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    start: Instant,
) -> Result<ProviderResult, AgentError> {
    // Non-JSON bodies are treated as an empty object, so `notes` is missing.
    if !is_json(headers) {
        return Err(AgentError::InvalidRequest);
    }
    let req = GenerateRequest::from_body(body)?;
    let config = &state.config;

    let api_key = config.api_key.resolve().ok_or(AgentError::MissingApiKey)?;

    let prompt = context::load_prompt(&config.skill_path, req.goal.as_deref(), &req.notes).await?;

    let model = req.model_or_default();
    tracing::info!(model, notes_bytes = req.notes.len(), "generate request");

    let provider_req =
        ProviderRequest::new(model, prompt.system, prompt.user, start + config.timeout);
    state
        .http
        .query_model(&provider_req, &config.base_url, &api_key)
        .await
}

/// `application/json`, with or without parameters such as `charset`.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}
