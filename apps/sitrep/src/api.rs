//! # HTTP API
//!
//! Thin axum front-end over the engine: every handler decodes JSON, calls
//! one engine or store operation, and encodes the result. No logic lives
//! here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use sitrep_core::engine::{BuildTrigger, Engine, EngineError, FixReport};
use sitrep_core::{ContextEntry, EntryKind, ErrorSummary, SolutionRecord, Timestamp};

use crate::cli::{open_engine, CliResult};
use crate::collect::{gather_signals, CommandTrigger};
use crate::config::ProjectConfig;

// =============================================================================
// STATE & ROUTER
// =============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<ProjectConfig>,
    pub root: PathBuf,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/errors", get(errors))
        .route("/solutions/lookup", post(lookup_solutions))
        .route("/fix", post(fix))
        .route("/context", get(context))
        .route("/context/notes", post(add_note))
        .route("/context/phase", put(set_phase))
        .layer(
            tower::ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Bind and serve the API for a project root.
pub async fn serve(root: &Path, addr: &str) -> CliResult {
    let config = ProjectConfig::load(root)?;
    let engine = open_engine(root, &config)?;
    let state = AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
        root: root.to_path_buf(),
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sitrep API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Handler-level error, mapped onto HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Engine(EngineError),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<sitrep_core::StoreError> for ApiError {
    fn from(err: sitrep_core::StoreError) -> Self {
        Self::Engine(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Engine(EngineError::UnknownFingerprint(fp)) => {
                (StatusCode::NOT_FOUND, format!("unknown fingerprint '{fp}'"))
            }
            Self::Engine(err @ EngineError::NoData) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            Self::Engine(err) => {
                tracing::error!(error = %err, "engine failure");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Result<Response, ApiError> {
    let signals = gather_signals(&state.root, &state.config).await;
    let report = state.engine.status(&signals, Timestamp::now())?;
    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn errors(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ErrorSummary>>, ApiError> {
    let limit = query.limit.unwrap_or(state.config.recent_error_limit);
    let records = state.engine.store().recent_errors(limit)?;
    Ok(Json(records.iter().map(ErrorSummary::from_record).collect()))
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    error: String,
}

#[derive(Debug, Serialize)]
struct LookupResponse {
    fingerprint: String,
    solutions: Vec<SolutionRecord>,
}

async fn lookup_solutions(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, ApiError> {
    let (fingerprint, solutions) = state.engine.lookup_solutions(&request.error)?;
    Ok(Json(LookupResponse {
        fingerprint: fingerprint.as_str().to_string(),
        solutions,
    }))
}

#[derive(Debug, Deserialize)]
struct FixRequest {
    error: String,
    solution: String,
    #[serde(default)]
    verify: bool,
}

async fn fix(
    State(state): State<AppState>,
    Json(request): Json<FixRequest>,
) -> Result<Json<FixReport>, ApiError> {
    let trigger = if request.verify {
        match CommandTrigger::from_config(&state.config, &state.root) {
            Some(trigger) => Some(trigger),
            None => {
                return Err(ApiError::BadRequest(
                    "no verify_command configured".to_string(),
                ));
            }
        }
    } else {
        None
    };

    // The verification build can run for minutes; keep it off the runtime.
    let engine = Arc::clone(&state.engine);
    let report = tokio::task::spawn_blocking(move || {
        engine.apply_fix(
            &request.error,
            &request.solution,
            trigger.as_ref().map(|t| t as &dyn BuildTrigger),
            Timestamp::now(),
        )
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))??;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ContextQuery {
    limit: Option<usize>,
    kind: Option<String>,
}

async fn context(
    State(state): State<AppState>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<Vec<ContextEntry>>, ApiError> {
    let filter = query
        .kind
        .as_deref()
        .map(str::parse::<EntryKind>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let entries = state
        .engine
        .store()
        .recent_context(query.limit.unwrap_or(20), filter);
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct NoteRequest {
    text: String,
}

async fn add_note(
    State(state): State<AppState>,
    Json(request): Json<NoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .engine
        .store()
        .append_context(EntryKind::Note, request.text, Timestamp::now())?;
    Ok(Json(json!({ "seq": outcome.seq })))
}

#[derive(Debug, Deserialize)]
struct PhaseRequest {
    phase: String,
}

async fn set_phase(
    State(state): State<AppState>,
    Json(request): Json<PhaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .engine
        .store()
        .append_context(EntryKind::PhaseChange, request.phase, Timestamp::now())?;
    Ok(Json(json!({ "seq": outcome.seq, "phase": outcome.entry.payload })))
}
