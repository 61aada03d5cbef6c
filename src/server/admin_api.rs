//! Admin HTTP API over the cache coordinator.
//!
//! - GET /health
//! - GET /v1/cache/stats
//! - GET /v1/cache/levels, PUT /v1/cache/levels/{level}
//! - GET|PUT|DELETE /v1/cache/entries/{key}
//! - POST /v1/cache/invalidate
//! - POST /v1/cache/flush
//! - GET /v1/cache/events (SSE)
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::{CacheCoordinator, CacheKey, CacheLevel, LevelStatus, StatsSnapshot, WriteReport};
use crate::error::CacheError;
use crate::server::streaming::events_to_sse_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub cache: Arc<CacheCoordinator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(cache: Arc<CacheCoordinator>) -> Self {
        Self {
            cache,
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all admin routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/v1/cache/levels", get(list_levels))
        .route("/v1/cache/levels/{level}", put(toggle_level))
        .route(
            "/v1/cache/entries/{key}",
            get(get_entry).put(put_entry).delete(delete_entry),
        )
        .route("/v1/cache/invalidate", post(invalidate))
        .route("/v1/cache/flush", post(flush))
        .route("/v1/cache/events", get(events))
        .layer(middleware::from_fn_with_state(state.clone(), request_scope))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Each HTTP request is one Request-tier scope; whatever it cached there is
/// dropped once the response is ready.
async fn request_scope(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if !state.cache.end_request_scope().await {
        warn!("Failed to close request scope");
    }
    response
}

// ─── Errors ────────────────────────────────────────────────────────────────

/// Maps cache errors onto HTTP statuses.
pub struct ApiError(CacheError);

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CacheError::InvalidKey(_)
            | CacheError::InvalidPattern { .. }
            | CacheError::UnknownLevel(_)
            | CacheError::Configuration(_) => StatusCode::BAD_REQUEST,
            CacheError::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            CacheError::Producer(_) | CacheError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub levels: Vec<LevelStatus>,
}

/// `?levels=memory,database`
#[derive(Debug, Default, Deserialize)]
pub struct LevelsQuery {
    #[serde(default)]
    pub levels: Option<String>,
}

impl LevelsQuery {
    fn parse(&self) -> Result<Option<Vec<CacheLevel>>, CacheError> {
        self.levels.as_deref().map(parse_levels).transpose()
    }
}

fn parse_levels(raw: &str) -> Result<Vec<CacheLevel>, CacheError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse().map_err(|_| CacheError::UnknownLevel(name.to_string())))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct PutEntryRequest {
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub levels: Option<Vec<CacheLevel>>,
}

#[derive(Debug, Serialize)]
pub struct PutEntryResponse {
    pub ok: bool,
    pub report: WriteReport,
}

#[derive(Debug, Deserialize)]
pub struct ToggleLevelRequest {
    pub enabled: bool,
}

/// Exactly one of `pattern`, `tags` or `namespace`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvalidateRequest {
    pub pattern: Option<String>,
    pub tags: Option<Vec<String>>,
    pub namespace: Option<String>,
    pub levels: Option<Vec<CacheLevel>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlushRequest {
    pub levels: Option<Vec<CacheLevel>>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let levels = state.cache.level_status_summary().await;
    let degraded = levels.iter().any(|level| level.enabled && !level.healthy);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        levels,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.cache.metrics_text() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.cache.operation_stats().await)
}

async fn list_levels(State(state): State<Arc<AppState>>) -> Json<Vec<LevelStatus>> {
    Json(state.cache.level_status_summary().await)
}

async fn toggle_level(
    State(state): State<Arc<AppState>>,
    Path(level): Path<String>,
    Json(req): Json<ToggleLevelRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let level: CacheLevel = level
        .parse()
        .map_err(|_| CacheError::UnknownLevel(level.clone()))?;
    state.cache.toggle_level(level, req.enabled).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<LevelsQuery>,
) -> Result<Response, ApiError> {
    let levels = query.parse()?;
    match state.cache.lookup(&key, levels.as_deref()).await? {
        Some(value) => Ok(Json(EntryResponse { key, value }).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "not found", "key": key }))).into_response()),
    }
}

async fn put_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<PutEntryRequest>,
) -> Result<Json<PutEntryResponse>, ApiError> {
    let key = CacheKey::new(key).with_tags(req.tags);
    let report = state
        .cache
        .put_detailed(key, req.value, req.ttl, req.levels.as_deref())
        .await?;

    Ok(Json(PutEntryResponse {
        ok: report.succeeded(),
        report,
    }))
}

async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<LevelsQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = match query.parse()? {
        Some(levels) => state.cache.forget_with_levels(&key, &levels).await?,
        None => state.cache.forget(&key).await?,
    };
    Ok(Json(OkResponse { ok }))
}

async fn invalidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<Value>, ApiError> {
    let levels = req.levels.as_deref();
    let removed = match (&req.pattern, &req.tags, &req.namespace) {
        (Some(pattern), None, None) => state.cache.invalidate_by_pattern(pattern, levels).await?,
        (None, Some(tags), None) => state.cache.invalidate_by_tags(tags.as_slice(), levels).await?,
        (None, None, Some(namespace)) => state.cache.invalidate_by_namespace(namespace, levels).await?,
        _ => {
            return Err(CacheError::Configuration(
                "invalidate needs exactly one of pattern, tags or namespace".to_string(),
            )
            .into())
        }
    };
    info!(removed, "Invalidation via admin API");
    Ok(Json(json!({ "removed": removed })))
}

async fn flush(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FlushRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let ok = match req.levels {
        Some(levels) => state.cache.flush_levels(&levels).await?,
        None => state.cache.flush().await?,
    };
    Ok(Json(OkResponse { ok }))
}

async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stream = events_to_sse_stream(state.cache.subscribe_events());
    Sse::new(stream).keep_alive(KeepAlive::default())
}
