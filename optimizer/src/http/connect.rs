//! `/connect` and `/disconnect`: opens or drops a `SessionPool`
//! against one DSN, handing back an opaque id every other endpoint keys on.

use super::AppState;
use crate::utils::error::{ApiResult, OptimizerError};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub dsn: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub session_id: String,
}

/// `POST /connect/{duckdb|postgres}`: opens a pool of up to
/// `DB_SESSION_POOL_SIZE` connections against `dsn` and returns a
/// `session_id` every other endpoint references.
#[utoipa::path(
    post,
    path = "/connect/{backend}",
    params(("backend" = String, Path, description = "duckdb or postgres")),
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Session opened", body = ConnectResponse),
        (status = 502, description = "Connection failed"),
    ),
    tag = "Sessions"
)]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Path(backend): Path<String>,
    Json(req): Json<ConnectRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    let pool_size = state.config.database.session_pool_size;
    let idle_timeout = Duration::from_secs(state.config.database.idle_timeout_secs);

    let pool = match backend.to_ascii_lowercase().as_str() {
        "duckdb" => Arc::new(crate::session::SessionPool::new_duckdb(req.dsn, pool_size, idle_timeout)),
        "postgres" | "postgresql" => Arc::new(crate::session::SessionPool::new_postgres(req.dsn, pool_size, idle_timeout)),
        other => return Err(OptimizerError::connect_failed(format!("unknown backend: {other}"))),
    };

    // Fail fast: acquire once so a bad DSN surfaces here, not on the first
    // /audit or /optimize call.
    let probe = pool.acquire().await?;
    drop(probe);

    let session_id = Uuid::new_v4().to_string();
    state.sessions.insert(session_id.clone(), pool);

    tracing::info!(session_id = %session_id, backend = %backend, "session connected");
    Ok(Json(ConnectResponse { session_id }))
}

/// `POST /disconnect/{session_id}`: drops the pool, returning
/// `SESSION_NOT_FOUND` if it's already gone.
#[utoipa::path(
    post,
    path = "/disconnect/{session_id}",
    params(("session_id" = String, Path, description = "Session id returned by /connect")),
    responses(
        (status = 200, description = "Session disconnected"),
        (status = 404, description = "Session not found"),
    ),
    tag = "Sessions"
)]
pub async fn disconnect(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> ApiResult<()> {
    state.sessions.remove(&session_id).ok_or_else(|| OptimizerError::SessionNotFound(session_id.clone()))?;
    tracing::info!(session_id = %session_id, "session disconnected");
    Ok(())
}
