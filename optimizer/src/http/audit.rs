//! `POST /audit`: runs EXPLAIN ANALYZE against a connected session,
//! diagnoses pathologies, and returns the list without launching a mission —
//! the read-only twin of `/optimize`, shaped like a read-only
//! `GET /clusters/{id}/diagnostics` diagnostic endpoint.

use super::AppState;
use crate::pathology::model::Match;
use crate::pathology::{catalog, query_flags, PathologyEngine};
use crate::patchplan::applier;
use crate::plan::cost;
use crate::utils::error::{ApiResult, OptimizerError};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuditRequest {
    pub session_id: String,
    pub sql: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditResponse {
    pub matches: Vec<Match>,
    pub conclusion: String,
    pub cost_spine: Vec<String>,
    pub dominant_operator: String,
    pub baseline_ms: f64,
}

/// `POST /audit` : parse EXPLAIN ANALYZE, run the pathology
/// engine's prune-then-detect pass, and return every surviving match plus
/// its transform options — no candidate generation, no gate, no benchmark.
#[utoipa::path(
    post,
    path = "/audit",
    request_body = AuditRequest,
    responses(
        (status = 200, description = "Diagnosis produced", body = AuditResponse),
        (status = 404, description = "Session not found"),
        (status = 422, description = "EXPLAIN output could not be parsed"),
    ),
    tag = "Optimization"
)]
pub async fn audit(State(state): State<Arc<AppState>>, Json(req): Json<AuditRequest>) -> ApiResult<Json<AuditResponse>> {
    let pool = state.session_pool(&req.session_id)?;
    let session = pool.acquire().await?;

    let plan = session
        .explain(&req.sql, true)
        .await
        .map_err(|e| OptimizerError::baseline_failed(e.to_string()))?;

    let statement = applier::parse(&req.sql).map_err(|e| OptimizerError::plan_parse_failed(e.to_string()))?;

    let obs = cost::observe(&plan);
    let qobs = query_flags::observe(&statement);
    let engine = PathologyEngine::new();
    let catalog = catalog::get();
    let baseline_ms = plan.root.ms_cumulative.unwrap_or(0.0);
    let diagnosis = engine.diagnose(&plan, &obs, &qobs, baseline_ms, catalog);

    Ok(Json(AuditResponse {
        matches: diagnosis.matches,
        conclusion: diagnosis.conclusion,
        cost_spine: obs.cost_spine,
        dominant_operator: obs.dominant_operator,
        baseline_ms,
    }))
}
