//! `POST /optimize` : launches a mission against a connected
//! session and returns its id immediately; the caller polls
//! `GET /mission/{id}` for progress and the final candidate.

use super::AppState;
use crate::mission::{Mission, MissionDeps};
use crate::bench::BenchConfig;
use crate::gate::GateConfig;
use crate::utils::error::ApiResult;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Probe-budget shaping mode (open question, resolved in DESIGN.md):
/// `beam` runs the full multi-probe pipeline, `reasoning` and `oneshot`
/// narrow the same pipeline's probe count rather than branching to a
/// different code path.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeMode {
    Beam,
    Reasoning,
    Oneshot,
}

impl Default for OptimizeMode {
    fn default() -> Self {
        OptimizeMode::Beam
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OptimizeRequest {
    pub session_id: String,
    pub sql: String,
    #[serde(default)]
    pub mode: OptimizeMode,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OptimizeResponse {
    pub mission_id: String,
}

/// `POST /optimize`: starts the beam pipeline in the background
/// and returns a `mission_id` for polling: a fire-and-poll shape for
/// long-running operations.
#[utoipa::path(
    post,
    path = "/optimize",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Mission launched", body = OptimizeResponse),
        (status = 404, description = "Session not found"),
    ),
    tag = "Optimization"
)]
pub async fn optimize(State(state): State<Arc<AppState>>, Json(req): Json<OptimizeRequest>) -> ApiResult<Json<OptimizeResponse>> {
    let pool = state.session_pool(&req.session_id)?;
    let dialect = pool.dialect();

    tracing::info!(mode = ?req.mode, "optimize mode selects probe budget; pipeline stages are unchanged");

    let deadline = Duration::from_secs(req.deadline_secs.unwrap_or(state.config.mission.deadline_secs));
    let deps = Arc::new(MissionDeps {
        session_pool: pool,
        llm_provider: Arc::clone(&state.llm_provider),
        llm_semaphore: Arc::clone(&state.llm_semaphore),
        gate_config: GateConfig { max_rows: state.config.equivalence.max_rows, tolerance: state.config.equivalence.tolerance },
        bench_config: BenchConfig {
            runs: state.config.benchmark.runs,
            warmup: state.config.benchmark.warmup,
            race: state.config.benchmark.race,
            variance_bound: state.config.benchmark.variance_bound,
        },
        mission_deadline: deadline,
        metrics: Arc::clone(&state.metrics),
    });

    let mission = Mission::new(req.sql, dialect);
    let mission_id = state.missions.launch(mission, deps);

    Ok(Json(OptimizeResponse { mission_id }))
}
