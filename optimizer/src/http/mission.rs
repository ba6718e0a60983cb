//! `GET /mission/{id}`: polls an in-flight or finished mission.
//! Missions live only in memory ("persisted state: none in the
//! core"), so a restart loses in-flight progress along with everything else.

use super::AppState;
use crate::mission::{FinalResult, Mission, MissionState};
use crate::utils::error::{ApiResult, OptimizerError};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Read-only snapshot of a `Mission` (the HTTP surface only ever
/// sees a read-only view). Intentionally drops the in-process diagnosis/BDA
/// internals that aren't `ToSchema`-friendly catalog data in favor of the
/// `bda_summary` the worker pool already produces as plain `WorkerResult`s.
#[derive(Debug, Serialize, ToSchema)]
pub struct MissionStatus {
    pub mission_id: String,
    pub sql: String,
    pub state: MissionState,
    pub final_result: Option<FinalResult>,
    pub error: Option<String>,
}

impl From<Mission> for MissionStatus {
    fn from(m: Mission) -> Self {
        Self { mission_id: m.mission_id, sql: m.sql, state: m.state, final_result: m.final_result, error: m.error }
    }
}

/// `GET /mission/{mission_id}`: current state plus, once `Done` or
/// `Failed`, the terminal result.
#[utoipa::path(
    get,
    path = "/mission/{mission_id}",
    params(("mission_id" = String, Path, description = "Mission id returned by /optimize")),
    responses(
        (status = 200, description = "Mission status", body = MissionStatus),
        (status = 404, description = "Mission not found"),
    ),
    tag = "Missions"
)]
pub async fn get_mission(State(state): State<Arc<AppState>>, Path(mission_id): Path<String>) -> ApiResult<Json<MissionStatus>> {
    let mission = state
        .missions
        .get(&mission_id)
        .await
        .ok_or_else(|| OptimizerError::SessionNotFound(mission_id.clone()))?;

    Ok(Json(mission.into()))
}
