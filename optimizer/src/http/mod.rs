//! HTTP surface: axum router exposing the five external
//! endpoints, composed as one `Router::new().route(...)` chain with a
//! shared `Arc<AppState>` bundling this system's session registry, LLM
//! provider handle and mission store.

pub mod audit;
pub mod connect;
pub mod mission;
pub mod optimize;

use crate::config::Config;
use crate::mission::store::MissionStore;
use crate::session::SessionPool;
use crate::utils::error::OptimizerError;
use crate::utils::metrics::Metrics;
use crate::worker::llm::LlmProvider;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Collaborators every handler needs: the connected-session
/// registry (keyed by the id `/connect` handed back), the shared LLM
/// provider plus its concurrency semaphore, the in-memory mission store, and
/// process configuration for defaults (deadline, gate tolerance, bench
/// protocol) that aren't carried on the request.
pub struct AppState {
    pub config: Config,
    pub sessions: DashMap<String, Arc<SessionPool>>,
    pub missions: MissionStore,
    pub llm_provider: Arc<dyn LlmProvider>,
    pub llm_semaphore: Arc<Semaphore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, llm_provider: Arc<dyn LlmProvider>) -> Self {
        let llm_semaphore = Arc::new(Semaphore::new(config.llm.max_concurrency.max(1)));
        Self {
            config,
            sessions: DashMap::new(),
            missions: MissionStore::new(),
            llm_provider,
            llm_semaphore,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn session_pool(&self, session_id: &str) -> Result<Arc<SessionPool>, OptimizerError> {
        self.sessions.get(session_id).map(|e| Arc::clone(e.value())).ok_or_else(|| OptimizerError::SessionNotFound(session_id.to_string()))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        connect::connect,
        connect::disconnect,
        audit::audit,
        optimize::optimize,
        mission::get_mission,
    ),
    components(schemas(
        connect::ConnectRequest,
        connect::ConnectResponse,
        audit::AuditRequest,
        audit::AuditResponse,
        optimize::OptimizeRequest,
        optimize::OptimizeResponse,
        optimize::OptimizeMode,
        mission::MissionStatus,
        crate::mission::MissionState,
        crate::mission::FinalResult,
        crate::mission::FinalStatus,
        crate::pathology::model::Match,
        crate::pathology::model::PathologyId,
        crate::pathology::model::Phase,
        crate::pathology::model::Importance,
        crate::pathology::model::TransformOption,
        crate::pathology::model::Evidence,
        crate::pathology::model::Gate,
        crate::patchplan::AnchorHash,
    )),
    tags(
        (name = "Sessions", description = "Connect/disconnect database sessions"),
        (name = "Optimization", description = "Audit and optimize SQL queries"),
        (name = "Missions", description = "Poll mission progress and results"),
    )
)]
struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/connect/:backend", post(connect::connect))
        .route("/disconnect/:session_id", post(connect::disconnect))
        .route("/audit", post(audit::audit))
        .route("/optimize", post(optimize::optimize))
        .route("/mission/:mission_id", get(mission::get_mission))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics_text(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> String {
    state.metrics.render()
}
