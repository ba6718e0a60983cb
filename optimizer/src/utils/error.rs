use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Closed error taxonomy for the optimization pipeline.
///
/// Design: thiserror for ergonomic propagation with `?`. Each variant maps to
/// a numbered range so the HTTP surface can derive a stable status code and
/// the CLI can derive a stable exit code without matching on variant names.
#[derive(Error, Debug)]
pub enum OptimizerError {
    // Setup errors 1xxx - fatal, never per-probe
    #[error("failed to connect to database: {0}")]
    ConnectFailed(String),

    #[error("baseline execution failed: {0}")]
    BaselineFailed(String),

    // Session errors 2xxx
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session operation timed out")]
    SessionTimeout,

    // Plan/diagnosis errors 3xxx - recoverable by degrading
    #[error("could not parse EXPLAIN output: {0}")]
    PlanParseFailed(String),

    #[error("no probes were dispatched for this query")]
    DispatchEmpty,

    // Worker/LLM errors 4xxx - per-probe
    #[error("LLM provider timed out")]
    LlmTimeout,

    #[error("LLM provider error: {0}")]
    LlmError(String),

    #[error("could not parse PatchPlan from LLM response: {0}")]
    PatchParseFailed(String),

    #[error("anchor hash {0} does not resolve against the current AST")]
    AnchorMissing(String),

    #[error("candidate failed structural validation: {0}")]
    StructuralInvalid(String),

    // Equivalence errors 5xxx - per-probe
    #[error("row count mismatch: baseline={baseline} candidate={candidate}")]
    EquivRowCount { baseline: u64, candidate: u64 },

    #[error("commutative checksum mismatch")]
    EquivChecksum,

    #[error("ordered digest mismatch")]
    EquivOrder,

    // Benchmark errors 6xxx - per-probe, degrade to no-speedup
    #[error("benchmark run exceeded its deadline")]
    BenchTimeout,

    // Mission-level 7xxx
    #[error("mission deadline reached")]
    MissionDeadline,

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OptimizerError {
    /// Stable numeric error code, independent of Display text, for clients
    /// that match on code rather than message (closed taxonomy).
    pub fn error_code(&self) -> i32 {
        match self {
            Self::ConnectFailed(_) => 1001,
            Self::BaselineFailed(_) => 1002,

            Self::SessionNotFound(_) => 2001,
            Self::SessionTimeout => 2002,

            Self::PlanParseFailed(_) => 3001,
            Self::DispatchEmpty => 3002,

            Self::LlmTimeout => 4001,
            Self::LlmError(_) => 4002,
            Self::PatchParseFailed(_) => 4003,
            Self::AnchorMissing(_) => 4004,
            Self::StructuralInvalid(_) => 4005,

            Self::EquivRowCount { .. } => 5001,
            Self::EquivChecksum => 5002,
            Self::EquivOrder => 5003,

            Self::BenchTimeout => 6001,

            Self::MissionDeadline => 7001,
            Self::Other(_) => 9001,
        }
    }

    /// Whether the orchestrator must treat this as fatal to the Mission
    /// rather than recording and continuing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectFailed(_) | Self::BaselineFailed(_) | Self::SessionNotFound(_))
    }

    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed(message.into())
    }

    pub fn baseline_failed(message: impl Into<String>) -> Self {
        Self::BaselineFailed(message.into())
    }

    pub fn plan_parse_failed(message: impl Into<String>) -> Self {
        Self::PlanParseFailed(message.into())
    }

    pub fn patch_parse_failed(message: impl Into<String>) -> Self {
        Self::PatchParseFailed(message.into())
    }

    pub fn anchor_missing(anchor: impl std::fmt::Display) -> Self {
        Self::AnchorMissing(anchor.to_string())
    }

    pub fn structural_invalid(reason: impl Into<String>) -> Self {
        Self::StructuralInvalid(reason.into())
    }
}

/// problem+json error body for the HTTP surface.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for OptimizerError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let message = self.to_string();

        let status = match code {
            1000..=1999 => StatusCode::BAD_GATEWAY,
            2000..=2999 => StatusCode::NOT_FOUND,
            3000..=3999 => StatusCode::UNPROCESSABLE_ENTITY,
            4000..=4999 => StatusCode::UNPROCESSABLE_ENTITY,
            5000..=5999 => StatusCode::CONFLICT,
            6000..=6999 => StatusCode::GATEWAY_TIMEOUT,
            7000..=7999 => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ApiErrorResponse { code, message, details: None })).into_response()
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(err: serde_json::Error) -> Self {
        OptimizerError::PatchParseFailed(err.to_string())
    }
}

/// Exit codes for the CLI surface: 0 success+speedup, 1 setup
/// error, 2 baseline failure, 3 no valid candidate.
pub fn exit_code_for(err: &OptimizerError) -> i32 {
    match err {
        OptimizerError::ConnectFailed(_) => 1,
        OptimizerError::BaselineFailed(_) => 2,
        _ => 3,
    }
}

pub type ApiResult<T> = Result<T, OptimizerError>;
