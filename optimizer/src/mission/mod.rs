//! Mission state machine & orchestration : the per-query
//! pipeline `dispatch -> parallel workers -> tier-1 gate -> equivalence gate
//! -> benchmark -> BDA collation -> sniper synthesis -> re-validate`.
//!
//! Shaped after a top-to-bottom analysis pipeline (parse -> compute derived
//! stats -> run rule engine -> aggregate -> score -> respond), generalized
//! from a single synchronous pipeline to an async state machine because this
//! pipeline suspends on I/O at several points: any LLM call, any session
//! operation, any sleep.

pub mod bda;
pub mod store;

use crate::bench::{self, BenchConfig};
use crate::dispatch::{self, Probe};
use crate::gate::{self, GateConfig, GateVerdict};
use crate::pathology::model::DiagnosisSummary;
use crate::pathology::{query_flags, PathologyEngine};
use crate::patchplan::{self, PatchPlan};
use crate::plan::{self, cost::PlanObservations, Dialect, PlanTree};
use crate::session::{PooledSession, Session, SessionPool};
use crate::sniper::{self, SniperOutput, SNIPER_MAX_ROUNDS};
use crate::utils::error::OptimizerError;
use crate::utils::metrics::Metrics;
use crate::worker::{self, llm::LlmProvider, ProbeFailure, WorkerResult, WorkerStatus};
use bda::BdaTable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-mission states. Terminal: `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    Init,
    Baseline,
    Diagnose,
    Dispatch,
    Workers,
    Validate,
    Bench,
    Collate,
    Sniper,
    Done,
    Failed,
}

/// Tag on a `Done` mission's final result distinguishing "found a faster,
/// equivalent candidate" from the two ways it can end up back at baseline
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Optimized,
    Unchanged,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FinalResult {
    pub sql: String,
    pub baseline_ms: f64,
    pub final_ms: f64,
    pub speedup: f64,
    pub applied_transforms: Vec<String>,
    pub status: FinalStatus,
}

impl FinalResult {
    fn baseline_unchanged(sql: &str, baseline_ms: f64, status: FinalStatus) -> Self {
        Self { sql: sql.to_string(), baseline_ms, final_ms: baseline_ms, speedup: 1.0, applied_transforms: Vec::new(), status }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineSnapshot {
    pub ms: f64,
    pub row_count: u64,
    pub checksum: u64,
    #[serde(skip)]
    pub plan: Option<PlanTree>,
}

/// One query's optimization lifecycle (`Mission`). Owned
/// exclusively by the orchestrator for its duration; the HTTP/CLI surface
/// only ever sees a read-only snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Mission {
    pub mission_id: String,
    pub sql: String,
    pub dialect: Dialect,
    pub state: MissionState,
    pub baseline: Option<BaselineSnapshot>,
    #[serde(skip)]
    pub diagnosis: Option<DiagnosisSummary>,
    #[serde(skip)]
    pub bda: BdaTable,
    pub bda_summary: Vec<WorkerResult>,
    pub final_result: Option<FinalResult>,
    pub error: Option<String>,
}

impl Mission {
    pub fn new(sql: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            mission_id: Uuid::new_v4().to_string(),
            sql: sql.into(),
            dialect,
            state: MissionState::Init,
            baseline: None,
            diagnosis: None,
            bda: BdaTable::new(),
            bda_summary: Vec::new(),
            final_result: None,
            error: None,
        }
    }

    fn fail(&mut self, err: OptimizerError) {
        self.state = MissionState::Failed;
        self.error = Some(err.to_string());
    }

    fn sync_bda_summary(&mut self) {
        self.bda_summary = self.bda.all().to_vec();
    }
}

/// Collaborators the orchestrator needs but does not own (/// ownership: "Sessions are shared by reference but access is serialized").
pub struct MissionDeps {
    pub session_pool: Arc<SessionPool>,
    pub llm_provider: Arc<dyn LlmProvider>,
    pub llm_semaphore: Arc<Semaphore>,
    pub gate_config: GateConfig,
    pub bench_config: BenchConfig,
    pub mission_deadline: Duration,
    pub metrics: Arc<Metrics>,
}

/// Drive `mission` through every state of its lifecycle, publishing a snapshot
/// to `handle` after each transition so callers polling `GET /mission/{id}`
/// (or the CLI's synchronous wait) observe progress rather than only the
/// terminal state. Only a baseline failure or lost session is fatal
/// (`Failed`); every other failure is recorded in the BDA and the mission
/// continues.
pub async fn run(handle: &Arc<RwLock<Mission>>, mission: &mut Mission, deps: &MissionDeps) {
    let mission_deadline = Instant::now() + deps.mission_deadline;
    deps.metrics.mission_started();

    mission.state = MissionState::Baseline;
    sync(handle, mission).await;
    let session = match deps.session_pool.acquire().await {
        Ok(s) => s,
        Err(e) => {
            mission.fail(e);
            deps.metrics.mission_failed();
            return sync(handle, mission).await;
        }
    };

    let baseline = match run_baseline(&session, &mission.sql, deps.gate_config).await {
        Ok(b) => b,
        Err(e) => {
            mission.fail(OptimizerError::baseline_failed(e.to_string()));
            deps.metrics.mission_failed();
            return sync(handle, mission).await;
        }
    };
    mission.baseline = Some(baseline.clone());
    drop(session);

    mission.state = MissionState::Diagnose;
    sync(handle, mission).await;
    let diagnosis = match diagnose(&mission.sql, baseline.plan.as_ref()) {
        Ok(d) => d,
        Err(e) => {
            // PLAN_PARSE_FAILED degrades rather than fails the mission
            //: proceed with an empty diagnosis, which dispatch
            // will turn into DISPATCH_EMPTY below.
            tracing::warn!(mission_id = %mission.mission_id, error = %e, "plan diagnosis degraded");
            DiagnosisSummary { matches: Vec::new(), families_covered: 0, conclusion: "plan parse failed; no diagnosis".to_string() }
        }
    };
    mission.diagnosis = Some(diagnosis.clone());

    mission.state = MissionState::Dispatch;
    sync(handle, mission).await;
    let remaining = mission_deadline.saturating_duration_since(Instant::now());
    let probes = dispatch::dispatch(&diagnosis, &mission.sql, &plan_summary(baseline.plan.as_ref()), remaining);
    deps.metrics.probes_dispatched(probes.len() as u64);

    if probes.is_empty() {
        mission.final_result = Some(FinalResult::baseline_unchanged(&mission.sql, baseline.ms, FinalStatus::Unchanged));
        mission.state = MissionState::Done;
        deps.metrics.mission_done();
        return sync(handle, mission).await;
    }

    mission.state = MissionState::Workers;
    sync(handle, mission).await;
    let worker_timeout = mission_deadline.saturating_duration_since(Instant::now());
    let worker_results = tokio::time::timeout(worker_timeout, run_workers(&mission.sql, &probes, &baseline, deps, mission_deadline)).await;

    match worker_results {
        Ok(results) => {
            for r in results {
                mission.bda.push(r);
            }
        }
        Err(_) => {
            // Mission deadline hit mid-fan-in: every still-outstanding
            // probe is implicitly a TIMEOUT (scenario S6).
            for probe in &probes {
                if mission.bda.get(&probe.probe_id).is_none() {
                    mission.bda.push(WorkerResult::timeout(&probe.probe_id, &probe.transform_id, baseline.ms));
                }
            }
        }
    }
    mission.sync_bda_summary();
    sync(handle, mission).await;

    if Instant::now() >= mission_deadline {
        return finish_on_deadline(handle, mission, &baseline, &deps.metrics).await;
    }

    mission.state = MissionState::Collate;
    sync(handle, mission).await;

    mission.state = MissionState::Sniper;
    sync(handle, mission).await;
    let mut rounds = 0;
    loop {
        if rounds >= SNIPER_MAX_ROUNDS || Instant::now() >= mission_deadline {
            break;
        }
        let Some(sniper_output) = sniper::synthesize(&mission.bda, &diagnosis) else { break };
        let sniper_probe_id = format!("sniper-{rounds}");
        let session = match deps.session_pool.acquire().await {
            Ok(s) => s,
            Err(_) => break,
        };
        let result = validate_and_bench(
            &session,
            &sniper_probe_id,
            "sniper",
            &mission.sql,
            &baseline,
            sniper_output.patch_plan.clone(),
            deps.gate_config,
            deps.bench_config,
            mission_deadline,
            &deps.metrics,
        )
        .await;
        drop(session);
        mission.bda.push(result);
        mission.sync_bda_summary();
        sync(handle, mission).await;
        rounds += 1;
        if !sniper_made_progress(&sniper_output, &mission.bda) {
            break;
        }
    }

    finish(handle, mission, &baseline, &deps.metrics).await;
}

/// Publish a clone of `mission`'s current state to `handle` (`GET
/// /mission/{id}`: pollers read whatever was last published here).
async fn sync(handle: &Arc<RwLock<Mission>>, mission: &Mission) {
    *handle.write().await = mission.clone();
}

fn sniper_made_progress(output: &SniperOutput, bda: &BdaTable) -> bool {
    !output.retry_digest.open.is_empty() || bda.has_win()
}

async fn finish_on_deadline(handle: &Arc<RwLock<Mission>>, mission: &mut Mission, baseline: &BaselineSnapshot, metrics: &Metrics) {
    // Partially completed BDA still feeds the sniper only if at least one
    // WIN exists; otherwise return baseline unchanged with
    // status TIMEOUT.
    if !mission.bda.has_win() {
        mission.final_result = Some(FinalResult::baseline_unchanged(&mission.sql, baseline.ms, FinalStatus::Timeout));
        mission.state = MissionState::Done;
        metrics.mission_done();
        return sync(handle, mission).await;
    }
    finish(handle, mission, baseline, metrics).await;
}

async fn finish(handle: &Arc<RwLock<Mission>>, mission: &mut Mission, baseline: &BaselineSnapshot, metrics: &Metrics) {
    mission.state = MissionState::Validate;
    sync(handle, mission).await;
    mission.state = MissionState::Bench;
    sync(handle, mission).await;

    let best = mission
        .bda
        .all()
        .iter()
        .filter(|r| matches!(r.status, WorkerStatus::Win | WorkerStatus::Pass))
        .max_by(|a, b| a.speedup.unwrap_or(0.0).partial_cmp(&b.speedup.unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal));

    mission.final_result = Some(match best {
        Some(r) if r.speedup.unwrap_or(1.0) > 1.0 => {
            metrics.speedup_sample(r.speedup.unwrap_or(1.0));
            FinalResult {
                sql: r.candidate_sql.clone().unwrap_or_else(|| mission.sql.clone()),
                baseline_ms: baseline.ms,
                final_ms: r.candidate_ms.unwrap_or(baseline.ms),
                speedup: r.speedup.unwrap_or(1.0),
                applied_transforms: r.patch_plan.as_ref().map(|p| p.transforms.clone()).unwrap_or_default(),
                status: FinalStatus::Optimized,
            }
        }
        _ => FinalResult::baseline_unchanged(&mission.sql, baseline.ms, FinalStatus::Unchanged),
    });
    mission.state = MissionState::Done;
    metrics.mission_done();
    sync(handle, mission).await;
}

async fn run_baseline(session: &PooledSession, sql: &str, gate_config: GateConfig) -> Result<BaselineSnapshot, OptimizerError> {
    let plan = session.explain(sql, true).await.ok();
    let (row_count, checksum) = session.checksum(sql, gate_config.max_rows, gate_config.tolerance).await?;
    let ms = plan.as_ref().and_then(|p| p.root.ms_cumulative).unwrap_or(0.0);
    Ok(BaselineSnapshot { ms, row_count, checksum, plan })
}

fn diagnose(sql: &str, plan: Option<&PlanTree>) -> Result<DiagnosisSummary, OptimizerError> {
    let Some(plan) = plan else {
        return Err(OptimizerError::plan_parse_failed("no plan available (EXPLAIN ANALYZE returned nothing)"));
    };
    let statement = patchplan::applier::parse(sql)?;
    let obs: PlanObservations = plan::cost::observe(plan);
    let qobs = query_flags::observe(&statement);
    let engine = PathologyEngine::new();
    let catalog = crate::pathology::catalog::get();
    Ok(engine.diagnose(plan, &obs, &qobs, plan.root.ms_cumulative.unwrap_or(0.0), catalog))
}

fn plan_summary(plan: Option<&PlanTree>) -> String {
    match plan {
        Some(p) => {
            let obs = plan::cost::observe(p);
            format!("cost spine: {}; dominant: {}; total_ms: {:.1}", obs.cost_spine.join(" -> "), obs.dominant_operator, obs.total_ms)
        }
        None => "no plan available".to_string(),
    }
}

/// Fan out probes to the LLM ("workers fan out to N parallel
/// tasks"), each independently running the rest of its own per-probe
/// pipeline (apply -> structural validation -> gate -> bench) once it has a
/// `PatchPlan`.
async fn run_workers(
    sql: &str,
    probes: &[Probe],
    baseline: &BaselineSnapshot,
    deps: &MissionDeps,
    mission_deadline: Instant,
) -> Vec<WorkerResult> {
    let tasks = probes.iter().map(|probe| {
        let sql = sql.to_string();
        let probe = probe.clone();
        let provider = Arc::clone(&deps.llm_provider);
        let semaphore = Arc::clone(&deps.llm_semaphore);
        let pool = Arc::clone(&deps.session_pool);
        let baseline = baseline.clone();
        let gate_config = deps.gate_config;
        let bench_config = deps.bench_config;
        let metrics = Arc::clone(&deps.metrics);

        async move {
            match worker::run_probe(&probe, &sql, provider, semaphore).await {
                Ok(patch_plan) => match pool.acquire().await {
                    Ok(session) => {
                        validate_and_bench(
                            &session,
                            &probe.probe_id,
                            &probe.transform_id,
                            &sql,
                            &baseline,
                            patch_plan,
                            gate_config,
                            bench_config,
                            mission_deadline,
                            &metrics,
                        )
                        .await
                    }
                    Err(e) => WorkerResult::error(&probe.probe_id, &probe.transform_id, baseline.ms, e.to_string()),
                },
                Err(ProbeFailure::Timeout) => WorkerResult::timeout(&probe.probe_id, &probe.transform_id, baseline.ms),
                Err(ProbeFailure::Error(msg)) => WorkerResult::error(&probe.probe_id, &probe.transform_id, baseline.ms, msg),
                Err(ProbeFailure::FailTier1(reason)) => WorkerResult::fail_tier1(&probe.probe_id, &probe.transform_id, baseline.ms, reason),
            }
        }
    });

    futures::future::join_all(tasks).await
}

/// Structural validation -> equivalence gate -> benchmark for one candidate `PatchPlan`, producing its
/// terminal `WorkerResult`.
#[allow(clippy::too_many_arguments)]
async fn validate_and_bench(
    session: &PooledSession,
    probe_id: &str,
    transform_id: &str,
    sql: &str,
    baseline: &BaselineSnapshot,
    patch_plan: PatchPlan,
    gate_config: GateConfig,
    bench_config: BenchConfig,
    mission_deadline: Instant,
    metrics: &Metrics,
) -> WorkerResult {
    let applied = match patchplan::apply(sql, &patch_plan) {
        Ok(a) => a,
        Err(e) => return WorkerResult::fail_tier1(probe_id, transform_id, baseline.ms, e.to_string()),
    };

    if let Err(reason) = patchplan::validate_structural(sql, &applied) {
        return WorkerResult::fail_tier1(probe_id, transform_id, baseline.ms, reason.to_string());
    }

    let requires_ordered = matches!(&applied.statement, sqlparser::ast::Statement::Query(q) if q.order_by.is_some() || q.limit.is_some());

    let verdict = match gate::check_equivalence(session, sql, &applied.candidate_sql, requires_ordered, gate_config).await {
        Ok(v) => v,
        Err(e) => return WorkerResult::error(probe_id, transform_id, baseline.ms, e.to_string()),
    };

    metrics.gate_verdict(verdict.is_pass());
    if !verdict.is_pass() {
        let reason = describe_verdict(&verdict);
        return WorkerResult::fail_equiv(probe_id, transform_id, baseline.ms, applied.candidate_sql, patch_plan, reason);
    }

    let bench_deadline = bench::bench_deadline(mission_deadline, baseline.ms);
    let bench_result = match bench::run_timed(session, &applied.candidate_sql, bench_config, bench_deadline).await {
        Ok(r) => r,
        Err(_) => {
            // BENCH_TIMEOUT degrades to no-speedup rather than failing
            // the probe outright — it passed correctness, it's just not
            // proven faster.
            return WorkerResult::from_bench(probe_id, transform_id, baseline.ms, applied.candidate_sql, patch_plan, baseline.ms, String::new());
        }
    };

    let candidate_plan = session.explain(&applied.candidate_sql, true).await.ok();
    let delta_summary = match (&baseline.plan, &candidate_plan) {
        (Some(b), Some(c)) => bench::explain_delta_summary(b, c),
        _ => String::new(),
    };

    WorkerResult::from_bench(probe_id, transform_id, baseline.ms, applied.candidate_sql, patch_plan, bench_result.mean_ms, delta_summary)
}

fn describe_verdict(verdict: &GateVerdict) -> String {
    match verdict {
        GateVerdict::Pass => String::new(),
        GateVerdict::RowCountMismatch { baseline, candidate } => format!("EQUIV_ROW_COUNT:baseline={baseline},candidate={candidate}"),
        GateVerdict::ChecksumMismatch { sample } => format!("EQUIV_CHECKSUM:{} sample mismatches", sample.len()),
        GateVerdict::OrderMismatch => "EQUIV_ORDER".to_string(),
    }
}
