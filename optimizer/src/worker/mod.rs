//! Worker Runner : for each probe, concurrently assemble a
//! prompt, invoke the LLM provider with a deadline, and parse its response
//! into a `PatchPlan`.
//!
//! A static system-prompt header (`const`), a typed request assembled per
//! call, and a cache-then-call
//! flow we simplify to call-then-parse since PatchPlans are not cached
//! across missions ("persisted state: none in the core").

pub mod llm;
pub mod prompt;
pub mod result;

use crate::dispatch::Probe;
use crate::patchplan::PatchPlan;
use crate::utils::error::OptimizerError;
pub use result::{WorkerResult, WorkerStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Why the worker gave up on a probe before a candidate could be built
/// : carried back to the mission orchestrator, which turns
/// it into a terminal `WorkerResult` without ever touching the database.
#[derive(Debug, Clone)]
pub enum ProbeFailure {
    Timeout,
    Error(String),
    FailTier1(String),
}

/// Run one probe end to end through the LLM : assemble the
/// prompt, call the provider under the shared concurrency semaphore, parse
/// the response as a `PatchPlan`, and check every anchor it references
/// exists. On parse/anchor failure, retry once with the failure reason
/// appended to the prompt; a second failure emits `FailTier1`.
pub async fn run_probe(
    probe: &Probe,
    sql: &str,
    provider: Arc<dyn llm::LlmProvider>,
    semaphore: Arc<Semaphore>,
) -> Result<PatchPlan, ProbeFailure> {
    let _permit = semaphore.acquire_owned().await.map_err(|e| ProbeFailure::Error(e.to_string()))?;

    let system = prompt::CATALOG_HEADER;
    let body = prompt::build_probe_prompt(probe, sql);

    let first = call_and_parse(provider.as_ref(), system, &body, probe.deadline, sql).await;
    match first {
        Ok(plan) => Ok(plan),
        Err(ProbeFailure::Timeout) | Err(ProbeFailure::Error(_)) => first,
        Err(ProbeFailure::FailTier1(reason)) => {
            let retry_body = format!("{body}\n\nPREVIOUS ATTEMPT FAILED: {reason}\nCorrect the PatchPlan and respond again with valid JSON.");
            call_and_parse(provider.as_ref(), system, &retry_body, probe.deadline, sql).await
        }
    }
}

async fn call_and_parse(
    provider: &dyn llm::LlmProvider,
    system: &str,
    body: &str,
    deadline: Instant,
    sql: &str,
) -> Result<PatchPlan, ProbeFailure> {
    let raw = provider.complete(system, body, deadline).await.map_err(|e| match e {
        OptimizerError::LlmTimeout => ProbeFailure::Timeout,
        other => ProbeFailure::Error(other.to_string()),
    })?;

    parse_patch_plan(&raw, sql)
}

/// Parse the LLM's response as a `PatchPlan` (wire format) and
/// reject it outright if any op references an anchor that doesn't exist in
/// the original query's AST.
pub fn parse_patch_plan(raw: &str, sql: &str) -> Result<PatchPlan, ProbeFailure> {
    let json_text = extract_json_object(raw).unwrap_or(raw);
    let plan: PatchPlan = serde_json::from_str(json_text)
        .map_err(|e| ProbeFailure::FailTier1(format!("PATCH_PARSE_FAILED:{e}")))?;

    // A hallucinated anchor is only detectable once the applier resolves it
    // against the live, possibly-already-mutated AST; here we
    // only confirm the baseline itself still parses, so a later
    // `ANCHOR_MISSING` from `apply` can be trusted as the op's fault, not a
    // baseline parse regression.
    crate::patchplan::applier::parse(sql)
        .map_err(|e| ProbeFailure::FailTier1(format!("ANCHOR_MISSING:baseline did not parse: {e}")))?;

    if plan.ops.is_empty() {
        return Err(ProbeFailure::FailTier1("PATCH_PARSE_FAILED:empty ops list".to_string()));
    }

    Ok(plan)
}

/// LLM responses sometimes wrap the JSON payload in prose or a fenced code
/// block; pull out the first top-level `{...}` object to tolerate minor
/// formatting drift from the model.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (i, c) in raw[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_embedded_in_prose() {
        let raw = "Here is the plan:\n```json\n{\"ops\":[],\"transforms\":[],\"expected_explain_delta\":\"\",\"risk\":\"low\"}\n```\nLet me know if you need changes.";
        let extracted = extract_json_object(raw).unwrap();
        let plan: PatchPlan = serde_json::from_str(extracted).unwrap();
        assert!(plan.ops.is_empty());
    }

    #[test]
    fn malformed_json_fails_tier1() {
        let result = parse_patch_plan("not json at all", "SELECT 1");
        assert!(matches!(result, Err(ProbeFailure::FailTier1(_))));
    }
}
