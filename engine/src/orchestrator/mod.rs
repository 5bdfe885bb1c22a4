//! Orchestrator
//!
//! Sole inbound entry point of the engine. One request flows through:
//! intent cache (NLU analysis on a miss) → plan interpreter → sequential
//! step dispatch → outcome aggregation → optional post-condition check.
//!
//! Steps of one request run strictly in plan order and execution halts at
//! the first failing step. Requests themselves may run concurrently; the
//! intent cache is the only state they share.

pub mod prompt;

use crate::cache::IntentCache;
use crate::dispatch::{ExecutionContext, StepDispatcher};
use crate::nlu::{NluClient, NluError};
use crate::plan::{self, Plan};
use crate::report::{self, ExecutionReport};
use crate::validation::{PostConditionGate, ValidationOutcome};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Longest utterance prefix written to logs
const LOG_PREVIEW_CHARS: usize = 100;

/// One inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub workspace_id: i64,
    pub user_id: Option<i64>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, workspace_id: i64, user_id: Option<i64>) -> Self {
        Self {
            text: text.into(),
            workspace_id,
            user_id,
        }
    }
}

/// Interpreted plan together with the NLU result it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub plan: Plan,
    pub raw: Value,
}

/// Wires the NLU client, the intent cache, the dispatcher and the
/// post-condition gate together.
pub struct Orchestrator {
    nlu: Arc<dyn NluClient>,
    cache: Arc<IntentCache<Analysis>>,
    dispatcher: StepDispatcher,
    gate: Option<PostConditionGate>,
}

impl Orchestrator {
    pub fn new(
        nlu: Arc<dyn NluClient>,
        cache: Arc<IntentCache<Analysis>>,
        dispatcher: StepDispatcher,
    ) -> Self {
        Self {
            nlu,
            cache,
            dispatcher,
            gate: None,
        }
    }

    /// Run `gate` after execution for the intents it covers
    pub fn with_post_condition(mut self, gate: PostConditionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn cache(&self) -> &Arc<IntentCache<Analysis>> {
        &self.cache
    }

    /// Analyze an utterance into a plan, answering from the cache when a
    /// fresh entry exists. NLU failures are not cached.
    pub async fn analyze(&self, text: &str) -> Result<Analysis, NluError> {
        self.cache
            .get_or_compute(text, || async {
                let raw = self.nlu.call(&prompt::analysis_prompt(text), None).await?;
                let plan = plan::interpret(&raw);
                Ok(Analysis { plan, raw })
            })
            .await
    }

    /// Process one request end to end.
    ///
    /// Never fails: every problem, including a panic anywhere in the
    /// pipeline, ends up in a report with status `error`.
    pub async fn process_request(
        &self,
        text: &str,
        workspace_id: i64,
        user_id: Option<i64>,
    ) -> ExecutionReport {
        let utterance = Utterance::new(text, workspace_id, user_id);
        let request_id = uuid::Uuid::new_v4().to_string();

        let started = Instant::now();
        let result = AssertUnwindSafe(self.run(&request_id, &utterance))
            .catch_unwind()
            .await;

        let report = match result {
            Ok(report) => report,
            Err(_) => {
                error!("Request {} panicked during processing", request_id);
                ExecutionReport::failure(
                    plan::UNKNOWN_INTENT,
                    "An error occurred while processing the request",
                )
            }
        };
        report.with_total_time(started.elapsed())
    }

    async fn run(&self, request_id: &str, utterance: &Utterance) -> ExecutionReport {
        let started = Instant::now();
        info!(
            "Starting request {}: workspace_id={}, user_id={:?}, text='{}'",
            request_id,
            utterance.workspace_id,
            utterance.user_id,
            preview(&utterance.text)
        );

        let analysis_start = Instant::now();
        let analysis = self.analyze(&utterance.text).await;
        let analysis_time = analysis_start.elapsed();
        info!("Request analyzed in {:.2}ms", millis(analysis_time));

        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Request {}: analysis failed, no plan available: {}", request_id, e);
                let mut report = ExecutionReport::failure(
                    plan::UNKNOWN_INTENT,
                    report::EMPTY_PLAN_MESSAGE,
                )
                .with_analysis_time(analysis_time);
                report.warnings.push(e.to_string());
                return report;
            }
        };

        let Analysis { plan, raw } = analysis;
        if plan.is_empty() {
            warn!(
                "Plan is empty; analysis result: {}",
                crate::secrets::scrub(&truncate(&raw.to_string(), 500))
            );
            return ExecutionReport::empty_plan(raw).with_analysis_time(analysis_time);
        }

        let Plan {
            intent,
            entities,
            steps,
        } = plan;
        let mut ctx = ExecutionContext::new(utterance.workspace_id, utterance.user_id, entities);

        let mut outcomes = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            let outcome = self.dispatcher.execute(step, &mut ctx).await;
            let halt = !outcome.is_success();
            outcomes.push(outcome);
            if halt {
                let skipped = steps.len() - i - 1;
                if skipped > 0 {
                    warn!("Halting after failed step {}; {} step(s) not run", i + 1, skipped);
                }
                break;
            }
        }

        let mut report = report::aggregate(&intent, outcomes, analysis_time);

        if let Some(gate) = &self.gate {
            match gate.run(&intent, &report.step_outcomes, &ctx.snapshot()).await {
                ValidationOutcome::Skipped => {}
                ValidationOutcome::Completed(validation) => report.validation = Some(validation),
                ValidationOutcome::Degraded(warning) => report.warnings.push(warning),
            }
        }

        info!(
            "Request {} finished with {} in {:.2}ms (analysis: {:.2}ms, steps: {:.2}ms)",
            request_id,
            report.status,
            millis(started.elapsed()),
            report.metrics.analysis_time_ms,
            report.metrics.steps_time_ms
        );
        report
    }
}

fn preview(text: &str) -> String {
    truncate(text, LOG_PREVIEW_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
