//! Execution reports
//!
//! `StepOutcome` records one executed step; the Outcome Aggregator folds the
//! ordered outcomes of a request into a single `ExecutionReport`.

use crate::plan::Step;
use crate::validation::ValidationResult;
use sdk::{OperationStatus, ParamMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Message of a fully successful run whose steps said nothing
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed successfully";

/// First line of the message when any step failed
pub const ERROR_PREFIX: &str = "Completed with errors:";

/// Stand-in for an error outcome that carries no message
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Message of the report produced when no plan could be built
pub const EMPTY_PLAN_MESSAGE: &str =
    "Could not build an execution plan. Try rephrasing the request.";

/// Result of executing one step, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// The step as invoked, with injected context params
    pub step: Step,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub elapsed_ms: f64,
}

impl StepOutcome {
    pub fn success(step: Step, data: Option<Value>, message: Option<String>, elapsed: Duration) -> Self {
        Self {
            step,
            status: OperationStatus::Success,
            data,
            message,
            elapsed_ms: millis(elapsed),
        }
    }

    pub fn error(step: Step, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            step,
            status: OperationStatus::Error,
            data: None,
            message: Some(message.into()),
            elapsed_ms: millis(elapsed),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    pub fn provider(&self) -> &str {
        &self.step.provider
    }

    pub fn operation(&self) -> &str {
        &self.step.operation
    }

    /// The "data" payload when it is a map
    pub fn data_map(&self) -> Option<&ParamMap> {
        self.data.as_ref().and_then(Value::as_object)
    }
}

/// Terminal status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    PartialSuccess,
    Error,
}

impl ReportStatus {
    /// success iff no errors; partial_success iff at least one of each;
    /// error iff errors and no successes
    pub fn from_counts(successes: usize, errors: usize) -> Self {
        match (successes, errors) {
            (_, 0) => ReportStatus::Success,
            (0, _) => ReportStatus::Error,
            _ => ReportStatus::PartialSuccess,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Success => write!(f, "success"),
            ReportStatus::PartialSuccess => write!(f, "partial_success"),
            ReportStatus::Error => write!(f, "error"),
        }
    }
}

/// Timing figures of one request, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_time_ms: f64,
    pub analysis_time_ms: f64,
    pub steps_time_ms: f64,
    pub steps_count: usize,
}

/// Terminal artifact of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: ReportStatus,
    pub message: String,
    pub intent: String,
    pub step_outcomes: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub metrics: Metrics,
    /// Data of the last successful outcome that carried a map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Raw NLU result, kept when no plan could be built from it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl ExecutionReport {
    /// Report for a request that failed before any step ran
    pub fn failure(intent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            message: message.into(),
            intent: intent.into(),
            step_outcomes: Vec::new(),
            validation: None,
            warnings: Vec::new(),
            metrics: Metrics::default(),
            data: None,
            raw_response: None,
        }
    }

    /// Report for an NLU result that yielded no steps
    pub fn empty_plan(raw_response: Value) -> Self {
        Self {
            raw_response: Some(raw_response),
            ..Self::failure(crate::plan::UNKNOWN_INTENT, EMPTY_PLAN_MESSAGE)
        }
    }

    pub fn with_analysis_time(mut self, elapsed: Duration) -> Self {
        self.metrics.analysis_time_ms = millis(elapsed);
        self
    }

    pub fn with_total_time(mut self, elapsed: Duration) -> Self {
        self.metrics.total_time_ms = millis(elapsed);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }
}

/// Fold ordered step outcomes into a report.
///
/// Metrics cover analysis time, per-step time and step count; the total is
/// filled in by the caller once validation has run.
pub fn aggregate(intent: &str, outcomes: Vec<StepOutcome>, analysis_time: Duration) -> ExecutionReport {
    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    let errors = outcomes.len() - successes;
    let status = ReportStatus::from_counts(successes, errors);

    let message = if errors == 0 {
        let messages: Vec<&str> = outcomes
            .iter()
            .filter_map(|o| o.message.as_deref())
            .filter(|m| !m.is_empty())
            .collect();
        if messages.is_empty() {
            DEFAULT_SUCCESS_MESSAGE.to_string()
        } else {
            messages.join("\n")
        }
    } else {
        let error_messages: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.message.as_deref().unwrap_or(UNKNOWN_ERROR))
            .collect();
        format!("{}\n{}", ERROR_PREFIX, error_messages.join("\n"))
    };

    let data = outcomes
        .iter()
        .rev()
        .filter(|o| o.is_success())
        .find_map(|o| o.data_map().cloned())
        .map(Value::Object);

    let metrics = Metrics {
        total_time_ms: 0.0,
        analysis_time_ms: millis(analysis_time),
        steps_time_ms: outcomes.iter().map(|o| o.elapsed_ms).sum(),
        steps_count: outcomes.len(),
    };

    ExecutionReport {
        status,
        message,
        intent: intent.to_string(),
        step_outcomes: outcomes,
        validation: None,
        warnings: Vec::new(),
        metrics,
        data,
        raw_response: None,
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
