//! Post-condition Validator
//!
//! After a plan has executed, intents that change persistent state can be
//! checked against a domain invariant. The check needs an entity id, which is
//! discovered from the step outcomes; without one the check is skipped.
//! Failures of the check itself never affect the report status, they only
//! add a warning.

use crate::dispatch::free_text_instruction;
use crate::report::StepOutcome;
use async_trait::async_trait;
use futures::FutureExt;
use sdk::{CapabilityProvider, EngineError, ParamMap, ParamsExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Fields inspected, in order, for an entity id in a successful outcome's data
pub const ENTITY_ID_KEYS: [&str; 3] = ["id", "project_id", "task_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            status: ValidationStatus::Valid,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }

    /// Read a result from a loosely shaped map.
    ///
    /// An explicit "valid"/"invalid" status is honored; otherwise the result
    /// is valid iff there are no errors. Non-string list items are rendered
    /// as JSON text.
    pub fn from_map(map: &ParamMap) -> Self {
        let errors = string_list(map.get("errors"));
        let warnings = string_list(map.get("warnings"));
        let status = match map.get("status").and_then(Value::as_str) {
            Some("valid") => ValidationStatus::Valid,
            Some("invalid") => ValidationStatus::Invalid,
            _ if errors.is_empty() => ValidationStatus::Valid,
            _ => ValidationStatus::Invalid,
        };
        Self {
            status,
            errors,
            warnings,
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Domain invariant check run after execution
#[async_trait]
pub trait PostCondition: Send + Sync {
    async fn check(
        &self,
        intent: &str,
        entity_id: &str,
        context: &ParamMap,
    ) -> Result<ValidationResult, EngineError>;
}

/// Post-condition delegated to a provider operation.
///
/// The operation receives `operation_type`, `entity_id` and `context`, and
/// answers with `{status, errors, warnings}` in its data.
pub struct ProviderPostCondition {
    provider: Arc<dyn CapabilityProvider>,
    operation: String,
}

impl ProviderPostCondition {
    pub fn new(provider: Arc<dyn CapabilityProvider>, operation: impl Into<String>) -> Self {
        Self {
            provider,
            operation: operation.into(),
        }
    }
}

#[async_trait]
impl PostCondition for ProviderPostCondition {
    async fn check(
        &self,
        intent: &str,
        entity_id: &str,
        context: &ParamMap,
    ) -> Result<ValidationResult, EngineError> {
        let mut params = ParamMap::new();
        params.insert("operation_type".into(), json!(intent));
        params.insert("entity_id".into(), json!(entity_id));
        params.insert("context".into(), Value::Object(context.clone()));

        let output = match self.provider.operation(&self.operation) {
            Some(spec) => self.provider.invoke(&self.operation, spec.select(&params)).await?,
            None => {
                self.provider
                    .handle_free_text(&free_text_instruction(&self.operation), params)
                    .await?
            }
        };

        if !output.is_success() {
            return Err(EngineError::Validation(output.message.unwrap_or_else(|| {
                format!("{}.{} failed", self.provider.name(), self.operation)
            })));
        }

        output
            .data_map()
            .map(ValidationResult::from_map)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "{}.{} returned no validation data",
                    self.provider.name(),
                    self.operation
                ))
            })
    }
}

/// What the validator did for one request
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Intent not gated, or no entity id found
    Skipped,
    Completed(ValidationResult),
    /// The check itself failed; carries the warning to surface
    Degraded(String),
}

/// Intent allow-list in front of a post-condition
pub struct PostConditionGate {
    intents: Vec<String>,
    check: Arc<dyn PostCondition>,
}

impl PostConditionGate {
    pub fn new(intents: Vec<String>, check: Arc<dyn PostCondition>) -> Self {
        Self { intents, check }
    }

    pub fn applies_to(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }

    pub async fn run(
        &self,
        intent: &str,
        outcomes: &[StepOutcome],
        context: &ParamMap,
    ) -> ValidationOutcome {
        if !self.applies_to(intent) {
            return ValidationOutcome::Skipped;
        }

        let Some(entity_id) = discover_entity_id(outcomes) else {
            tracing::debug!("No entity id in outcomes; skipping validation for {}", intent);
            return ValidationOutcome::Skipped;
        };

        let start = std::time::Instant::now();
        let result = AssertUnwindSafe(self.check.check(intent, &entity_id, context))
            .catch_unwind()
            .await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(Ok(validation)) => {
                tracing::info!(
                    "Validation of {} {} finished in {:.2}ms: {:?}",
                    intent,
                    entity_id,
                    elapsed_ms,
                    validation.status
                );
                ValidationOutcome::Completed(validation)
            }
            Ok(Err(e)) => {
                tracing::warn!("Validation failed after {:.2}ms: {}", elapsed_ms, e);
                ValidationOutcome::Degraded(format!("Validation could not be completed: {}", e))
            }
            Err(_) => {
                tracing::warn!("Validation panicked after {:.2}ms", elapsed_ms);
                ValidationOutcome::Degraded(
                    "Validation could not be completed: internal error".to_string(),
                )
            }
        }
    }
}

/// First id-like field of the first successful outcome that has one
pub fn discover_entity_id(outcomes: &[StepOutcome]) -> Option<String> {
    outcomes
        .iter()
        .filter(|o| o.is_success())
        .filter_map(StepOutcome::data_map)
        .find_map(|data| {
            ENTITY_ID_KEYS
                .iter()
                .filter_map(|key| data.param_str_opt(key))
                .map(|id| id.trim().to_string())
                .find(|id| !id.is_empty())
        })
}
