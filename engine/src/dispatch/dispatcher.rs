//! Step Dispatcher
//!
//! Resolves a step to a provider operation, merges in the execution context,
//! invokes it and normalizes whatever happens into a `StepOutcome`. Nothing a
//! provider does (returned error, error status or panic) escapes `execute`.

use super::context::ExecutionContext;
use super::registry::ProviderRegistry;
use crate::plan::Step;
use crate::report::StepOutcome;
use futures::FutureExt;
use sdk::{EngineError, OperationOutput};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{error, info, warn};

/// Instruction handed to a provider's free-text entry point
pub fn free_text_instruction(operation: &str) -> String {
    format!("Perform action: {}", operation)
}

pub struct StepDispatcher {
    registry: ProviderRegistry,
}

impl StepDispatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Execute one step against the registry.
    ///
    /// On success the step's "data" map is merged into the context. The
    /// returned outcome carries the step with its merged params.
    pub async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> StepOutcome {
        let merged = Step {
            provider: step.provider.clone(),
            operation: step.operation.clone(),
            params: ctx.merge_params(&step.params),
        };
        let label = format!("{}.{}", merged.provider, merged.operation);
        info!("Executing step {}", label);

        let start = Instant::now();

        let Some(provider) = self.registry.get(&merged.provider) else {
            let err = EngineError::ProviderNotFound(merged.provider.clone());
            warn!("Step {} skipped: {}", label, err);
            return StepOutcome::error(merged, err.to_string(), start.elapsed());
        };

        let call = async {
            match provider.operation(&merged.operation) {
                Some(spec) => {
                    provider
                        .invoke(&merged.operation, spec.select(&merged.params))
                        .await
                }
                None => {
                    let instruction = free_text_instruction(&merged.operation);
                    provider
                        .handle_free_text(&instruction, merged.params.clone())
                        .await
                }
            }
        };

        let result = AssertUnwindSafe(call).catch_unwind().await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(output)) if output.is_success() => {
                info!(
                    "Step {} completed in {:.2}ms",
                    label,
                    elapsed.as_secs_f64() * 1000.0
                );
                if let Some(data) = output.data_map() {
                    ctx.absorb(data);
                }
                let OperationOutput { data, message, .. } = output;
                StepOutcome::success(merged, data, message, elapsed)
            }
            Ok(Ok(output)) => {
                let message = output
                    .message
                    .unwrap_or_else(|| format!("{} reported an error", label));
                error!("Step {} failed: {}", label, message);
                StepOutcome::error(merged, message, elapsed)
            }
            Ok(Err(e)) => {
                error!("Step {} failed: {}", label, e);
                StepOutcome::error(merged, e.to_string(), elapsed)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Step {} panicked: {}", label, message);
                StepOutcome::error(merged, message, elapsed)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}
