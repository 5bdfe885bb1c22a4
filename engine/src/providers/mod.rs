//! NLU-backed capability providers
//!
//! The four standard roles (ADM, ATM, ACM, AAM) as providers whose free-text
//! entry point is one NLU call with a role-specific system prompt. They
//! declare no named operations, so every step reaches them through the
//! free-text fallback. Deployments with real storage-backed handlers
//! register those in place of these.

use crate::dispatch::ProviderRegistry;
use crate::nlu::{NluClient, RetryingClient};
use async_trait::async_trait;
use sdk::{CapabilityProvider, EngineError, OperationOutput, OperationSpec, ParamMap};
use serde_json::Value;
use std::sync::Arc;

pub const DATA_MANAGER: &str = "ADM";
pub const TASK_MANAGER: &str = "ATM";
pub const CONTROL_MANAGER: &str = "ACM";
pub const ANALYZE_MANAGER: &str = "AAM";

const DATA_MANAGER_PROMPT: &str = "You are the data manager (ADM) of a project and task \
management assistant. You give access to stored workspaces, boards, projects and tasks, keep \
the data consistent and keep storage details away from other roles. Answer with JSON: \
{\"status\": \"success\"|\"error\", \"data\": {...}, \"message\": \"...\"}.";

const TASK_MANAGER_PROMPT: &str = "You are the task manager (ATM) of a project and task \
management assistant. You create and update tasks and projects, check that required data is \
present before creating anything and validate the values you are given. Answer with JSON: \
{\"status\": \"success\"|\"error\", \"data\": {...}, \"message\": \"...\"}.";

const CONTROL_MANAGER_PROMPT: &str = "You are the control manager (ACM) of a project and task \
management assistant. After an operation you check data correctness, business rules and \
integrity: a project must have all mandatory boards and a task must have every required role \
assigned. Answer with JSON: {\"status\": \"valid\"|\"invalid\", \"errors\": [...], \
\"warnings\": [...]}.";

const ANALYZE_MANAGER_PROMPT: &str = "You are the analyze manager (AAM) of a project and task \
management assistant. You answer questions about metrics and statistics, produce reports and \
point out bottlenecks. Answer with JSON: {\"status\": \"success\"|\"error\", \"data\": {...}, \
\"message\": \"...\"}.";

/// Provider names paired with their system prompts
pub const ROLES: [(&str, &str); 4] = [
    (DATA_MANAGER, DATA_MANAGER_PROMPT),
    (TASK_MANAGER, TASK_MANAGER_PROMPT),
    (CONTROL_MANAGER, CONTROL_MANAGER_PROMPT),
    (ANALYZE_MANAGER, ANALYZE_MANAGER_PROMPT),
];

/// Capability provider answered entirely by an NLU call
pub struct NluBackedProvider {
    name: String,
    nlu: Arc<dyn NluClient>,
}

impl NluBackedProvider {
    pub fn new(name: impl Into<String>, nlu: Arc<dyn NluClient>) -> Self {
        Self {
            name: name.into(),
            nlu,
        }
    }
}

#[async_trait]
impl CapabilityProvider for NluBackedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_operations(&self) -> &[OperationSpec] {
        &[]
    }

    async fn invoke(
        &self,
        operation: &str,
        _params: ParamMap,
    ) -> Result<OperationOutput, EngineError> {
        Err(EngineError::UnknownOperation {
            provider: self.name.clone(),
            operation: operation.to_string(),
        })
    }

    async fn handle_free_text(
        &self,
        instruction: &str,
        params: ParamMap,
    ) -> Result<OperationOutput, EngineError> {
        tracing::debug!("{} handling '{}' via {}", self.name, instruction, self.nlu.name());
        let reply = self.nlu.call(instruction, Some(&params)).await?;
        Ok(output_from_reply(reply))
    }
}

/// Normalize a model reply into an operation output.
///
/// An explicit "data" field is used as-is; otherwise the whole reply map
/// becomes the data. A bare `{"response": ...}` reply also supplies the
/// message.
fn output_from_reply(reply: Value) -> OperationOutput {
    let mut output = OperationOutput::from_value(reply.clone());
    if let Value::Object(map) = reply {
        if output.message.is_none() {
            output.message = map
                .get("response")
                .and_then(Value::as_str)
                .map(String::from);
        }
        if output.is_success() && output.data.is_none() {
            output.data = Some(Value::Object(map));
        }
    }
    output
}

/// Registry of the four NLU-backed roles sharing one client configuration
pub fn default_registry(client: &RetryingClient) -> ProviderRegistry {
    ROLES
        .iter()
        .fold(ProviderRegistry::new(), |registry, (name, prompt)| {
            let nlu: Arc<dyn NluClient> = Arc::new(client.clone().with_system_prompt(*prompt));
            registry.with(Arc::new(NluBackedProvider::new(*name, nlu)))
        })
}
