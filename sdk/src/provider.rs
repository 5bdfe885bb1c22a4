//! Capability provider trait
//!
//! A capability provider is a named facade (workspaces, boards, projects,
//! tasks, analytics, ...) that exposes a fixed, discoverable set of named
//! operations. Plans produced by the language model refer to providers and
//! operations by name; the engine resolves them through a registry of
//! `CapabilityProvider` trait objects.

use crate::errors::EngineError;
use crate::types::{OperationOutput, OperationSpec, ParamMap};
use async_trait::async_trait;

/// Trait that all capability providers must implement
///
/// Implementations are expected to be thread-safe and effectively stateless;
/// storage access and transactions are the provider's own concern.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Returns the registry name of the provider (e.g. "ADM")
    fn name(&self) -> &str;

    /// Returns the named operations this provider declares
    fn supported_operations(&self) -> &[OperationSpec];

    /// Invoke a declared operation.
    ///
    /// `params` has already been narrowed to the operation's declared
    /// parameter names.
    async fn invoke(
        &self,
        operation: &str,
        params: ParamMap,
    ) -> Result<OperationOutput, EngineError>;

    /// Generic free-text entry point.
    ///
    /// Used whenever a plan names an operation the provider does not declare.
    /// Receives a synthesized instruction and the full merged parameter map.
    async fn handle_free_text(
        &self,
        instruction: &str,
        params: ParamMap,
    ) -> Result<OperationOutput, EngineError>;

    /// Look up a declared operation by exact name
    fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.supported_operations().iter().find(|op| op.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Boards {
        ops: Vec<OperationSpec>,
    }

    #[async_trait]
    impl CapabilityProvider for Boards {
        fn name(&self) -> &str {
            "BOARDS"
        }

        fn supported_operations(&self) -> &[OperationSpec] {
            &self.ops
        }

        async fn invoke(
            &self,
            operation: &str,
            _params: ParamMap,
        ) -> Result<OperationOutput, EngineError> {
            Ok(OperationOutput::success(json!({ "op": operation })))
        }

        async fn handle_free_text(
            &self,
            instruction: &str,
            _params: ParamMap,
        ) -> Result<OperationOutput, EngineError> {
            Ok(OperationOutput::message(instruction))
        }
    }

    #[tokio::test]
    async fn test_operation_lookup_is_exact() {
        let provider = Boards {
            ops: vec![OperationSpec::new("list_boards", &["project_id"])],
        };

        assert!(provider.operation("list_boards").is_some());
        assert!(provider.operation("List_Boards").is_none());
        assert!(provider.operation("list").is_none());

        let out = provider
            .invoke("list_boards", ParamMap::new())
            .await
            .unwrap();
        assert!(out.is_success());
    }
}
