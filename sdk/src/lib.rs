//! Taskpilot SDK
//!
//! Shared library providing the capability-provider contract used by the
//! orchestration engine and by every provider implementation.

/// Capability provider trait
pub mod provider;

/// Error types and handling
pub mod errors;

/// Operation input/output types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt};
pub use provider::CapabilityProvider;
pub use types::{OperationOutput, OperationSpec, OperationStatus, ParamMap, ParamsExt};
