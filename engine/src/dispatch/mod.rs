//! Step dispatch
//!
//! Execution context, the provider registry and the Step Dispatcher.

pub mod context;
pub mod dispatcher;
pub mod registry;

pub use context::{ExecutionContext, ENTITIES_KEY};
pub use dispatcher::{free_text_instruction, StepDispatcher};
pub use registry::ProviderRegistry;
