//! Taskpilot Engine Library
//!
//! This library provides the plan-based orchestration core of Taskpilot.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// NLU abstraction layer and the backoff-retrying client
pub mod nlu;

/// Intent cache
pub mod cache;

/// Plan types and interpreter
pub mod plan;

/// Execution context, provider registry and step dispatcher
pub mod dispatch;

/// Step outcomes, reports and aggregation
pub mod report;

/// Post-condition validation
pub mod validation;

/// Request orchestration entry point
pub mod orchestrator;

/// NLU-backed capability providers
pub mod providers;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

pub use orchestrator::{Orchestrator, Utterance};
pub use report::{ExecutionReport, ReportStatus};
