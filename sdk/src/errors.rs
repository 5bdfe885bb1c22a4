//! Error types and handling
//!
//! This module provides the error types shared between the engine and the
//! capability providers. All errors implement the `ErrorExt` trait which
//! provides user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! User hints are static strings. They never contain credentials, raw NLU
//! replies or provider internals, so they are safe to show to end users.

use thiserror::Error;

/// Trait for engine error extensions
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around by rephrasing the
    /// request. Non-recoverable errors require fixing configuration.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Provider**: Unknown provider or operation, bad parameters, failed operation
/// - **NLU**: Upstream language-understanding failures surfaced to callers
/// - **Validation**: Post-condition check failures
/// - **Keyring**: Credential storage failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::ProviderNotFound("XYZ".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("bad endpoint".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Provider errors
    #[error("Provider {0} not found")]
    ProviderNotFound(String),

    #[error("Unknown operation {operation} on provider {provider}")]
    UnknownOperation { provider: String, operation: String },

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("{0}")]
    OperationFailed(String),

    // NLU errors
    #[error("NLU error: {0}")]
    Nlu(String),

    // Post-condition errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::ProviderNotFound(_) => "The plan referenced a component that is not available",
            Self::UnknownOperation { .. } => "The requested operation is not supported",
            Self::MissingParameter(_) | Self::InvalidParameter { .. } => {
                "The request is missing details. Try rephrasing it"
            }
            Self::OperationFailed(_) => "The operation could not be completed",

            Self::Nlu(_) => "The language service is unavailable. Try again later",

            Self::Validation(_) => "The result could not be verified",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::KeyringError(_))
    }
}
