pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keychain key under which the NLU credential is stored
pub const NLU_API_KEY: &str = "nlu_api_key";

/// Resolves the NLU credential.
///
/// Lookup order:
/// 1. The environment variable named in `[nlu] api_key_env`
/// 2. The OS keychain (service `taskpilot`, key `nlu_api_key`)
///
/// Secrets are stored in:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
pub struct CredentialStore {
    service_name: String,
}

impl CredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolve the credential from `env_var`, falling back to the keychain.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if neither source holds a non-empty value,
    /// `EngineError::KeyringError` if keychain access itself fails.
    pub fn resolve(&self, env_var: &str, key: &str) -> Result<SecretString, EngineError> {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim().to_string();
            if !value.is_empty() {
                tracing::debug!("Using credential from ${}", env_var);
                return Ok(SecretString::new(value));
            }
        }

        match self.get_secret(key)? {
            Some(secret) => Ok(secret),
            None => Err(EngineError::Config(format!(
                "NLU credential not found. Set ${} or store '{}' in the '{}' keychain service",
                env_var, key, self.service_name
            ))),
        }
    }

    /// Read a secret from the OS keychain. `Ok(None)` when it is not stored.
    pub fn get_secret(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(SecretString::new(secret)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Store a secret in the OS keychain.
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }
}

/// Regex patterns for detecting common secret formats.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            // OpenAI-style keys: sk-, sk-proj-, ...
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            // io.net keys
            Regex::new(r"io-v\d+-[a-zA-Z0-9\-_.]{20,}").expect("Invalid io.net pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
        ]
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`.
///
/// Applied to upstream error bodies and transport errors before they are
/// logged or placed in error values.
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}
