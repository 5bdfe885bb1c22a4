//! Configuration management
//!
//! This module handles loading, validation, and management of the Taskpilot
//! configuration. Configuration is stored in TOML format at
//! ~/.taskpilot/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **nlu**: NLU endpoint, model, sampling and retry settings
//! - **cache**: Intent cache TTL
//! - **validation**: Post-condition intents and the provider operation that checks them
//!
//! # Environment Overrides
//!
//! After the file is loaded, `TASKPILOT_*` environment variables override
//! individual values (see `Config::apply_env_overrides`). The NLU credential
//! never lives in the file; `[nlu] api_key_env` names the variable holding it.
//!
//! # Examples
//!
//! ```no_run
//! use taskpilot_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Model: {}", config.nlu.model);
//! println!("Cache TTL: {}s", config.cache.ttl_secs);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the per-attempt NLU timeout
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub nlu: NluConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    /// `TASKPILOT_*` variables that were set but could not be parsed.
    /// Loading happens before logging is up, so callers report these.
    #[serde(skip)]
    pub rejected_overrides: Vec<String>,
}

/// Core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// NLU service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    /// Chat-completions endpoint URL
    #[serde(default = "default_nlu_endpoint")]
    pub endpoint: String,

    /// Model id
    #[serde(default = "default_nlu_model")]
    pub model: String,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Total attempts per call
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    // Note: the key itself is read from the environment or the OS keychain
}

/// Intent cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Post-condition validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Intents that trigger a post-condition check
    #[serde(default = "default_validation_intents")]
    pub intents: Vec<String>,

    /// Provider that performs the check
    #[serde(default = "default_validation_provider")]
    pub provider: String,

    /// Operation invoked on that provider
    #[serde(default = "default_validation_operation")]
    pub operation: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_nlu_endpoint() -> String {
    "https://api.intelligence.io.solutions/api/v1/chat/completions".to_string()
}

fn default_nlu_model() -> String {
    "deepseek-ai/DeepSeek-R1-0528".to_string()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> f64 {
    60.0
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_api_key_env() -> String {
    "TASKPILOT_NLU_API_KEY".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_validation_intents() -> Vec<String> {
    vec![
        "create_project".to_string(),
        "close_task".to_string(),
        "update_task".to_string(),
    ]
}

fn default_validation_provider() -> String {
    "ACM".to_string()
}

fn default_validation_operation() -> String {
    "validate_changes".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            endpoint: default_nlu_endpoint(),
            model: default_nlu_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            intents: default_validation_intents(),
            provider: default_validation_provider(),
            operation: default_validation_operation(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.taskpilot/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Config::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.taskpilot/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".taskpilot").join("config.toml"))
    }

    /// Apply `TASKPILOT_*` overrides from the process environment.
    ///
    /// Rejected keys are kept in `rejected_overrides`.
    pub fn apply_env_overrides(&mut self) {
        self.rejected_overrides = self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the environment.
    ///
    /// Values that fail to parse are ignored; their keys are returned so
    /// the caller can warn about them.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TASKPILOT_LOG_LEVEL") {
            self.core.log_level = v.trim().to_lowercase();
        }
        if let Some(v) = lookup("TASKPILOT_NLU_ENDPOINT") {
            self.nlu.endpoint = v.trim().to_string();
        }
        if let Some(v) = lookup("TASKPILOT_NLU_MODEL") {
            self.nlu.model = v.trim().to_string();
        }

        let mut rejected = Vec::new();
        override_parsed(
            &lookup,
            &mut rejected,
            "TASKPILOT_NLU_TEMPERATURE",
            &mut self.nlu.temperature,
        );
        override_parsed(
            &lookup,
            &mut rejected,
            "TASKPILOT_NLU_MAX_TOKENS",
            &mut self.nlu.max_tokens,
        );
        override_parsed(
            &lookup,
            &mut rejected,
            "TASKPILOT_NLU_TIMEOUT",
            &mut self.nlu.timeout_secs,
        );
        override_parsed(
            &lookup,
            &mut rejected,
            "TASKPILOT_NLU_RETRY_COUNT",
            &mut self.nlu.retry_count,
        );
        override_parsed(
            &lookup,
            &mut rejected,
            "TASKPILOT_NLU_RETRY_DELAY_MS",
            &mut self.nlu.retry_delay_ms,
        );
        override_parsed(&lookup, &mut rejected, "TASKPILOT_CACHE_TTL", &mut self.cache.ttl_secs);
        rejected
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if !(self.nlu.endpoint.starts_with("http://") || self.nlu.endpoint.starts_with("https://"))
        {
            return Err(EngineError::Config(format!(
                "NLU endpoint must be an http(s) URL, got '{}'",
                self.nlu.endpoint
            )));
        }

        if !(0.0..=2.0).contains(&self.nlu.temperature) {
            return Err(EngineError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.nlu.max_tokens == 0 {
            return Err(EngineError::Config("max_tokens must be at least 1".to_string()));
        }

        if !(self.nlu.timeout_secs > 0.0 && self.nlu.timeout_secs <= MAX_TIMEOUT_SECS) {
            return Err(EngineError::Config(format!(
                "timeout_secs must be greater than 0 and at most {}",
                MAX_TIMEOUT_SECS
            )));
        }

        if self.nlu.retry_count == 0 {
            return Err(EngineError::Config(
                "retry_count must be at least 1".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(EngineError::Config("ttl_secs must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, rejected: &mut Vec<String>, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => rejected.push(key.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.nlu.model, "deepseek-ai/DeepSeek-R1-0528");
        assert_eq!(config.nlu.retry_count, 3);
        assert_eq!(config.nlu.retry_delay_ms, 1000);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.validation.provider, "ACM");
        assert!(config.validation.intents.contains(&"close_task".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str("[nlu]\nmodel = \"m\"\n").unwrap();
        assert_eq!(config.nlu.model, "m");
        assert_eq!(config.nlu.max_tokens, 2000);
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn test_integer_timeout_accepted() {
        let config: Config = toml::from_str("[nlu]\ntimeout_secs = 45\n").unwrap();
        assert_eq!(config.nlu.timeout_secs, 45.0);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.nlu.endpoint, deserialized.nlu.endpoint);
        assert_eq!(config.validation.intents, deserialized.validation.intents);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TASKPILOT_LOG_LEVEL", "DEBUG"),
            ("TASKPILOT_NLU_MODEL", "other-model"),
            ("TASKPILOT_NLU_RETRY_COUNT", "5"),
            ("TASKPILOT_NLU_TIMEOUT", "2.5"),
            ("TASKPILOT_CACHE_TTL", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        let rejected = config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.nlu.model, "other-model");
        assert_eq!(config.nlu.retry_count, 5);
        assert_eq!(config.nlu.timeout_secs, 2.5);
        // Unparseable value leaves the default in place and is reported
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(rejected, vec!["TASKPILOT_CACHE_TTL".to_string()]);
    }

    #[test]
    fn test_all_rejected_overrides_reported_in_order() {
        let env: HashMap<&str, &str> = [
            ("TASKPILOT_NLU_TIMEOUT", "soon"),
            ("TASKPILOT_NLU_MAX_TOKENS", "-1"),
            ("TASKPILOT_NLU_RETRY_DELAY_MS", "1000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        let rejected = config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            rejected,
            vec!["TASKPILOT_NLU_MAX_TOKENS", "TASKPILOT_NLU_TIMEOUT"]
        );
        assert_eq!(config.nlu.timeout_secs, 60.0);
        assert_eq!(config.nlu.max_tokens, 2000);
        assert_eq!(config.nlu.retry_delay_ms, 1000);
    }

    #[test]
    fn test_rejected_overrides_not_serialized() {
        let mut config = Config::default();
        config.rejected_overrides.push("TASKPILOT_CACHE_TTL".to_string());

        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("rejected_overrides"));
        let reloaded: Config = toml::from_str(&text).unwrap();
        assert!(reloaded.rejected_overrides.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.core.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.nlu.retry_count = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.nlu.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.nlu.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());

        for timeout_secs in [0.0, -5.0, 1e20, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.nlu.timeout_secs = timeout_secs;
            assert!(
                matches!(config.validate(), Err(EngineError::Config(msg)) if msg.contains("timeout_secs")),
                "timeout_secs = {} passed validation",
                timeout_secs
            );
        }

        let mut config = Config::default();
        config.nlu.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }
}
