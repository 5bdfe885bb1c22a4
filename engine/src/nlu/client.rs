//! Backoff-Retrying NLU Client
//!
//! Performs one logical call against an OpenAI-compatible chat-completions
//! endpoint, masking transient failures with bounded exponential backoff.
//!
//! Retry policy:
//! - Up to `max_attempts` attempts in total
//! - Timeouts, connection failures and 5xx responses are retried
//! - Every other 4xx response fails immediately
//! - The delay before retry `k` is `base_delay * 2^(k-1)`
//!
//! Each attempt has its own timeout. There is no deadline spanning all
//! attempts, so the worst case is `max_attempts * timeout` plus the delays.

use super::{build_messages, parse_structured_reply, Message, NluClient, NluError, Result};
use crate::config::NluConfig;
use crate::secrets::{scrub, SecretString};
use async_trait::async_trait;
use sdk::{EngineError, ParamMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// NLU client with per-attempt timeout and exponential backoff
#[derive(Clone)]
pub struct RetryingClient {
    endpoint: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
    backoff: BackoffPolicy,
    api_key: SecretString,
    system_prompt: String,
    http: reqwest::Client,
}

impl RetryingClient {
    /// Create a client from the `[nlu]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the timeout is not a positive
    /// duration or the HTTP client cannot be built.
    pub fn new(config: &NluConfig, api_key: SecretString) -> std::result::Result<Self, EngineError> {
        let timeout = attempt_timeout(config.timeout_secs)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            backoff: BackoffPolicy::new(
                config.retry_count,
                Duration::from_millis(config.retry_delay_ms),
            ),
            api_key,
            system_prompt: String::new(),
            http,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Use `prompt` as the system message of every call
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Execute the HTTP round trip with retries and return the raw reply text.
    pub async fn complete(&self, messages: &[Message]) -> Result<String> {
        let max_attempts = self.backoff.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            match self.send_once(messages).await {
                Ok(content) => {
                    info!(
                        "NLU call succeeded in {:.2}ms (attempt {}/{})",
                        start.elapsed().as_secs_f64() * 1000.0,
                        attempt,
                        max_attempts
                    );
                    return Ok(content);
                }
                Err(err) => {
                    warn!(
                        "NLU call failed (attempt {}/{}, {:.2}ms): {}",
                        attempt,
                        max_attempts,
                        start.elapsed().as_secs_f64() * 1000.0,
                        err
                    );

                    if !err.is_transient() || attempt >= max_attempts {
                        let err = err.with_attempts(attempt);
                        error!("Giving up on NLU call: {}", err);
                        return Err(err);
                    }

                    let delay = self.backoff.delay_before_retry(attempt);
                    info!("Retrying NLU call in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One attempt. Errors carry `attempts = 1`; the retry loop restamps them.
    async fn send_once(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.unsecure())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NluError::Upstream {
                status: status.as_u16(),
                attempts: 1,
                body: scrub(&truncate(&body, 500)),
            });
        }

        let data: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                NluError::Timeout { attempts: 1 }
            } else {
                NluError::Parse(e.to_string())
            }
        })?;

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| NluError::Parse("No choices in response".to_string()))?;

        if content.trim().is_empty() {
            return Err(NluError::EmptyReply);
        }

        debug!("NLU reply (first 500 chars): {}", truncate(&content, 500));
        Ok(content)
    }
}

#[async_trait]
impl NluClient for RetryingClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn call(&self, prompt: &str, context: Option<&ParamMap>) -> Result<Value> {
        let messages = build_messages(&self.system_prompt, prompt, context);
        let content = self.complete(&messages).await?;
        Ok(parse_structured_reply(&content))
    }
}

fn map_transport_error(e: reqwest::Error) -> NluError {
    if e.is_timeout() {
        NluError::Timeout { attempts: 1 }
    } else {
        NluError::Connection {
            attempts: 1,
            message: scrub(&e.to_string()),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn attempt_timeout(secs: f64) -> std::result::Result<Duration, EngineError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(EngineError::Config(format!(
            "timeout_secs must be a positive duration, got {}",
            secs
        ))),
    }
}
