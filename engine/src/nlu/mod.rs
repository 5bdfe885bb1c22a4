//! NLU Abstraction Layer
//!
//! The natural-language-understanding collaborator turns a prompt into a
//! structured result (normally a JSON object carrying intent, entities and a
//! plan). This module defines the `NluClient` contract, the conversation
//! message types, the typed failure taxonomy, and the lenient extraction of
//! structured data from free-form model replies.

use async_trait::async_trait;
use sdk::ParamMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

pub mod client;

pub use client::{BackoffPolicy, RetryingClient};

/// Result type for NLU operations
pub type Result<T> = std::result::Result<T, NluError>;

/// Errors that can occur during an NLU call.
///
/// Variants raised after retrying carry the number of attempts made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NluError {
    #[error("NLU request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("NLU upstream returned HTTP {status} after {attempts} attempt(s): {body}")]
    Upstream {
        status: u16,
        attempts: u32,
        body: String,
    },

    #[error("NLU connection failed after {attempts} attempt(s): {message}")]
    Connection { attempts: u32, message: String },

    #[error("Unexpected NLU response format: {0}")]
    Parse(String),

    #[error("NLU returned an empty reply")]
    EmptyReply,
}

impl NluError {
    /// Timeouts, connection failures and 5xx responses are worth retrying.
    /// Every other failure, including all other 4xx statuses, is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Upstream { status, .. } => (500..600).contains(status),
            Self::Parse(_) | Self::EmptyReply => false,
        }
    }

    /// Number of attempts recorded on the error, if it is a transport failure
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Timeout { attempts }
            | Self::Upstream { attempts, .. }
            | Self::Connection { attempts, .. } => Some(*attempts),
            Self::Parse(_) | Self::EmptyReply => None,
        }
    }

    pub(crate) fn with_attempts(self, n: u32) -> Self {
        match self {
            Self::Timeout { .. } => Self::Timeout { attempts: n },
            Self::Upstream { status, body, .. } => Self::Upstream {
                status,
                attempts: n,
                body,
            },
            Self::Connection { message, .. } => Self::Connection {
                attempts: n,
                message,
            },
            other => other,
        }
    }
}

impl From<NluError> for sdk::EngineError {
    fn from(err: NluError) -> Self {
        sdk::EngineError::Nlu(err.to_string())
    }
}

/// Message in a conversation with the NLU service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Contract of the NLU collaborator: one logical call, prompt in, structured
/// result out.
#[async_trait]
pub trait NluClient: Send + Sync {
    /// Identifier used in logs (e.g. the model id)
    fn name(&self) -> &str;

    /// Perform one logical call.
    ///
    /// `context`, when given, is merged into the conversation after the
    /// user prompt.
    async fn call(&self, prompt: &str, context: Option<&ParamMap>) -> Result<Value>;
}

/// Build the conversation for one call: system prompt, user prompt, then the
/// optional context serialized as an assistant turn.
pub fn build_messages(system_prompt: &str, prompt: &str, context: Option<&ParamMap>) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt), Message::user(prompt)];
    if let Some(ctx) = context {
        messages.push(Message::assistant(Value::Object(ctx.clone()).to_string()));
    }
    messages
}

/// Matches a brace-delimited object with at most one level of nesting.
static EMBEDDED_OBJECT: OnceLock<Regex> = OnceLock::new();

fn embedded_object_pattern() -> &'static Regex {
    EMBEDDED_OBJECT.get_or_init(|| {
        Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("Invalid embedded object pattern")
    })
}

/// Turn a model reply into structured data.
///
/// 1. A fenced block tagged `json` wins over a generic fenced block; its body
///    replaces the text to parse.
/// 2. The text is parsed as JSON.
/// 3. On failure the first embedded brace-delimited object is parsed instead.
/// 4. If nothing parses, the raw reply is returned as `{"response": <reply>}`.
pub fn parse_structured_reply(content: &str) -> Value {
    let trimmed = content.trim();
    let candidate = extract_fenced_block(trimmed).unwrap_or(trimmed);

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => {
            tracing::debug!("Parsed structured reply");
            value
        }
        Err(e) => {
            tracing::debug!("Reply is not plain JSON ({}), scanning for an embedded object", e);
            embedded_object_pattern()
                .find(candidate)
                .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
                .unwrap_or_else(|| {
                    tracing::warn!("No structured data found in reply, returning raw text");
                    serde_json::json!({ "response": content })
                })
        }
    }
}

/// Body of the preferred fenced block, trimmed.
///
/// Returns `None` when there is no complete fence.
fn extract_fenced_block(content: &str) -> Option<&str> {
    const TAGGED: &str = "```json";
    const FENCE: &str = "```";

    let body_start = match content.find(TAGGED) {
        Some(pos) => pos + TAGGED.len(),
        None => content.find(FENCE)? + FENCE.len(),
    };
    let body_end = body_start + content[body_start..].find(FENCE)?;

    Some(content[body_start..body_end].trim())
}
