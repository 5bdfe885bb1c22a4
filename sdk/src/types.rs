//! Operation input/output types

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named-parameter map passed to every provider operation
pub type ParamMap = serde_json::Map<String, Value>;

/// Declaration of one named operation a provider exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation name as it appears in plans (e.g. "get_project")
    pub name: String,

    /// Declared parameter names; merged params outside this list are dropped
    pub params: Vec<String>,
}

impl OperationSpec {
    /// Create a new operation declaration
    pub fn new(name: impl Into<String>, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Keep only the entries of `params` this operation declares
    pub fn select(&self, params: &ParamMap) -> ParamMap {
        params
            .iter()
            .filter(|(key, _)| self.params.iter().any(|p| p == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Status reported by a provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Error,
}

/// Output from a provider operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutput {
    pub status: OperationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationOutput {
    /// Create a successful output carrying a data payload
    pub fn success(data: Value) -> Self {
        Self {
            status: OperationStatus::Success,
            data: Some(data),
            message: None,
        }
    }

    /// Create a successful output with only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Success,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Create an error output
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Attach a user-facing message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// The "data" payload when it is a map
    pub fn data_map(&self) -> Option<&ParamMap> {
        self.data.as_ref().and_then(Value::as_object)
    }

    /// Normalize a loosely shaped JSON result into an `OperationOutput`.
    ///
    /// Only an explicit `"status": "error"` is treated as failure. A map
    /// without a status is a success; its "data" and "message" fields are
    /// picked up when present. Non-map values become an empty success.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self {
                status: OperationStatus::Success,
                data: None,
                message: None,
            };
        };

        let status = match map.get("status").and_then(Value::as_str) {
            Some("error") => OperationStatus::Error,
            _ => OperationStatus::Success,
        };
        let message = match map.remove("message") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        Self {
            status,
            data: map.remove("data"),
            message,
        }
    }
}

/// Typed accessors over a `ParamMap`.
///
/// Plans and provider data come from a language model, so ids may arrive as
/// numbers or as strings; the string accessors accept both.
pub trait ParamsExt {
    fn param_json(&self, key: &str) -> Result<&Value, EngineError>;
    fn param_str(&self, key: &str) -> Result<String, EngineError>;
    fn param_str_opt(&self, key: &str) -> Option<String>;
}

impl ParamsExt for ParamMap {
    fn param_json(&self, key: &str) -> Result<&Value, EngineError> {
        self.get(key)
            .ok_or_else(|| EngineError::MissingParameter(key.to_string()))
    }

    fn param_str(&self, key: &str) -> Result<String, EngineError> {
        match self.param_json(key)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(EngineError::InvalidParameter {
                name: key.to_string(),
                reason: "expected a string".to_string(),
            }),
        }
    }

    fn param_str_opt(&self, key: &str) -> Option<String> {
        self.param_str(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> ParamMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_select_drops_undeclared_keys() {
        let spec = OperationSpec::new("get_project", &["project_id", "workspace_id"]);
        let merged = params(json!({
            "project_id": 42,
            "workspace_id": 9,
            "entities": {"project_name": "X"},
            "user_id": 3
        }));

        let selected = spec.select(&merged);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected["project_id"], json!(42));
        assert!(!selected.contains_key("entities"));
    }

    #[test]
    fn test_from_value_error_status() {
        let out = OperationOutput::from_value(json!({
            "status": "error",
            "message": "Board not found"
        }));
        assert_eq!(out.status, OperationStatus::Error);
        assert_eq!(out.message.as_deref(), Some("Board not found"));
    }

    #[test]
    fn test_from_value_without_status_is_success() {
        let out = OperationOutput::from_value(json!({"data": {"id": 7}}));
        assert!(out.is_success());
        assert_eq!(out.data_map().and_then(|d| d.get("id")), Some(&json!(7)));

        let out = OperationOutput::from_value(json!("plain text"));
        assert!(out.is_success());
        assert!(out.data.is_none());
    }

    #[test]
    fn test_param_str_accepts_numbers() {
        let p = params(json!({"a": 5, "b": "task-12", "c": {"x": 1}, "d": true}));
        assert_eq!(p.param_str("a").unwrap(), "5");
        assert_eq!(p.param_str("b").unwrap(), "task-12");
        assert!(matches!(
            p.param_str("c"),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(matches!(
            p.param_str("missing"),
            Err(EngineError::MissingParameter(_))
        ));
        assert_eq!(p.param_str_opt("d"), None);
        assert_eq!(p.param_str_opt("a").as_deref(), Some("5"));
    }

    #[test]
    fn test_output_serialization_shape() {
        let out = OperationOutput::success(json!({"id": 1})).with_message("Created");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            json!({"status": "success", "data": {"id": 1}, "message": "Created"})
        );
    }
}
