//! Plan Interpreter
//!
//! Turns the raw structured result of an NLU analysis into a typed `Plan`.
//! The model is not held to a schema: missing fields get defaults, and any
//! result without a non-empty "plan" list yields an empty plan.

use sdk::ParamMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Intent recorded when the result names none
pub const UNKNOWN_INTENT: &str = "unknown";

/// Ordered list of steps derived from one NLU analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub intent: String,
    pub entities: ParamMap,
    pub steps: Vec<Step>,
}

impl Plan {
    /// Plan with no steps; surfaces as "could not build an execution plan"
    pub fn empty() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            entities: ParamMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One provider + operation + params triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub provider: String,
    pub operation: String,
    pub params: ParamMap,
}

impl Step {
    pub fn new(provider: impl Into<String>, operation: impl Into<String>, params: ParamMap) -> Self {
        Self {
            provider: provider.into(),
            operation: operation.into(),
            params,
        }
    }
}

/// Spellings of the provider field, in order of preference
const PROVIDER_KEYS: [&str; 3] = ["agent", "provider", "provider_name"];

/// Spellings of the operation field, in order of preference
const OPERATION_KEYS: [&str; 3] = ["action", "operation", "operation_name"];

impl Step {
    /// Read a step as the model writes it.
    ///
    /// Several spellings may be present at once; the first string value in
    /// preference order wins. Non-object params become an empty map.
    fn from_entry(entry: &ParamMap) -> Self {
        let params = match entry.get("params") {
            Some(Value::Object(map)) => map.clone(),
            _ => ParamMap::new(),
        };
        Step::new(
            first_str(entry, &PROVIDER_KEYS),
            first_str(entry, &OPERATION_KEYS),
            params,
        )
    }
}

fn first_str(entry: &ParamMap, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Build a `Plan` from a raw NLU result.
///
/// A map with a non-empty "plan" list yields one step per entry, in order.
/// Intent defaults to "unknown" and entities to an empty map. Entries that
/// are not step-shaped are kept as steps with an empty provider name, so the
/// dispatcher records them as failures instead of silently skipping them.
///
/// Anything else, including the `{"response": ...}` fallback shape, yields
/// an empty plan.
pub fn interpret(raw: &Value) -> Plan {
    let Some(map) = raw.as_object() else {
        tracing::warn!("NLU result is not a map; no plan built");
        return Plan::empty();
    };

    let entries = match map.get("plan").and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => entries,
        _ => {
            tracing::warn!("NLU result has no usable plan list");
            return Plan::empty();
        }
    };

    let steps = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry.as_object() {
            Some(entry) => Step::from_entry(entry),
            None => {
                tracing::warn!("Plan entry {} is not an object: {}", i + 1, entry);
                Step::new("", "", ParamMap::new())
            }
        })
        .collect();

    let intent = match map.get("intent") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => UNKNOWN_INTENT.to_string(),
    };
    let entities = match map.get("entities") {
        Some(Value::Object(entities)) => entities.clone(),
        _ => ParamMap::new(),
    };

    Plan {
        intent,
        entities,
        steps,
    }
}
