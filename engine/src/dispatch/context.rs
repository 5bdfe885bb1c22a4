//! Per-request execution state

use sdk::ParamMap;
use serde_json::Value;

/// Key under which the plan entities are injected into step params
pub const ENTITIES_KEY: &str = "entities";

/// Mutable state carried across the steps of one request
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub workspace_id: i64,
    pub user_id: Option<i64>,
    pub entities: ParamMap,
    pub accumulated_data: ParamMap,
}

impl ExecutionContext {
    pub fn new(workspace_id: i64, user_id: Option<i64>, entities: ParamMap) -> Self {
        Self {
            workspace_id,
            user_id,
            entities,
            accumulated_data: ParamMap::new(),
        }
    }

    /// Fill in ambient values a step did not set itself.
    ///
    /// The step's own params always win. Then, only where absent:
    /// `workspace_id`, `user_id` (when known), and the plan entities under
    /// `entities`.
    pub fn merge_params(&self, step_params: &ParamMap) -> ParamMap {
        let mut params = step_params.clone();

        params
            .entry("workspace_id")
            .or_insert_with(|| Value::from(self.workspace_id));
        if let Some(user_id) = self.user_id {
            params
                .entry("user_id")
                .or_insert_with(|| Value::from(user_id));
        }
        params
            .entry(ENTITIES_KEY)
            .or_insert_with(|| Value::Object(self.entities.clone()));

        params
    }

    /// Shallow-merge a step's data; later keys replace earlier ones
    pub fn absorb(&mut self, data: &ParamMap) {
        for (key, value) in data {
            self.accumulated_data.insert(key.clone(), value.clone());
        }
    }

    /// Flat view handed to post-conditions: ambient ids and entities,
    /// overlaid with everything accumulated from step data
    pub fn snapshot(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("workspace_id".into(), Value::from(self.workspace_id));
        map.insert(
            "user_id".into(),
            self.user_id.map(Value::from).unwrap_or(Value::Null),
        );
        map.insert(ENTITIES_KEY.into(), Value::Object(self.entities.clone()));
        for (key, value) in &self.accumulated_data {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ParamMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_explicit_params_win() {
        let ctx = ExecutionContext::new(9, Some(5), map(json!({"project": "X"})));
        let merged = ctx.merge_params(&map(json!({
            "workspace_id": 7,
            "user_id": 1,
            "entities": "custom"
        })));

        assert_eq!(merged["workspace_id"], json!(7));
        assert_eq!(merged["user_id"], json!(1));
        assert_eq!(merged["entities"], json!("custom"));
    }

    #[test]
    fn test_ambient_values_injected() {
        let ctx = ExecutionContext::new(9, Some(5), map(json!({"project": "X"})));
        let merged = ctx.merge_params(&map(json!({"id": 42})));

        assert_eq!(merged["id"], json!(42));
        assert_eq!(merged["workspace_id"], json!(9));
        assert_eq!(merged["user_id"], json!(5));
        assert_eq!(merged["entities"], json!({"project": "X"}));
    }

    #[test]
    fn test_user_id_skipped_when_unknown() {
        let ctx = ExecutionContext::new(9, None, ParamMap::new());
        let merged = ctx.merge_params(&ParamMap::new());
        assert!(!merged.contains_key("user_id"));
        assert_eq!(merged["entities"], json!({}));
    }

    #[test]
    fn test_absorb_later_keys_override() {
        let mut ctx = ExecutionContext::new(1, None, ParamMap::new());
        ctx.absorb(&map(json!({"id": 1, "name": "first"})));
        ctx.absorb(&map(json!({"id": 2})));

        assert_eq!(ctx.accumulated_data["id"], json!(2));
        assert_eq!(ctx.accumulated_data["name"], json!("first"));

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot["workspace_id"], json!(1));
        assert_eq!(snapshot["user_id"], Value::Null);
        assert_eq!(snapshot["id"], json!(2));
    }
}
