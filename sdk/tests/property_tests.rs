use proptest::prelude::*;
use sdk::errors::{EngineError, ErrorExt};
use sdk::types::{OperationOutput, OperationSpec, OperationStatus, ParamMap};
use serde_json::{json, Value};

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::ProviderNotFound(error_str.clone()),
            EngineError::MissingParameter(error_str.clone()),
            EngineError::OperationFailed(error_str.clone()),
            EngineError::Nlu(error_str.clone()),
            EngineError::Validation(error_str.clone()),
            EngineError::KeyringError(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains("NLU error"));
        }
    }
}

proptest! {
    #[test]
    fn test_select_is_subset_of_declared(
        keys in prop::collection::vec("[a-z_]{1,8}", 0..10),
        declared in prop::collection::vec("[a-z_]{1,8}", 0..5),
    ) {
        let mut params = ParamMap::new();
        for (i, key) in keys.iter().enumerate() {
            params.insert(key.clone(), json!(i));
        }
        let declared_refs: Vec<&str> = declared.iter().map(String::as_str).collect();
        let spec = OperationSpec::new("op", &declared_refs);

        let selected = spec.select(&params);
        for key in selected.keys() {
            prop_assert!(declared.contains(key));
            prop_assert_eq!(selected.get(key), params.get(key));
        }
        for key in &declared {
            prop_assert_eq!(selected.contains_key(key), params.contains_key(key));
        }
    }
}

proptest! {
    #[test]
    fn test_only_explicit_error_status_fails(status in "[a-z]{0,10}") {
        let out = OperationOutput::from_value(json!({ "status": status.clone() }));
        let expected = if status == "error" {
            OperationStatus::Error
        } else {
            OperationStatus::Success
        };
        prop_assert_eq!(out.status, expected);
        prop_assert_eq!(out.data, None::<Value>);
    }
}
