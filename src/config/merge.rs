//! Configuration merge logic
//!
//! Layers are merged in order:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        // Administrator lists and the like are replaced, never concatenated
        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_override_keeps_siblings() {
        let base = json!({
            "reconciler": {"interval_seconds": 5, "expire_batch": 100}
        });
        let overlay = json!({
            "reconciler": {"interval_seconds": 30}
        });
        let result = deep_merge(base, overlay);

        assert_eq!(result["reconciler"]["interval_seconds"], 30);
        assert_eq!(result["reconciler"]["expire_batch"], 100);
    }

    #[test]
    fn test_administrator_lists_replace() {
        let base = json!({"administrators": {"mysql": ["alice", "bob"]}});
        let overlay = json!({"administrators": {"mysql": ["carol"]}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["administrators"]["mysql"], json!(["carol"]));
    }

    #[test]
    fn test_matrix_rows_merge() {
        let base = json!({"exclusive": {"matrix": {"A": {"B": false}}}});
        let overlay = json!({"exclusive": {"matrix": {"A": {"C": false}, "D": {"*": false}}}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["exclusive"]["matrix"]["A"]["B"], false);
        assert_eq!(result["exclusive"]["matrix"]["A"]["C"], false);
        assert_eq!(result["exclusive"]["matrix"]["D"]["*"], false);
    }

    #[test]
    fn test_null_overrides() {
        let result = deep_merge(json!({"callback_url": "x"}), json!({"callback_url": null}));
        assert!(result["callback_url"].is_null());
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({"skip_human_stages": false, "system_operator": "system"});
        let host = json!({"skip_human_stages": true});
        let cli = json!({"system_operator": "robot"});

        let result = merge_layers(vec![builtin, host, cli]);

        assert_eq!(result["skip_human_stages"], true);
        assert_eq!(result["system_operator"], "robot");
    }
}
