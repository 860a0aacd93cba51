//! Dotted-path access into configuration values
//!
//! `lookup(&value, "sorting.0.1")` walks objects by key and arrays by
//! numeric index. A missing step yields `None`; a present `null` yields
//! `Some(&Value::Null)`, so "not configured" stays distinguishable from
//! "configured as empty".

use serde_json::Value;

/// Look up a dotted path. The empty path returns the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Mutable variant of [`lookup`].
pub fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key with `overlay` winning; every other value
/// (arrays included) is replaced wholesale.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Render a scalar the way it is shown in a table cell.
///
/// `null` renders empty, booleans render `1`/`0`, strings are unquoted.
/// Arrays and objects fall back to their JSON text.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `null`, the empty string, or a whitespace-only string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Read a value as a boolean the way configuration writes it
/// (`true`, `1`, `"1"`, `"true"`).
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "yes" | "on"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_lookup_nested() {
        let value = json!({"sorting": [["id", "asc"]], "filter": null});
        assert_eq!(lookup(&value, "sorting.0.1"), Some(&json!("asc")));
        assert_eq!(lookup(&value, "filter"), Some(&Value::Null));
        assert_eq!(lookup(&value, "missing.key"), None);
        assert_eq!(lookup(&value, "sorting.5"), None);
        assert_eq!(lookup(&value, ""), Some(&value));
    }

    #[test]
    fn test_lookup_mut() {
        let mut value = json!({"a": {"b": 1}});
        if let Some(slot) = lookup_mut(&mut value, "a.b") {
            *slot = json!(2);
        }
        assert_eq!(value, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_merge_objects_and_replace_arrays() {
        let mut base = json!({
            "listProperties": {"primaryKey": "id", "sorting": [["id", "asc"]]},
            "fieldConfigs": {"fieldTypes": {"name": "text", "born": "date"}}
        });
        let overlay = json!({
            "listProperties": {"sorting": [["name", "desc"]]},
            "fieldConfigs": {"fieldTypes": {"born": "datetime"}}
        });
        merge(&mut base, &overlay);

        assert_eq!(
            base,
            json!({
                "listProperties": {"primaryKey": "id", "sorting": [["name", "desc"]]},
                "fieldConfigs": {"fieldTypes": {"name": "text", "born": "datetime"}}
            })
        );
    }

    #[test]
    fn test_display_and_truthy() {
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!(true)), "1");
        assert_eq!(display(&json!(12)), "12");
        assert_eq!(display(&json!("x")), "x");
        assert!(truthy(&json!("1")));
        assert!(!truthy(&json!(0)));
        assert!(is_blank(&json!("  ")));
        assert!(!is_blank(&json!(0)));
    }
}
