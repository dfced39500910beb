use serde_json::Value;

/// Replacement written over denylisted values.
pub const MASK: &str = "*******";

/// Parse a request body and mask every denylisted key. Returns None when the
/// body is not a JSON object or array, which the recorder persists as null.
pub fn redact_body(raw: &str, denylist: &[String]) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) | Ok(v @ Value::Array(_)) => Some(redact_value(v, denylist)),
        _ => None,
    }
}

/// Walk a JSON tree and replace the value of every denylisted key with the
/// mask, regardless of the value's type. Key matching is case-sensitive.
/// String values that themselves decode as JSON objects or arrays are
/// decoded, redacted, and re-encoded so nested-JSON-as-string payloads do
/// not leak. Idempotent: the mask never matches anything on a second pass.
pub fn redact_value(value: Value, denylist: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if denylist.iter().any(|d| d == &k) {
                        (k, Value::String(MASK.to_string()))
                    } else {
                        (k, redact_nested(v, denylist))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| redact_nested(v, denylist))
                .collect(),
        ),
        other => other,
    }
}

fn redact_nested(value: Value, denylist: &[String]) -> Value {
    match value {
        // A string holding encoded JSON: redact inside and re-encode.
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(inner @ Value::Object(_)) | Ok(inner @ Value::Array(_)) => {
                let redacted = redact_value(inner, denylist);
                match serde_json::to_string(&redacted) {
                    Ok(encoded) => Value::String(encoded),
                    Err(_) => Value::String(s),
                }
            }
            _ => Value::String(s),
        },
        v @ Value::Object(_) | v @ Value::Array(_) => redact_value(v, denylist),
        scalar => scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn denylist() -> Vec<String> {
        vec!["password".to_string(), "password_repeat".to_string()]
    }

    #[test]
    fn test_masks_top_level_key() {
        let out = redact_value(
            json!({"email": "a@b.c", "password": "hunter2"}),
            &denylist(),
        );
        assert_eq!(out, json!({"email": "a@b.c", "password": MASK}));
    }

    #[test]
    fn test_masks_at_depth() {
        let out = redact_value(
            json!({"user": {"credentials": {"password": "hunter2", "name": "gb"}}}),
            &denylist(),
        );
        assert_eq!(out["user"]["credentials"]["password"], MASK);
        assert_eq!(out["user"]["credentials"]["name"], "gb");
    }

    #[test]
    fn test_masks_inside_arrays() {
        let out = redact_value(
            json!({"accounts": [{"password": "a"}, {"password": "b"}]}),
            &denylist(),
        );
        assert_eq!(out["accounts"][0]["password"], MASK);
        assert_eq!(out["accounts"][1]["password"], MASK);
    }

    #[test]
    fn test_masks_non_scalar_values() {
        // The denylisted value is replaced even when it is an object.
        let out = redact_value(json!({"password": {"clear": "hunter2"}}), &denylist());
        assert_eq!(out["password"], MASK);
    }

    #[test]
    fn test_masks_inside_string_encoded_json() {
        let inner = r#"{"password":"hunter2","user":"gb"}"#;
        let out = redact_value(json!({ "payload": inner }), &denylist());
        let reparsed: Value =
            serde_json::from_str(out["payload"].as_str().unwrap()).unwrap();
        assert_eq!(reparsed["password"], MASK);
        assert_eq!(reparsed["user"], "gb");
    }

    #[test]
    fn test_plain_strings_untouched() {
        let out = redact_value(json!({"note": "not json at all"}), &denylist());
        assert_eq!(out["note"], "not json at all");
    }

    #[test]
    fn test_idempotent() {
        let first = redact_value(
            json!({"password": "hunter2", "nested": {"password_repeat": 42}}),
            &denylist(),
        );
        let second = redact_value(first.clone(), &denylist());
        assert_eq!(first, second);
    }

    #[test]
    fn test_key_order_preserved() {
        let raw = r#"{"z":1,"password":"x","a":2}"#;
        let out = redact_body(raw, &denylist()).unwrap();
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "password", "a"]);
    }

    #[test]
    fn test_non_json_body_is_none() {
        assert!(redact_body("not json", &denylist()).is_none());
        assert!(redact_body("", &denylist()).is_none());
        // Bare scalars are not loggable bodies either.
        assert!(redact_body("42", &denylist()).is_none());
    }

    #[test]
    fn test_case_sensitive_matching() {
        let out = redact_value(json!({"Password": "kept"}), &denylist());
        assert_eq!(out["Password"], "kept");
    }
}
