//! Single-key JSON parameter protocol.
//!
//! Requests are one-key objects such as `{"xvm":5000}`. The controller
//! echoes the key with the stored value, either at the top level
//! (`{"xvm":5000.000}`) or wrapped in a response envelope
//! (`{"r":{"xvm":5000.000},"f":[1,0,8]}`). An `er` object reports a failure.

use serde_json::{Map, Value};

/// Outcome of checking a response line against a request key.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonReply {
    /// The key was echoed with this value.
    Echo(Value),
    /// The controller reported an error.
    Error(String),
    /// Not a reply to this request.
    Unrelated,
}

/// Encode a single-key request.
pub fn encode(key: &str, value: Value) -> String {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map).to_string()
}

/// Key of a single-key request line, if it is one.
pub fn request_key(line: &str) -> Option<String> {
    match serde_json::from_str::<Value>(line).ok()? {
        Value::Object(map) if map.len() == 1 => map.keys().next().cloned(),
        _ => None,
    }
}

/// Classify a response line for a pending request.
pub fn classify(line: &str, key: &str) -> JsonReply {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) else {
        return JsonReply::Unrelated;
    };

    if let Some(err) = map.get("er") {
        let message = err
            .get("msg")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return JsonReply::Error(message);
    }

    if let Some(v) = map.get(key) {
        return JsonReply::Echo(v.clone());
    }

    match map.get("r") {
        Some(Value::Object(inner)) => inner
            .get(key)
            .map(|v| JsonReply::Echo(v.clone()))
            .unwrap_or(JsonReply::Unrelated),
        _ => JsonReply::Unrelated,
    }
}

/// Render an echoed value as capture text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
