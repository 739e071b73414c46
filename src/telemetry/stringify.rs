//! Defensive stringification for telemetry payloads.
//!
//! Anything handed to telemetry gets flattened to bounded text here. These
//! helpers never fail: an unserializable payload becomes a placeholder string,
//! deep nesting is cut off, and long text is truncated with a marker.

use serde::Serialize;
use serde_json::Value;

/// Appended to any text that was cut short.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Nesting depth beyond which payload values are replaced by a placeholder.
pub const MAX_PAYLOAD_DEPTH: usize = 32;

const DEPTH_PLACEHOLDER: &str = "[Max Depth]";

/// Keeps at most `max_chars` characters of `text`, appending
/// [`TRUNCATION_MARKER`] when anything was dropped.
pub fn truncate_field(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let mut out = String::with_capacity(byte_index + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_index]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}

/// Serializes `value` to JSON text without ever failing.
pub fn safe_stringify<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(json) => prune_depth(json, 0).to_string(),
        Err(err) => format!("[Unserializable: {}]", err),
    }
}

fn prune_depth(value: Value, depth: usize) -> Value {
    if depth >= MAX_PAYLOAD_DEPTH {
        return match value {
            Value::Array(_) | Value::Object(_) => Value::String(DEPTH_PLACEHOLDER.to_string()),
            scalar => scalar,
        };
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| prune_depth(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, prune_depth(item, depth + 1)))
                .collect(),
        ),
        scalar => scalar,
    }
}
