//! Helpers over the aggregate payload returned by the `getInitData` action.
//!
//! The payload stays a `serde_json::Value`: its summary and detail fields
//! depend on the caller's role and the cache stores it verbatim.

use serde_json::Value;

use super::options::normalize_options;
use crate::utils::json::{field_truthy, non_empty_str};
use crate::utils::to_text;

/// Keys under which a task carries its options. The backend uses the Hebrew
/// column name; newer endpoints use `options`.
pub const OPTIONS_KEYS: [&str; 2] = ["options", "אפשרויות"];

/// Rewrite every task's options into the canonical JSON-string form.
///
/// Tasks that carry no options key at all get the backend key set to `"[]"`.
pub fn normalize_tasks(payload: &mut Value) {
    let tasks = match payload.get_mut("tasks").and_then(Value::as_array_mut) {
        Some(tasks) => tasks,
        None => return,
    };

    for task in tasks.iter_mut() {
        let Some(fields) = task.as_object_mut() else {
            continue;
        };

        let mut normalized_any = false;
        for key in OPTIONS_KEYS {
            if let Some(raw) = fields.get(key) {
                let canonical = normalize_options(Some(raw));
                fields.insert(key.to_string(), Value::String(canonical));
                normalized_any = true;
            }
        }
        if !normalized_any {
            fields.insert(OPTIONS_KEYS[1].to_string(), Value::String(normalize_options(None)));
        }
    }
}

/// A response the client accepts as data: an object without a truthy `error`.
pub fn is_data_response(response: &Value) -> bool {
    response.is_object() && !field_truthy(response.get("error"))
}

/// Whether a mutation or session response reports success.
pub fn is_success(response: &Value) -> bool {
    field_truthy(response.get("success"))
}

/// Server-supplied error message, if any.
pub fn error_message(response: &Value) -> Option<String> {
    response
        .get("error")
        .filter(|e| crate::utils::is_truthy(e))
        .map(to_text)
}

pub fn role_tag(response: &Value) -> Option<&str> {
    non_empty_str(response, "role")
}

pub fn username(response: &Value) -> Option<&str> {
    non_empty_str(response, "username")
}

/// Display name, falling back to `fullName` as older servers send it.
pub fn display_name(response: &Value) -> Option<&str> {
    non_empty_str(response, "displayName").or_else(|| non_empty_str(response, "fullName"))
}
