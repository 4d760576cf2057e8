//! Normalization of a task's "options" field.
//!
//! The backend has stored options in several shapes over time: missing, a
//! native list, a JSON-encoded list, a single object, or a comma-separated
//! string of labels. Parsing walks an ordered list of named strategies; the
//! first one that applies wins. The canonical form is always the JSON string
//! of a list of `{text, requireNote}` objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::utils::{is_truthy, to_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct TaskOption {
    pub text: String,
    pub require_note: bool,
}

impl TaskOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            require_note: false,
        }
    }

    /// Build an option from one list element.
    fn from_item(item: &Value) -> Self {
        match item {
            Value::String(s) => Self::new(s.clone()),
            Value::Object(obj) => Self {
                text: obj
                    .get("text")
                    .filter(|t| is_truthy(t))
                    .map(to_text)
                    .unwrap_or_default(),
                require_note: obj.get("requireNote").map(is_truthy).unwrap_or(false),
            },
            _ => Self::new(String::new()),
        }
    }
}

enum Parsed {
    Options(Vec<TaskOption>),
    NotApplicable,
}

struct ParseStrategy {
    name: &'static str,
    parse: fn(&Value) -> Parsed,
}

/// Evaluated in order. The last strategy applies to everything.
const STRATEGIES: [ParseStrategy; 5] = [
    ParseStrategy {
        name: "absent",
        parse: parse_absent,
    },
    ParseStrategy {
        name: "list",
        parse: parse_list,
    },
    ParseStrategy {
        name: "single-object",
        parse: parse_single_object,
    },
    ParseStrategy {
        name: "json-text",
        parse: parse_json_text,
    },
    ParseStrategy {
        name: "comma-separated",
        parse: parse_comma_separated,
    },
];

fn parse_absent(value: &Value) -> Parsed {
    if is_truthy(value) {
        Parsed::NotApplicable
    } else {
        Parsed::Options(Vec::new())
    }
}

fn parse_list(value: &Value) -> Parsed {
    match value {
        Value::Array(items) => Parsed::Options(items.iter().map(TaskOption::from_item).collect()),
        _ => Parsed::NotApplicable,
    }
}

fn parse_single_object(value: &Value) -> Parsed {
    match value {
        Value::Object(_) => Parsed::Options(vec![TaskOption::from_item(value)]),
        _ => Parsed::NotApplicable,
    }
}

fn parse_json_text(value: &Value) -> Parsed {
    let text = match value {
        Value::String(s) => s.trim(),
        _ => return Parsed::NotApplicable,
    };
    if !text.starts_with('[') {
        return Parsed::NotApplicable;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => {
            Parsed::Options(items.iter().map(TaskOption::from_item).collect())
        }
        Ok(_) => Parsed::NotApplicable,
        Err(e) => {
            trace!(error = %e, "Options look like JSON but do not parse");
            Parsed::NotApplicable
        }
    }
}

fn parse_comma_separated(value: &Value) -> Parsed {
    let text = to_text(value);
    Parsed::Options(
        text.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(TaskOption::new)
            .collect(),
    )
}

/// Parse an options field of any historical shape.
pub fn parse_options(field: Option<&Value>) -> Vec<TaskOption> {
    let value = field.unwrap_or(&Value::Null);
    for strategy in &STRATEGIES {
        if let Parsed::Options(options) = (strategy.parse)(value) {
            trace!(strategy = strategy.name, count = options.len(), "Options parsed");
            return options;
        }
    }
    Vec::new()
}

/// Canonical JSON-string form of an options field.
pub fn normalize_options(field: Option<&Value>) -> String {
    serde_json::to_string(&parse_options(field)).unwrap_or_else(|_| "[]".to_string())
}
