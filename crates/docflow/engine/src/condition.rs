//! Condition evaluation for gated tasks.
//!
//! Conditions are small expressions evaluated against the instance data bag
//! at the moment a task becomes eligible:
//!
//! - `path == literal` / `path != literal` — text comparison (string values
//!   compare unquoted, other values by their JSON text)
//! - `path >= literal` — numeric comparison
//! - `path` — bare truthiness: boolean true, non-zero number, or the strings
//!   `"true"` / `"1"`
//!
//! `path` is a dot-separated route into the bag; segments index nested
//! objects by key and arrays by position. A missing path fails `==`, `>=` and
//! bare checks, and trivially satisfies `!=`.

use serde_json::{Map, Value};

/// Outcome of evaluating a task condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionVerdict {
    Satisfied,
    NotSatisfied { reason: String },
}

impl ConditionVerdict {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionVerdict::Satisfied)
    }

    /// Reason a condition failed, if it did
    pub fn reason(&self) -> Option<&str> {
        match self {
            ConditionVerdict::Satisfied => None,
            ConditionVerdict::NotSatisfied { reason } => Some(reason),
        }
    }
}

/// Pure evaluator over the data bag; holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a condition expression against the data bag.
    pub fn evaluate(&self, condition: &str, data: &Map<String, Value>) -> ConditionVerdict {
        let condition = condition.trim();

        if let Some((path, expected)) = condition.split_once("==") {
            return self.check_equals(path.trim(), unquote(expected.trim()), data);
        }
        if let Some((path, expected)) = condition.split_once("!=") {
            return self.check_not_equals(path.trim(), unquote(expected.trim()), data);
        }
        if let Some((path, threshold)) = condition.split_once(">=") {
            return self.check_at_least(path.trim(), threshold.trim(), data);
        }
        self.check_truthy(condition, data)
    }

    fn check_equals(&self, path: &str, expected: &str, data: &Map<String, Value>) -> ConditionVerdict {
        match lookup(data, path) {
            Some(value) if value_text(value) == expected => ConditionVerdict::Satisfied,
            Some(value) => ConditionVerdict::NotSatisfied {
                reason: format!(
                    "'{}' is '{}', expected '{}'",
                    path,
                    value_text(value),
                    expected
                ),
            },
            None => ConditionVerdict::NotSatisfied {
                reason: format!("'{}' not present in workflow data", path),
            },
        }
    }

    fn check_not_equals(
        &self,
        path: &str,
        rejected: &str,
        data: &Map<String, Value>,
    ) -> ConditionVerdict {
        match lookup(data, path) {
            Some(value) if value_text(value) == rejected => ConditionVerdict::NotSatisfied {
                reason: format!("'{}' is '{}'", path, rejected),
            },
            // A missing path trivially differs from the rejected literal
            _ => ConditionVerdict::Satisfied,
        }
    }

    fn check_at_least(
        &self,
        path: &str,
        threshold: &str,
        data: &Map<String, Value>,
    ) -> ConditionVerdict {
        let Some(value) = lookup(data, path) else {
            return ConditionVerdict::NotSatisfied {
                reason: format!("'{}' not present in workflow data", path),
            };
        };
        let Some(actual) = numeric(value) else {
            return ConditionVerdict::NotSatisfied {
                reason: format!("'{}' is '{}', which is not numeric", path, value_text(value)),
            };
        };
        let Ok(threshold_value) = threshold.parse::<f64>() else {
            return ConditionVerdict::NotSatisfied {
                reason: format!("threshold '{}' is not numeric", threshold),
            };
        };
        if actual >= threshold_value {
            ConditionVerdict::Satisfied
        } else {
            ConditionVerdict::NotSatisfied {
                reason: format!("'{}' is {}, below {}", path, actual, threshold_value),
            }
        }
    }

    fn check_truthy(&self, path: &str, data: &Map<String, Value>) -> ConditionVerdict {
        match lookup(data, path) {
            Some(value) if is_truthy(value) => ConditionVerdict::Satisfied,
            Some(value) => ConditionVerdict::NotSatisfied {
                reason: format!("'{}' is '{}', not truthy", path, value_text(value)),
            },
            None => ConditionVerdict::NotSatisfied {
                reason: format!("'{}' not present in workflow data", path),
            },
        }
    }
}

/// Walk a dot-path into the data bag.
fn lookup<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut value = data.get(first)?;
    for segment in segments {
        value = step(value, segment)?;
    }
    Some(value)
}

/// Walk a dot-path into an arbitrary JSON value. An empty path or `"."`
/// selects the value itself.
pub(crate) fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() || path == "." {
        return Some(root);
    }
    let mut value = root;
    for segment in path.split('.') {
        value = step(value, segment)?;
    }
    Some(value)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Comparison text: strings unquoted, everything else as JSON
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.as_str(), "true" | "1"),
        _ => false,
    }
}

fn unquote(literal: &str) -> &str {
    literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal)
}
