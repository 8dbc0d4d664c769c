//! Condition evaluation against a trigger payload.
//!
//! Conditions are AND-combined; there is no OR and no nesting. Evaluation is
//! pure and never panics, so it is safe to call for dry-run previews as well
//! as real runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Contains => "contains",
        }
    }

    fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// A single boolean test against the trigger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot path into the payload. Numeric segments index into arrays.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Structural check used when a rule is created or updated.
    pub fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("field must not be empty".into());
        }
        if self.field.split('.').any(str::is_empty) {
            return Err(format!("field '{}' has an empty path segment", self.field));
        }
        if self.operator == Operator::In && !self.value.is_array() {
            return Err(format!("operator 'in' on '{}' needs an array value", self.field));
        }
        if self.operator.is_ordering() && !self.value.is_number() {
            return Err(format!(
                "operator '{}' on '{}' needs a numeric value",
                self.operator, self.field
            ));
        }
        Ok(())
    }

    pub fn passes(&self, payload: &Value) -> bool {
        let actual = resolve_path(payload, &self.field);
        match self.operator {
            Operator::Eq => actual.is_some_and(|a| strict_eq(a, &self.value)),
            Operator::Neq => !actual.is_some_and(|a| strict_eq(a, &self.value)),
            Operator::Gt => compare(actual, &self.value, |a, b| a > b),
            Operator::Gte => compare(actual, &self.value, |a, b| a >= b),
            Operator::Lt => compare(actual, &self.value, |a, b| a < b),
            Operator::Lte => compare(actual, &self.value, |a, b| a <= b),
            Operator::In => match (actual, self.value.as_array()) {
                (Some(a), Some(members)) => members.iter().any(|m| strict_eq(a, m)),
                _ => false,
            },
            Operator::Contains => actual
                .is_some_and(|a| string_cast(a).contains(string_cast(&self.value).as_str())),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// True iff every condition passes. An empty list always passes.
pub fn evaluate(conditions: &[Condition], payload: &Value) -> bool {
    conditions.iter().all(|c| c.passes(payload))
}

/// Per-condition verdicts, in list order. Used for previews and debug logs.
pub fn explain(conditions: &[Condition], payload: &Value) -> Vec<(Condition, bool)> {
    conditions
        .iter()
        .map(|c| (c.clone(), c.passes(payload)))
        .collect()
}

/// Walk a dot path. Returns `None` if any segment is missing.
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Equality without type coercion. Two numbers compare by value so that
/// `15` and `15.0` are equal; every other pairing uses structural equality.
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn compare(actual: Option<&Value>, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn string_cast(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
