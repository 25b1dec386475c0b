//! Dynamically-typed property values.
//!
//! Service and module properties are heterogeneous: strings, integers,
//! floats, booleans, or lists of any of these.  [`Value`] is the common
//! representation, and it knows how to compare itself against a textual
//! filter operand with the coercion rules the filter language requires:
//! numeric properties are compared numerically, booleans by their canonical
//! spelling, lists element-wise (any match wins), and everything else as a
//! string.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically-typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Homogeneous or heterogeneous list of values.
    List(Vec<Value>),
}

/// Comparison operator applied by a filter leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Exact equality (`=`).
    Eq,
    /// Less-than-or-equal (`<=`).
    Le,
    /// Greater-than-or-equal (`>=`).
    Ge,
    /// Approximate equality (`~=`): case is folded and whitespace stripped.
    Approx,
}

impl Value {
    /// Compare this value against a filter operand string.
    ///
    /// `fold_case` controls whether string comparisons ignore case; it is
    /// driven by the `match_case` flag of the enclosing filter evaluation.
    /// Approximate comparison always folds case and strips whitespace,
    /// regardless of the flag.
    pub fn compare(&self, op: CompareOp, operand: &str, fold_case: bool) -> bool {
        match self {
            Value::Str(s) => compare_str(s, op, operand, fold_case),
            Value::Int(i) => compare_int(*i, op, operand),
            Value::Float(f) => compare_float(*f, op, operand),
            Value::Bool(b) => compare_bool(*b, op, operand),
            // A list matches if any element matches.
            Value::List(items) => items.iter().any(|v| v.compare(op, operand, fold_case)),
        }
    }

    /// View this value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// View this value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

fn compare_str(s: &str, op: CompareOp, operand: &str, fold_case: bool) -> bool {
    match op {
        CompareOp::Eq => {
            if fold_case {
                s.eq_ignore_ascii_case(operand)
            } else {
                s == operand
            }
        }
        CompareOp::Approx => approx_fold(s) == approx_fold(operand),
        // Relational string comparison is lexicographic.
        CompareOp::Ge => {
            if fold_case {
                s.to_ascii_lowercase() >= operand.to_ascii_lowercase()
            } else {
                s >= operand
            }
        }
        CompareOp::Le => {
            if fold_case {
                s.to_ascii_lowercase() <= operand.to_ascii_lowercase()
            } else {
                s <= operand
            }
        }
    }
}

fn compare_int(value: i64, op: CompareOp, operand: &str) -> bool {
    let Ok(rhs) = operand.trim().parse::<i64>() else {
        return false;
    };
    match op {
        CompareOp::Eq | CompareOp::Approx => value == rhs,
        CompareOp::Ge => value >= rhs,
        CompareOp::Le => value <= rhs,
    }
}

fn compare_float(value: f64, op: CompareOp, operand: &str) -> bool {
    let Ok(rhs) = operand.trim().parse::<f64>() else {
        return false;
    };
    match op {
        CompareOp::Eq | CompareOp::Approx => value == rhs,
        CompareOp::Ge => value >= rhs,
        CompareOp::Le => value <= rhs,
    }
}

fn compare_bool(value: bool, op: CompareOp, operand: &str) -> bool {
    let rhs = operand.trim().eq_ignore_ascii_case("true");
    // All operators degrade to equality for booleans.
    let _ = op;
    value == rhs
}

/// Fold used by `~=`: lowercase, whitespace removed.
fn approx_fold(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_equality_respects_fold_flag() {
        let v = Value::from("Foo");
        assert!(v.compare(CompareOp::Eq, "Foo", false));
        assert!(!v.compare(CompareOp::Eq, "foo", false));
        assert!(v.compare(CompareOp::Eq, "foo", true));
    }

    #[test]
    fn approx_ignores_case_and_whitespace() {
        let v = Value::from("Hello World");
        assert!(v.compare(CompareOp::Approx, "helloworld", false));
        assert!(v.compare(CompareOp::Approx, " HELLO  WORLD ", false));
        assert!(!v.compare(CompareOp::Approx, "helloworlds", false));
    }

    #[test]
    fn integer_comparison_is_numeric() {
        let v = Value::from(42);
        assert!(v.compare(CompareOp::Eq, "42", false));
        assert!(v.compare(CompareOp::Ge, "7", false));
        assert!(!v.compare(CompareOp::Le, "7", false));
        // "042" would fail a string compare but parses to the same number.
        assert!(v.compare(CompareOp::Eq, "042", false));
        // Unparseable operand never matches.
        assert!(!v.compare(CompareOp::Eq, "forty-two", false));
    }

    #[test]
    fn float_relational() {
        let v = Value::from(2.5);
        assert!(v.compare(CompareOp::Ge, "2.5", false));
        assert!(v.compare(CompareOp::Le, "3", false));
        assert!(!v.compare(CompareOp::Ge, "3", false));
    }

    #[test]
    fn bool_degrades_to_equality() {
        let v = Value::from(true);
        assert!(v.compare(CompareOp::Eq, "true", false));
        assert!(v.compare(CompareOp::Eq, " TRUE ", false));
        assert!(v.compare(CompareOp::Ge, "true", false));
        assert!(!v.compare(CompareOp::Eq, "false", false));
    }

    #[test]
    fn list_matches_any_element() {
        let v = Value::from(vec!["alpha", "beta"]);
        assert!(v.compare(CompareOp::Eq, "beta", false));
        assert!(!v.compare(CompareOp::Eq, "gamma", false));
    }

    #[test]
    fn values_serialize_untagged() {
        let value = Value::List(vec![Value::Str("a".to_owned()), Value::Int(3)]);
        let json = serde_json::to_string(&value).expect("value should serialize");
        assert_eq!(json, r#"["a",3]"#);
        let back: Value = serde_json::from_str(&json).expect("value should deserialize");
        assert_eq!(back, value);
    }
}
