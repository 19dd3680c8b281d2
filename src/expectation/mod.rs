//! Expectation Evaluation
//!
//! Declarative assertions evaluated against an action's result. A definition is a
//! flat mapping with an `operator` and one key path whose value is the
//! expected value:
//!
//! ```rust
//! use chaos_trials::expectation::Expectation;
//! use serde_json::json;
//!
//! let spec = json!({"operator": "ge", "value": "2.0"});
//! let expectation = Expectation::build(spec.as_object().unwrap()).unwrap();
//! assert!(expectation.execute(&json!("3.0")).is_ok());
//!
//! let spec = json!({"operator": "regex", "status": "^RUN"});
//! let expectation = Expectation::build(spec.as_object().unwrap()).unwrap();
//! assert!(expectation.execute(&json!({"status": "STOPPED"})).is_err());
//! ```
//!
//! When both sides parse as floats (JSON numbers, or strings such as
//! `"2.0"`, `"NaN"`, `"inf"`) the comparison is numeric.

mod extractor;

pub use extractor::ValueExtractor;

use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::{Error, Result};

const OPERATOR_KEY: &str = "operator";
const REGEX_OPERATOR: &str = "regex";

/// Comparison operator of an operator expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `eq`, `==`
    Eq,
    /// `ne`, `!=`
    Ne,
    /// `lt`, `<`
    Lt,
    /// `le`, `<=`
    Le,
    /// `gt`, `>`
    Gt,
    /// `ge`, `>=`
    Ge,
}

impl Comparison {
    /// Parse an expectation operator name (`eq`, `ne`, `lt`, `le`, `gt`, `ge`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            _ => None,
        }
    }

    /// Parse a comparison symbol; `=` is accepted for equality.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    /// Comparison symbol used in failure messages.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Evaluate `actual <op> expected`.
    ///
    /// Returns `None` when an ordering operator is applied to values with no
    /// common ordering (e.g. an object and a number).
    #[must_use]
    pub fn evaluate(self, actual: &Value, expected: &Value) -> Option<bool> {
        if let (Some(a), Some(b)) = (as_float(actual), as_float(expected)) {
            return Some(self.floats(a, b));
        }
        match self {
            Self::Eq => Some(actual == expected),
            Self::Ne => Some(actual != expected),
            _ => ordering(actual, expected).map(|ordering| self.matches(ordering)),
        }
    }

    #[allow(clippy::float_cmp)]
    fn floats(self, a: f64, b: f64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }

    fn matches(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn ordering(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Text of a value in messages: strings as-is, everything else as JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Built expectation.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// Comparison between the extracted value and the expected value.
    Operator {
        /// Comparison operator
        comparison: Comparison,
        /// Key path into the result; `None` when the definition had no key
        key_path: Option<String>,
        /// Expected value
        expected: Value,
    },
    /// Substring regex search on the extracted value.
    Regex {
        /// Key path into the result; `None` when the definition had no key
        key_path: Option<String>,
        /// Compiled pattern
        pattern: Regex,
    },
}

impl Expectation {
    /// Build an expectation from its definition.
    ///
    /// When the definition carries several non-operator keys, the last one in
    /// mapping order is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExpectOperator`] when `operator` is missing
    /// (reported as `None`) or unrecognized, and [`Error::Regex`] when a
    /// regex pattern does not compile.
    pub fn build(spec: &Map<String, Value>) -> Result<Self> {
        let operator = match spec.get(OPERATOR_KEY) {
            None | Some(Value::Null) => return Err(Error::InvalidExpectOperator("None".to_string())),
            Some(Value::String(name)) => name.as_str(),
            Some(other) => return Err(Error::InvalidExpectOperator(other.to_string())),
        };
        let (key_path, expected) = spec
            .iter()
            .rev()
            .find(|(key, _)| key.as_str() != OPERATOR_KEY)
            .map_or((None, Value::Null), |(key, value)| {
                (Some(key.clone()), value.clone())
            });

        if operator == REGEX_OPERATOR {
            let pattern = Regex::new(&display_value(&expected))?;
            return Ok(Self::Regex { key_path, pattern });
        }
        let comparison = Comparison::from_name(operator)
            .ok_or_else(|| Error::InvalidExpectOperator(operator.to_string()))?;
        Ok(Self::Operator {
            comparison,
            key_path,
            expected,
        })
    }

    /// Build every expectation of a step.
    ///
    /// # Errors
    ///
    /// Returns the first build error.
    pub fn build_all(specs: &[Map<String, Value>]) -> Result<Vec<Self>> {
        specs.iter().map(Self::build).collect()
    }

    /// Key path this expectation reads.
    #[must_use]
    pub fn key_path(&self) -> Option<&str> {
        match self {
            Self::Operator { key_path, .. } | Self::Regex { key_path, .. } => key_path.as_deref(),
        }
    }

    /// Evaluate against an action result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] when the key path does not resolve,
    /// [`Error::FailedExpectation`] when the assertion does not hold and
    /// [`Error::IncomparableValues`] for orderings between unrelated types.
    pub fn execute(&self, action_result: &Value) -> Result<()> {
        let key_path = self.key_path().unwrap_or("None");
        let actual = ValueExtractor::new(action_result, key_path).extract()?;
        match self {
            Self::Operator {
                comparison,
                expected,
                ..
            } => match comparison.evaluate(actual, expected) {
                Some(true) => Ok(()),
                Some(false) => Err(Error::FailedExpectation(format!(
                    "{} {} {}",
                    display_value(actual),
                    comparison.symbol(),
                    display_value(expected)
                ))),
                None => Err(Error::IncomparableValues {
                    actual: display_value(actual),
                    operator: comparison.symbol().to_string(),
                    expected: display_value(expected),
                }),
            },
            Self::Regex { pattern, .. } => {
                let text = display_value(actual);
                if pattern.is_match(&text) {
                    Ok(())
                } else {
                    Err(Error::FailedExpectation(format!(
                        "Regex pattern {} does not match {text}.",
                        pattern.as_str()
                    )))
                }
            }
        }
    }
}
