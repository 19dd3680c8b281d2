//! Key-path extraction from action results
//!
//! Paths use the JSONPath subset expectation specs are written in:
//!
//! | Syntax                 | Meaning                                   |
//! |------------------------|-------------------------------------------|
//! | `a.b`                  | nested key                                |
//! | `[0]`, `[-1]`          | array index (negative counts from end)    |
//! | `['a.b']`              | quoted key                                |
//! | `*`, `[*]`             | every member                              |
//! | `[?(@.name == "b")]`   | members whose field satisfies a condition |
//! | `[?(@.status =~ "UP")]`| members whose field matches a regex       |
//! | `[?(@.ready)]`         | members that have the field               |
//!
//! Object results root the path at `$.`, array results at `$`, so
//! `apps[0].name` addresses an object and `[0].name` an array.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::Comparison;
use crate::{Error, Result};

static FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^@?\.?([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z_][A-Za-z0-9_\-]*)*)\s*(?:(==|!=|<=|>=|=~|=|<|>)\s*(.+?))?$",
    )
    .expect("invalid filter pattern")
});

#[derive(Debug)]
enum FilterTest {
    Exists,
    Compare(Comparison, Value),
    Matches(Regex),
}

#[derive(Debug)]
enum Selector {
    Key(String),
    Index(i64),
    Wildcard,
    Filter { field: Vec<String>, test: FilterTest },
}

/// Extracts the value addressed by a key path from an action result.
#[derive(Debug, Clone, Copy)]
pub struct ValueExtractor<'a> {
    input: &'a Value,
    key_path: &'a str,
}

impl<'a> ValueExtractor<'a> {
    /// Create an extractor over `input`.
    #[must_use]
    pub const fn new(input: &'a Value, key_path: &'a str) -> Self {
        Self { input, key_path }
    }

    /// Extract the first value the key path matches.
    ///
    /// Scalar inputs only answer the literal path `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] when nothing matches, or
    /// [`Error::Other`] when the path itself is malformed.
    pub fn extract(&self) -> Result<&'a Value> {
        match self.input {
            Value::Object(_) | Value::Array(_) => {
                let selectors = parse_path(self.key_path)?;
                evaluate(self.input, &selectors)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.not_found())
            }
            scalar if self.key_path == "value" => Ok(scalar),
            _ => Err(self.not_found()),
        }
    }

    fn not_found(&self) -> Error {
        Error::KeyNotFound {
            key_path: self.key_path.to_string(),
            input: self.input.to_string(),
        }
    }
}

fn invalid_path(path: &str, reason: &str) -> Error {
    Error::Other(format!("Invalid key path '{path}': {reason}"))
}

fn parse_path(path: &str) -> Result<Vec<Selector>> {
    let trimmed = path.trim();
    let mut rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
    if rest.is_empty() {
        return Err(invalid_path(path, "empty path"));
    }

    let mut selectors = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let close = closing_bracket(after)
                .ok_or_else(|| invalid_path(path, "missing closing bracket"))?;
            selectors.push(parse_bracket(after[..close].trim()).map_err(|reason| invalid_path(path, &reason))?);
            rest = &after[close + 1..];
            continue;
        }

        let after = rest.strip_prefix('.').unwrap_or(rest);
        if after.starts_with('[') {
            rest = after;
            continue;
        }
        let end = after.find(['.', '[']).unwrap_or(after.len());
        let name = &after[..end];
        if name.is_empty() {
            return Err(invalid_path(path, "empty key"));
        }
        selectors.push(if name == "*" {
            Selector::Wildcard
        } else {
            Selector::Key(name.to_string())
        });
        rest = &after[end..];
    }
    Ok(selectors)
}

fn closing_bracket(input: &str) -> Option<usize> {
    let mut quote = None;
    for (index, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ']' => return Some(index),
            None => {}
        }
    }
    None
}

fn unquote(input: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        input
            .strip_prefix(q)
            .and_then(|inner| inner.strip_suffix(q))
    })
}

fn parse_bracket(inner: &str) -> std::result::Result<Selector, String> {
    if inner == "*" {
        return Ok(Selector::Wildcard);
    }
    if let Some(expression) = inner.strip_prefix('?') {
        return parse_filter(expression.trim());
    }
    if let Some(key) = unquote(inner) {
        return Ok(Selector::Key(key.to_string()));
    }
    inner
        .parse::<i64>()
        .map(Selector::Index)
        .map_err(|_| format!("unsupported selector [{inner}]"))
}

fn parse_literal(literal: &str) -> std::result::Result<Value, String> {
    if let Some(text) = unquote(literal) {
        return Ok(Value::String(text.to_string()));
    }
    serde_json::from_str(literal).map_err(|_| format!("unsupported literal {literal}"))
}

fn parse_filter(expression: &str) -> std::result::Result<Selector, String> {
    let body = expression
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(expression)
        .trim();
    let captures = FILTER
        .captures(body)
        .ok_or_else(|| format!("unsupported filter {expression}"))?;

    let field = captures[1].split('.').map(str::to_string).collect();
    let test = match (captures.get(2), captures.get(3)) {
        (Some(op), Some(literal)) => {
            let value = parse_literal(literal.as_str().trim())?;
            match op.as_str() {
                "=~" => {
                    let pattern = value
                        .as_str()
                        .ok_or_else(|| "regex filter needs a string pattern".to_string())?;
                    FilterTest::Matches(Regex::new(pattern).map_err(|e| e.to_string())?)
                }
                symbol => FilterTest::Compare(
                    Comparison::from_symbol(symbol)
                        .ok_or_else(|| format!("unsupported operator {symbol}"))?,
                    value,
                ),
            }
        }
        _ => FilterTest::Exists,
    };
    Ok(Selector::Filter { field, test })
}

fn field_of<'v>(item: &'v Value, field: &[String]) -> Option<&'v Value> {
    field.iter().try_fold(item, |value, key| value.get(key))
}

fn passes(item: &Value, field: &[String], test: &FilterTest) -> bool {
    let Some(value) = field_of(item, field) else {
        return false;
    };
    match test {
        FilterTest::Exists => true,
        FilterTest::Compare(comparison, expected) => {
            comparison.evaluate(value, expected) == Some(true)
        }
        FilterTest::Matches(pattern) => value.as_str().is_some_and(|s| pattern.is_match(s)),
    }
}

fn members(value: &Value) -> Vec<&Value> {
    match value {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

fn evaluate<'v>(input: &'v Value, selectors: &[Selector]) -> Vec<&'v Value> {
    let mut current = vec![input];
    for selector in selectors {
        let mut next = Vec::new();
        for value in current {
            match selector {
                Selector::Key(key) => next.extend(value.as_object().and_then(|map| map.get(key))),
                Selector::Index(index) => {
                    if let Some(items) = value.as_array() {
                        let resolved = if *index < 0 {
                            i64::try_from(items.len()).ok().map(|len| len + index)
                        } else {
                            Some(*index)
                        };
                        next.extend(
                            resolved
                                .and_then(|i| usize::try_from(i).ok())
                                .and_then(|i| items.get(i)),
                        );
                    }
                }
                Selector::Wildcard => next.extend(members(value)),
                Selector::Filter { field, test } => next.extend(
                    members(value)
                        .into_iter()
                        .filter(|item| passes(item, field, test)),
                ),
            }
        }
        current = next;
    }
    current
}
