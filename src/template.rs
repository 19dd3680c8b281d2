//! `{{ variable }}` interpolation over JSON argument trees
//!
//! Step arguments are stored with placeholders such as `{{ app_name }}` or
//! `{{ cluster.region }}`. Rendering walks every string key and string value
//! of the tree and substitutes parameter values. The executor enumerates the
//! referenced root variables up front so that a trial with missing
//! parameters is rejected before any step runs.
//!
//! Supported expressions:
//! - `{{ name }}` - whitespace inside the braces is optional
//! - `{{ name.attr.attr }}` - attribute lookup into object parameters
//!
//! Unknown variables render as the empty string. Non-string parameter values
//! render as their JSON text.

use crate::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("invalid template expression pattern")
});

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Lookup { root: &'a str, attrs: Vec<&'a str> },
}

fn parse(input: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + OPEN.len()..];
        let end = after.find(CLOSE).ok_or_else(|| {
            Error::Template(format!(
                "unexpected end of template, expected '{CLOSE}' in {input:?}"
            ))
        })?;

        let expression = after[..end].trim();
        if expression.is_empty() {
            return Err(Error::Template(format!("expected an expression in {input:?}")));
        }
        if !EXPRESSION.is_match(expression) {
            return Err(Error::Template(format!(
                "unsupported expression '{expression}' in {input:?}"
            )));
        }

        let mut parts = expression.split('.');
        let root = parts.next().unwrap_or_default();
        segments.push(Segment::Lookup {
            root,
            attrs: parts.collect(),
        });
        rest = &after[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_str(input: &str, parameters: &Map<String, Value>) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    for segment in parse(input)? {
        match segment {
            Segment::Text(text) => output.push_str(text),
            Segment::Lookup { root, attrs } => {
                let mut resolved = parameters.get(root);
                for attr in attrs {
                    resolved = resolved.and_then(|value| value.get(attr));
                }
                if let Some(value) = resolved {
                    output.push_str(&value_text(value));
                }
            }
        }
    }
    Ok(output)
}

fn collect_str(input: &str, variables: &mut BTreeSet<String>) -> Result<()> {
    for segment in parse(input)? {
        if let Segment::Lookup { root, .. } = segment {
            variables.insert(root.to_string());
        }
    }
    Ok(())
}

fn collect_variables(value: &Value, variables: &mut BTreeSet<String>) -> Result<()> {
    match value {
        Value::String(s) => collect_str(s, variables),
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| collect_variables(item, variables)),
        Value::Object(map) => {
            for (key, item) in map {
                collect_str(key, variables)?;
                collect_variables(item, variables)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Root names of every variable referenced anywhere in `value`.
///
/// # Errors
///
/// Returns [`Error::Template`] if any string contains malformed syntax.
pub fn referenced_variables(value: &Value) -> Result<BTreeSet<String>> {
    let mut variables = BTreeSet::new();
    collect_variables(value, &mut variables)?;
    Ok(variables)
}

/// Referenced variables that have no entry in `parameters`.
///
/// # Errors
///
/// Returns [`Error::Template`] if any string contains malformed syntax.
pub fn undefined_variables(
    value: &Value,
    parameters: &Map<String, Value>,
) -> Result<BTreeSet<String>> {
    let mut variables = referenced_variables(value)?;
    variables.retain(|name| !parameters.contains_key(name));
    Ok(variables)
}

/// Render every placeholder in `value` with `parameters`.
///
/// # Errors
///
/// Returns [`Error::Template`] if any string contains malformed syntax.
pub fn render(value: &Value, parameters: &Map<String, Value>) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(render_str(s, parameters)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render(item, parameters))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(render_str(key, parameters)?, render(item, parameters)?);
            }
            Value::Object(rendered)
        }
        other => other.clone(),
    })
}
