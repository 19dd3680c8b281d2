//! Built-in `common` namespace

use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::action::{ActionModule, Arguments};
use crate::Error;

/// Namespace name the built-in module is usually registered under.
pub const COMMON_NAMESPACE: &str = "cm";

/// Module exporting `wait`.
#[must_use]
pub fn common_module() -> ActionModule {
    ActionModule::new().function("wait", wait)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Sleep for `time_in_seconds` whole seconds.
///
/// # Errors
///
/// Returns [`Error::FailedAction`] when the argument is missing, not an
/// integer, or negative.
pub fn wait(arguments: &Arguments) -> anyhow::Result<Value> {
    let value = arguments.get("time_in_seconds").ok_or_else(|| {
        Error::FailedAction("Missing argument 'time_in_seconds'".to_string())
    })?;
    let seconds = match value {
        Value::Number(number) if !number.is_f64() => number
            .as_u64()
            .ok_or_else(|| Error::FailedAction("sleep length must be non-negative".to_string()))?,
        other => {
            return Err(Error::FailedAction(format!(
                "Expected integer for argument 'time_in_seconds' (got {})",
                type_name(other)
            ))
            .into())
        }
    };
    thread::sleep(Duration::from_secs(seconds));
    Ok(Value::Null)
}
