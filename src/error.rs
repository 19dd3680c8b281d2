//! Error types for chaos-trials
//!
//! Every failure the engine can produce while resolving, building or
//! executing a step. Action implementations return `anyhow::Error`; those are
//! carried opaquely by [`crate::executor::StepsExecutionError`].

use std::any::Any;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// chaos-trials error types
#[derive(Error, Debug)]
pub enum Error {
    /// Action namespace is not registered
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Namespace resolved but no searched provider exports the function
    #[error("Could not find function: {0}")]
    CouldNotFindFunction(String),

    /// Credential `type` tag unknown, or credential variant not allowed here
    #[error("Invalid credential type: {0}")]
    InvalidCredentialType(String),

    /// Expectation spec with an unrecognized or missing `operator`
    #[error("Invalid operator: {0}")]
    InvalidExpectOperator(String),

    /// Expectation comparison failed at runtime
    #[error("Expectation failed({0})")]
    FailedExpectation(String),

    /// Value extraction path did not resolve against the action result
    #[error("The key path {key_path} is not found in {input}")]
    KeyNotFound {
        /// Key path that was looked up
        key_path: String,
        /// JSON rendering of the searched input
        input: String,
    },

    /// Template variables referenced by steps have no parameter value
    #[error("{0}")]
    MissingParameterValue(String),

    /// One or more raw step definitions are invalid
    #[error("Invalid Steps: Some steps provided are invalid. Invalid Steps: {0}")]
    InvalidSteps(String),

    /// Malformed `{{ }}` template syntax
    #[error("Template error: {0}")]
    Template(String),

    /// Ordering operator applied to values that have no common ordering
    #[error("Cannot compare {actual} {operator} {expected}")]
    IncomparableValues {
        /// Actual value rendering
        actual: String,
        /// Operator symbol
        operator: String,
        /// Expected value rendering
        expected: String,
    },

    /// Credential source did not provide a secret
    #[error("Credential not found. Source: {source_name}, Details: {details}")]
    CredentialNotFound {
        /// Credential variant name
        source_name: String,
        /// What was missing
        details: String,
    },

    /// Action implementation rejected its input or failed
    #[error("{0}")]
    FailedAction(String),

    /// Action implementation or class hook panicked
    #[error("Action panicked: {0}")]
    ActionPanicked(String),

    /// Trial status change not allowed from the current status
    #[error("Trial status cannot change from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid regular expression in a regex expectation
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short kind name used in trial log lines (`Type: <kind>`).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownNamespace(_) => "UnknownNamespace",
            Self::CouldNotFindFunction(_) => "CouldNotFindFunction",
            Self::InvalidCredentialType(_) => "InvalidCredentialType",
            Self::InvalidExpectOperator(_) => "InvalidExpectOperator",
            Self::FailedExpectation(_) => "FailedExpectation",
            Self::KeyNotFound { .. } => "KeyNotFound",
            Self::MissingParameterValue(_) => "MissingParameterValueError",
            Self::InvalidSteps(_) => "InvalidSteps",
            Self::Template(_) => "TemplateError",
            Self::IncomparableValues { .. } => "IncomparableValues",
            Self::CredentialNotFound { .. } => "CredentialNotFound",
            Self::FailedAction(_) => "FailedAction",
            Self::ActionPanicked(_) => "ActionPanicked",
            Self::InvalidStatusTransition { .. } => "InvalidStatusTransition",
            Self::Json(_) => "JsonError",
            Self::Io(_) => "IoError",
            Self::Regex(_) => "RegexError",
            Self::Other(_) => "Error",
        }
    }
}

/// Kind name for an opaque action error, looking through to [`Error`] when
/// the action surfaced one of ours.
#[must_use]
pub fn error_kind(error: &anyhow::Error) -> &'static str {
    error.downcast_ref::<Error>().map_or("ActionError", Error::kind)
}

/// Message carried by a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        let literal = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(literal.as_ref()), "static text");

        let formatted = std::panic::catch_unwind(|| panic!("index {} out of range", 3)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "index 3 out of range");

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(7_u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic payload");
    }
}
