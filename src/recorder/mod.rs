//! Structured Log Recorder
//!
//! Accumulates the trial audit log and persists it after every commit.
//!
//! ## Record layout
//!
//! ```json
//! {
//!   "pre_steps": [{"step_name": "Http probe", "step_parameters": {...}, "logs": [...]}],
//!   "steps":     [{"step_name": "Stop app",   "step_parameters": {...}, "logs": [...]}],
//!   "result":    [{"logs": ["[2024-01-01T00:00:00Z - INFO] Trial Completed."]}]
//! }
//! ```
//!
//! Phase keys appear in order of first commit. History is append-only:
//! committing the same block twice stores it twice.

mod sanitizer;

pub use sanitizer::{Sanitizer, DEFAULT_PLACEHOLDER, DEFAULT_SENSITIVE_KEYS};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::experiment::{TrialPhase, TrialStore};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Severity of an audit log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Progress
    Info,
    /// Recoverable problem
    Warning,
    /// Failure
    Error,
}

impl LogLevel {
    /// Level name as written in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key a log block is committed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrialStage {
    /// A step phase.
    Phase(TrialPhase),
    /// Final outcome.
    Result,
}

impl TrialStage {
    /// Record key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Phase(phase) => phase.as_str(),
            Self::Result => "result",
        }
    }
}

impl From<TrialPhase> for TrialStage {
    fn from(phase: TrialPhase) -> Self {
        Self::Phase(phase)
    }
}

/// Format one audit log line.
#[must_use]
pub fn format_line(level: LogLevel, message: &str, at: DateTime<Utc>) -> String {
    format!("[{} - {}] {}", at.format(TIMESTAMP_FORMAT), level, message)
}

#[derive(Debug, Clone, PartialEq)]
struct StepInfo {
    name: String,
    parameters: Value,
}

/// One log block: a phase-level block, or a step block that also carries
/// the step name and its redacted parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialLogRecord {
    stage: TrialStage,
    step: Option<StepInfo>,
    logs: Vec<String>,
}

impl TrialLogRecord {
    /// Create an empty phase-level block.
    #[must_use]
    pub const fn new(stage: TrialStage) -> Self {
        Self {
            stage,
            step: None,
            logs: Vec::new(),
        }
    }

    /// Create an empty step block; `parameters` are redacted immediately.
    #[must_use]
    pub fn for_step(
        phase: TrialPhase,
        step_name: impl Into<String>,
        parameters: &Map<String, Value>,
        sanitizer: &Sanitizer,
    ) -> Self {
        Self {
            stage: TrialStage::Phase(phase),
            step: Some(StepInfo {
                name: step_name.into(),
                parameters: Value::Object(sanitizer.clean_map(parameters)),
            }),
            logs: Vec::new(),
        }
    }

    /// Append a line stamped with the current time.
    pub fn append(&mut self, level: LogLevel, message: impl AsRef<str>) {
        self.append_at(level, message, Utc::now());
    }

    /// Append a line with an explicit timestamp.
    pub fn append_at(&mut self, level: LogLevel, message: impl AsRef<str>, at: DateTime<Utc>) {
        self.logs.push(format_line(level, message.as_ref(), at));
    }

    /// Stage this block is committed under.
    #[must_use]
    pub const fn stage(&self) -> TrialStage {
        self.stage
    }

    /// Formatted lines.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Serialized form stored in the record.
    #[must_use]
    pub fn make(&self) -> Value {
        let mut data = Map::new();
        if let Some(step) = &self.step {
            data.insert("step_name".to_string(), Value::String(step.name.clone()));
            data.insert("step_parameters".to_string(), step.parameters.clone());
        }
        data.insert(
            "logs".to_string(),
            Value::Array(self.logs.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(data)
    }
}

/// Per-trial audit log, persisted through a [`TrialStore`] after every commit.
pub struct TrialLogRecorder {
    trial_id: String,
    record: Map<String, Value>,
    store: Arc<dyn TrialStore>,
}

impl fmt::Debug for TrialLogRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialLogRecorder")
            .field("trial_id", &self.trial_id)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl TrialLogRecorder {
    /// Create an empty recorder for a trial.
    #[must_use]
    pub fn new(trial_id: impl Into<String>, store: Arc<dyn TrialStore>) -> Self {
        Self {
            trial_id: trial_id.into(),
            record: Map::new(),
            store,
        }
    }

    /// Append a block under its stage and persist the whole record.
    ///
    /// Persistence failures are logged and otherwise ignored.
    pub fn commit(&mut self, block: &TrialLogRecord) {
        let slot = self
            .record
            .entry(block.stage().as_str())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(blocks) = slot {
            blocks.push(block.make());
        }
        self.persist();
    }

    fn persist(&self) {
        let written = serde_json::to_string(&self.record)
            .map_err(crate::Error::from)
            .and_then(|records| self.store.update_records(&self.trial_id, &records));
        if let Err(error) = written {
            tracing::warn!(
                trial_id = %self.trial_id,
                %error,
                "Failed to update 'records' column for trial"
            );
        }
    }

    /// Accumulated record.
    #[must_use]
    pub const fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    /// Consume the recorder, returning the record.
    #[must_use]
    pub fn into_record(self) -> Map<String, Value> {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::MemoryTrialStore;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_format_line() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        assert_eq!(
            format_line(LogLevel::Info, "Completed.", at),
            "[2024-05-01T12:30:05Z - INFO] Completed."
        );
    }

    #[test]
    fn test_step_block_make() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let parameters = json!({"app": "web", "password": "p"});
        let mut block = TrialLogRecord::for_step(
            TrialPhase::Steps,
            "Stop app",
            parameters.as_object().unwrap(),
            &Sanitizer::default(),
        );
        block.append_at(LogLevel::Error, "boom", at);

        assert_eq!(
            block.make(),
            json!({
                "step_name": "Stop app",
                "step_parameters": {"app": "web", "password": "*****"},
                "logs": ["[2024-05-01T00:00:00Z - ERROR] boom"]
            })
        );
        let keys: Vec<_> = block.make().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["step_name", "step_parameters", "logs"]);
    }

    #[test]
    fn test_commit_persists_every_time() {
        let store = Arc::new(MemoryTrialStore::new());
        let mut recorder = TrialLogRecorder::new("t-1", store.clone());

        let mut block = TrialLogRecord::new(TrialStage::Result);
        block.append(LogLevel::Info, "Trial Completed.");
        recorder.commit(&block);
        assert_eq!(store.records("t-1").unwrap()["result"].as_array().unwrap().len(), 1);

        recorder.commit(&block);
        let persisted = store.records("t-1").unwrap();
        assert_eq!(persisted["result"].as_array().unwrap().len(), 2);
        assert_eq!(persisted["result"][0], persisted["result"][1]);
        assert_eq!(Value::Object(recorder.into_record()), persisted);
    }

    #[test]
    fn test_stage_order_is_first_commit_order() {
        let store = Arc::new(MemoryTrialStore::new());
        let mut recorder = TrialLogRecorder::new("t-1", store);
        for stage in [
            TrialStage::Phase(TrialPhase::Post),
            TrialStage::Phase(TrialPhase::Pre),
            TrialStage::Result,
            TrialStage::Phase(TrialPhase::Post),
        ] {
            recorder.commit(&TrialLogRecord::new(stage));
        }
        let keys: Vec<_> = recorder.record().keys().cloned().collect();
        assert_eq!(keys, ["post_steps", "pre_steps", "result"]);
    }
}
