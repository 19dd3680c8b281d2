//! Trial - one execution instance of an experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use super::{Experiment, Step};
use crate::{Error, Result};

/// Status of a trial.
///
/// Serialized with the human readable names stored alongside trial rows
/// (`"In Progress"`, `"Stop Initiated"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Trial is created but not yet started.
    #[serde(rename = "Scheduled")]
    Scheduled,
    /// Trial is currently executing.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Every phase completed.
    #[serde(rename = "Succeeded")]
    Succeeded,
    /// A main step or post step failed.
    #[serde(rename = "Failed")]
    Failed,
    /// A pre step failed; the main and post steps were skipped.
    #[serde(rename = "Aborted")]
    Aborted,
    /// Required parameters were missing; nothing executed.
    #[serde(rename = "Invalid")]
    Invalid,
    /// Stop was requested externally.
    #[serde(rename = "Stop Initiated")]
    StopInitiated,
    /// Trial was stopped.
    #[serde(rename = "Stopped")]
    Stopped,
}

impl TrialStatus {
    /// Human readable status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "In Progress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
            Self::Invalid => "Invalid",
            Self::StopInitiated => "Stop Initiated",
            Self::Stopped => "Stopped",
        }
    }

    /// Whether entering this status stamps `completed_at`.
    #[must_use]
    pub const fn sets_completion(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Aborted | Self::Invalid
        )
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered group of steps with its own failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialPhase {
    /// Preconditions; a failure aborts the trial.
    #[serde(rename = "pre_steps")]
    Pre,
    /// Main steps.
    #[serde(rename = "steps")]
    Steps,
    /// Teardown; always runs after the main steps.
    #[serde(rename = "post_steps")]
    Post,
}

impl TrialPhase {
    /// Phases in execution order.
    pub const ALL: [Self; 3] = [Self::Pre, Self::Steps, Self::Post];

    /// Phase key used in records and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre_steps",
            Self::Steps => "steps",
            Self::Post => "post_steps",
        }
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trial represents a single execution of an experiment with concrete
/// runtime parameters.
///
/// `records` holds the structured audit log: phase key to an ordered list of
/// log blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trial {
    trial_id: String,
    experiment: Experiment,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
    status: TrialStatus,
    executed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    records: Map<String, Value>,
}

impl Trial {
    /// Create a new trial in Scheduled status with no parameter overrides.
    ///
    /// # Arguments
    ///
    /// * `trial_id` - Unique identifier for the trial
    /// * `experiment` - Experiment to execute
    #[must_use]
    pub fn new(trial_id: impl Into<String>, experiment: Experiment) -> Self {
        TrialBuilder::new(trial_id, experiment).build()
    }

    /// Create a builder for constructing a trial with parameters.
    #[must_use]
    pub fn builder(trial_id: impl Into<String>, experiment: Experiment) -> TrialBuilder {
        TrialBuilder::new(trial_id, experiment)
    }

    /// Get the trial ID.
    #[must_use]
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Get the experiment being executed.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Get the trial-supplied parameter overrides.
    #[must_use]
    pub const fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Get the trial-supplied metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Get the execution start timestamp, if the trial has started.
    #[must_use]
    pub const fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed_at
    }

    /// Get the completion timestamp, if the trial has completed.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Get the structured audit log.
    #[must_use]
    pub const fn records(&self) -> &Map<String, Value> {
        &self.records
    }

    /// Whether the trial reached a completing status.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Experiment defaults overlaid with the trial's parameters.
    #[must_use]
    pub fn merged_parameters(&self) -> Map<String, Value> {
        let mut merged = self.experiment.parameters().clone();
        for (key, value) in &self.parameters {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Experiment metadata overlaid with the trial's metadata.
    #[must_use]
    pub fn effective_metadata(&self) -> Map<String, Value> {
        let mut merged = self.experiment.metadata().clone();
        for (key, value) in &self.metadata {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Template variables referenced by any phase with no merged parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] on malformed placeholder syntax.
    pub fn undefined_variables(&self) -> Result<BTreeSet<String>> {
        let merged = self.merged_parameters();
        let mut undefined = BTreeSet::new();
        for phase in TrialPhase::ALL {
            for step in self.experiment.steps_for(phase) {
                undefined.extend(
                    step.template_variables()?
                        .into_iter()
                        .filter(|name| !merged.contains_key(name)),
                );
            }
        }
        Ok(undefined)
    }

    /// Steps of one phase rendered with the merged parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] on malformed placeholder syntax.
    pub fn rendered_steps(&self, phase: TrialPhase) -> Result<Vec<Step>> {
        let merged = self.merged_parameters();
        self.experiment
            .steps_for(phase)
            .iter()
            .map(|step| step.interpolate(&merged))
            .collect()
    }

    /// Set the status; completing statuses also stamp `completed_at`.
    pub fn update_status(&mut self, status: TrialStatus) {
        self.status = status;
        if status.sets_completion() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Stamp `executed_at` with the current time.
    pub fn update_executed_at(&mut self) {
        self.executed_at = Some(Utc::now());
    }

    /// Replace the audit log.
    pub fn set_records(&mut self, records: Map<String, Value>) {
        self.records = records;
    }

    /// Request that the trial stop.
    ///
    /// Idempotent while a stop is already pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatusTransition`] unless the trial is
    /// Scheduled or In Progress.
    pub fn request_stop(&mut self) -> Result<()> {
        match self.status {
            TrialStatus::StopInitiated => Ok(()),
            TrialStatus::Scheduled | TrialStatus::InProgress => {
                self.update_status(TrialStatus::StopInitiated);
                Ok(())
            }
            other => Err(Error::InvalidStatusTransition {
                from: other.to_string(),
                to: TrialStatus::StopInitiated.to_string(),
            }),
        }
    }

    /// Acknowledge a pending stop request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatusTransition`] unless a stop is pending.
    pub fn mark_stopped(&mut self) -> Result<()> {
        if self.status != TrialStatus::StopInitiated {
            return Err(Error::InvalidStatusTransition {
                from: self.status.to_string(),
                to: TrialStatus::Stopped.to_string(),
            });
        }
        self.update_status(TrialStatus::Stopped);
        Ok(())
    }
}

/// Builder for `Trial`.
#[derive(Debug)]
pub struct TrialBuilder {
    trial: Trial,
}

impl TrialBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(trial_id: impl Into<String>, experiment: Experiment) -> Self {
        Self {
            trial: Trial {
                trial_id: trial_id.into(),
                experiment,
                parameters: Map::new(),
                metadata: Map::new(),
                status: TrialStatus::Scheduled,
                executed_at: None,
                completed_at: None,
                records: Map::new(),
            },
        }
    }

    /// Set one parameter override.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.trial.parameters.insert(key.into(), value);
        self
    }

    /// Replace all parameter overrides.
    #[must_use]
    pub fn parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.trial.parameters = parameters;
        self
    }

    /// Set the trial metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.trial.metadata = metadata;
        self
    }

    /// Build the `Trial`.
    #[must_use]
    pub fn build(self) -> Trial {
        self.trial
    }
}
