//! Experiment - stored, reusable definition of pre/steps/post sequences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Step, TrialPhase};

/// Experiment definition.
///
/// Read-only to the executor: a trial run never mutates its experiment.
/// Each experiment can be executed by many trials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    experiment_id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    pre_steps: Vec<Step>,
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default)]
    post_steps: Vec<Step>,
    #[serde(default)]
    parameters: Map<String, Value>,
    created_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a new experiment with the given ID and name and no steps.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Unique identifier for the experiment
    /// * `name` - Human-readable name for the experiment
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        ExperimentBuilder::new(experiment_id, name).build()
    }

    /// Create a builder for constructing an experiment with steps.
    #[must_use]
    pub fn builder(experiment_id: impl Into<String>, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(experiment_id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the experiment metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Get the default parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Get the steps of one phase.
    #[must_use]
    pub fn steps_for(&self, phase: TrialPhase) -> &[Step] {
        match phase {
            TrialPhase::Pre => &self.pre_steps,
            TrialPhase::Steps => &self.steps,
            TrialPhase::Post => &self.post_steps,
        }
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    experiment: Experiment,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment: Experiment {
                experiment_id: experiment_id.into(),
                name: name.into(),
                description: String::new(),
                metadata: Map::new(),
                pre_steps: Vec::new(),
                steps: Vec::new(),
                post_steps: Vec::new(),
                parameters: Map::new(),
                created_at: Utc::now(),
            },
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.experiment.description = description.into();
        self
    }

    /// Set the metadata mapping.
    #[must_use]
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.experiment.metadata = metadata;
        self
    }

    /// Set one default parameter.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.experiment.parameters.insert(key.into(), value);
        self
    }

    /// Replace all default parameters.
    #[must_use]
    pub fn parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.experiment.parameters = parameters;
        self
    }

    /// Append a step to the pre-steps phase.
    #[must_use]
    pub fn pre_step(mut self, step: Step) -> Self {
        self.experiment.pre_steps.push(step);
        self
    }

    /// Append a step to the main steps phase.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.experiment.steps.push(step);
        self
    }

    /// Append a step to the post-steps phase.
    #[must_use]
    pub fn post_step(mut self, step: Step) -> Self {
        self.experiment.post_steps.push(step);
        self
    }

    /// Replace the steps of one phase.
    #[must_use]
    pub fn phase_steps(mut self, phase: TrialPhase, steps: Vec<Step>) -> Self {
        match phase {
            TrialPhase::Pre => self.experiment.pre_steps = steps,
            TrialPhase::Steps => self.experiment.steps = steps,
            TrialPhase::Post => self.experiment.post_steps = steps,
        }
        self
    }

    /// Set a custom creation timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.experiment.created_at = created_at;
        self
    }

    /// Build the `Experiment`.
    #[must_use]
    pub fn build(self) -> Experiment {
        self.experiment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_experiment_new() {
        let experiment = Experiment::new("exp-1", "Stop app");
        assert_eq!(experiment.experiment_id(), "exp-1");
        assert_eq!(experiment.name(), "Stop app");
        assert!(experiment.steps_for(TrialPhase::Steps).is_empty());
    }

    #[test]
    fn test_experiment_builder_phases() {
        let experiment = Experiment::builder("exp-1", "Stop app")
            .pre_step(Step::new("cm.http_probe", Map::new()))
            .step(Step::new("cf.stop_app", Map::new()))
            .post_step(Step::new("cf.start_app", Map::new()))
            .parameter("cf_org", json!("org"))
            .build();

        assert_eq!(experiment.steps_for(TrialPhase::Pre)[0].action(), "cm.http_probe");
        assert_eq!(experiment.steps_for(TrialPhase::Steps)[0].action(), "cf.stop_app");
        assert_eq!(experiment.steps_for(TrialPhase::Post)[0].action(), "cf.start_app");
        assert_eq!(experiment.parameters()["cf_org"], "org");
    }

    #[test]
    fn test_experiment_deserializes_stored_steps() {
        let experiment: Experiment = serde_json::from_value(json!({
            "experiment_id": "exp-1",
            "name": "n",
            "steps": [{"do": "cf.stop_app", "where": {"app_name": "{{ app }}"}}],
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(experiment.steps_for(TrialPhase::Steps).len(), 1);
        assert!(experiment.steps_for(TrialPhase::Post).is_empty());
    }
}
