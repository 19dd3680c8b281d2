//! Trial Store - persistence collaborator for trial rows
//!
//! The executor writes through [`TrialStore`] only: the audit log blob after
//! every step and at finalization, and the trial row when its status
//! changes. Schema and durability belong to the implementor.

use dashmap::DashMap;
use serde_json::Value;

use super::Trial;
use crate::Result;

/// Storage for trial rows.
///
/// Implementations must be shareable across concurrently running trials.
pub trait TrialStore: Send + Sync {
    /// Overwrite the serialized audit log of a trial.
    ///
    /// # Errors
    ///
    /// Implementation specific; the recorder logs and ignores failures.
    fn update_records(&self, trial_id: &str, records: &str) -> Result<()>;

    /// Persist status and timestamps of a trial.
    ///
    /// # Errors
    ///
    /// Implementation specific; the executor logs and ignores failures.
    fn save_trial(&self, trial: &Trial) -> Result<()>;
}

/// In-memory trial store using lock-free concurrent hashmaps.
///
/// Data is lost on process restart.
///
/// # Example
///
/// ```rust
/// use chaos_trials::experiment::{Experiment, MemoryTrialStore, Trial, TrialStore};
///
/// let store = MemoryTrialStore::new();
/// let trial = Trial::new("trial-1", Experiment::new("exp-1", "Stop app"));
/// store.save_trial(&trial).unwrap();
/// store.update_records("trial-1", r#"{"result": []}"#).unwrap();
///
/// assert!(store.get_trial("trial-1").is_some());
/// assert_eq!(store.records("trial-1").unwrap()["result"], serde_json::json!([]));
/// ```
#[derive(Debug, Default)]
pub struct MemoryTrialStore {
    trials: DashMap<String, Trial>,
    records: DashMap<String, String>,
}

impl MemoryTrialStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the last saved copy of a trial.
    #[must_use]
    pub fn get_trial(&self, trial_id: &str) -> Option<Trial> {
        self.trials.get(trial_id).map(|entry| entry.value().clone())
    }

    /// Get the raw audit log blob of a trial.
    #[must_use]
    pub fn raw_records(&self, trial_id: &str) -> Option<String> {
        self.records.get(trial_id).map(|entry| entry.value().clone())
    }

    /// Get the parsed audit log of a trial.
    #[must_use]
    pub fn records(&self, trial_id: &str) -> Option<Value> {
        self.records
            .get(trial_id)
            .and_then(|entry| serde_json::from_str(entry.value()).ok())
    }

    /// Get the number of saved trials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Check if no trial has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Clear all trials and records.
    pub fn clear(&self) {
        self.trials.clear();
        self.records.clear();
    }
}

impl TrialStore for MemoryTrialStore {
    fn update_records(&self, trial_id: &str, records: &str) -> Result<()> {
        self.records.insert(trial_id.to_string(), records.to_string());
        Ok(())
    }

    fn save_trial(&self, trial: &Trial) -> Result<()> {
        self.trials.insert(trial.trial_id().to_string(), trial.clone());
        Ok(())
    }
}
