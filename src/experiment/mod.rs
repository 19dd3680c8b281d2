//! Experiment and Trial Schema
//!
//! Data structures the executor consumes and produces.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Trial (N)
//!     │                 │
//!     ├── pre_steps     ├── parameters (override experiment defaults)
//!     ├── steps         ├── status / executed_at / completed_at
//!     └── post_steps    └── records  [audit log, phase -> blocks]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use chaos_trials::experiment::{Experiment, Step, Trial, TrialPhase, TrialStatus};
//! use serde_json::json;
//!
//! let stop_app = Step::from_value(&json!({
//!     "step": "Stop the app",
//!     "do": "cf.stop_app",
//!     "where": {"app_name": "{{ app_name }}"}
//! }))
//! .unwrap();
//!
//! let experiment = Experiment::builder("exp-001", "App restart")
//!     .step(stop_app)
//!     .build();
//!
//! let trial = Trial::builder("trial-001", experiment)
//!     .parameter("app_name", json!("billing"))
//!     .build();
//!
//! assert_eq!(trial.status(), TrialStatus::Scheduled);
//! let steps = trial.rendered_steps(TrialPhase::Steps).unwrap();
//! assert_eq!(steps[0].arguments()["app_name"], "billing");
//! ```

mod experiment_record;
mod step;
mod store;
mod trial_record;

pub use experiment_record::{Experiment, ExperimentBuilder};
pub use step::{Arguments, Step, StepBuilder};
pub use store::{MemoryTrialStore, TrialStore};
pub use trial_record::{Trial, TrialBuilder, TrialPhase, TrialStatus};
