//! # chaos-trials: Trial Execution Engine for Chaos Experiments
//!
//! **Version**: 0.1.0
//!
//! An experiment declares ordered `pre_steps`, `steps` and `post_steps`.
//! Each step names a namespaced action (`"cf.stop_app"`), its arguments and
//! optional expectations on the action result. A trial is one run of an
//! experiment with concrete parameters; the executor drives it to a
//! terminal status and keeps a per-phase audit log.
//!
//! ## Design Principles
//!
//! - **Always finalize**: every run ends with a result block, a saved trial
//!   and notified observers, whatever failed
//! - **Teardown runs**: `post_steps` execute even when `steps` failed
//! - **Resolve once**: functions are looked up per `(namespace, name)` and
//!   cached for the life of the process
//! - **Redact early**: step parameters are sanitized before they reach the
//!   audit log
//!
//! ## Example Usage
//!
//! ```rust
//! use chaos_trials::action::ActionModule;
//! use chaos_trials::experiment::{Experiment, MemoryTrialStore, Step, Trial, TrialStatus};
//! use chaos_trials::{execute_trial, ExecutionContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let context = ExecutionContext::builder(Arc::new(MemoryTrialStore::new()))
//!     .namespace("probe", ActionModule::new().function("health", |_| Ok(json!({"status": "UP"}))))
//!     .build();
//!
//! let step = Step::from_value(&json!({
//!     "do": "probe.health",
//!     "where": {"url": "{{ host }}/health"},
//!     "expect": [{"operator": "eq", "status": "UP"}]
//! }))
//! .unwrap();
//! let experiment = Experiment::builder("exp-1", "Health check").step(step).build();
//! let trial = Trial::builder("trial-1", experiment)
//!     .parameter("host", json!("http://app.test"))
//!     .build();
//!
//! let trial = execute_trial(trial, &context);
//! assert_eq!(trial.status(), TrialStatus::Succeeded);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod action;
pub mod builtin;
pub mod config;
pub mod credential;
pub mod error;
pub mod executor;
pub mod expectation;
pub mod experiment;
pub mod observe;
pub mod recorder;
pub mod telemetry;
pub mod template;

pub use config::{ExecutionContext, ExecutionContextBuilder, ExecutorConfig};
pub use error::{error_kind, Error, Result};
pub use executor::{execute_trial, StepsExecutionError, TrialError, TrialExecutor};
pub use observe::{ObserverSet, TrialObserver};
