//! Trial Executor
//!
//! Runs one trial to completion and always finalizes it.
//!
//! ## Phases
//!
//! ```text
//! run()
//!  ├─ executed_at = now, status = In Progress
//!  ├─ undefined template variables? ──────────────► Invalid
//!  ├─ render pre/steps/post with merged parameters
//!  ├─ pre_steps  ── failure ──────────────────────► Aborted
//!  ├─ steps      ── failure ─┐
//!  └─ post_steps (always) ───┴─ any failure ──────► Failed
//!                                 no failure ─────► Succeeded
//! finalize: result block committed, trial saved, observers notified
//! ```
//!
//! When both `steps` and `post_steps` fail, the `post_steps` failure is the
//! one classified and recorded.
//!
//! A panic raised while building or executing an action is caught and fails
//! the step like any other action error.

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::action::{Action, FunctionLoader};
use crate::config::ExecutionContext;
use crate::error::{error_kind, panic_message};
use crate::expectation::display_value;
use crate::experiment::{Step, Trial, TrialPhase, TrialStatus};
use crate::observe::{ObserverSet, TrialObserver};
use crate::recorder::{LogLevel, Sanitizer, TrialLogRecord, TrialLogRecorder, TrialStage};

/// Failure of a step, tagged with the phase it occurred in.
///
/// Displays as `[in: <phase>, reason: <cause>]`.
#[derive(Debug, Error)]
#[error("[in: {phase}, reason: {cause}]")]
pub struct StepsExecutionError {
    phase: TrialPhase,
    cause: anyhow::Error,
}

impl StepsExecutionError {
    /// Wrap a step failure.
    #[must_use]
    pub fn new(phase: TrialPhase, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            phase,
            cause: cause.into(),
        }
    }

    /// Phase the failing step belonged to.
    #[must_use]
    pub const fn phase(&self) -> TrialPhase {
        self.phase
    }

    /// Originating error.
    #[must_use]
    pub const fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Whether the failure happened in `pre_steps`.
    #[must_use]
    pub fn is_pre_steps(&self) -> bool {
        self.phase == TrialPhase::Pre
    }
}

/// Why a trial run did not succeed.
#[derive(Debug, Error)]
pub enum TrialError {
    /// A step failed.
    #[error(transparent)]
    Steps(#[from] StepsExecutionError),

    /// Rendering the experiment's steps failed.
    #[error("Error extracting experiment steps!")]
    StepExtraction(#[source] crate::Error),

    /// Any other core failure.
    #[error(transparent)]
    Core(#[from] crate::Error),
}

impl TrialError {
    /// Terminal status this failure maps to.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        match self {
            Self::Core(crate::Error::MissingParameterValue(_)) => TrialStatus::Invalid,
            Self::Steps(failure) if matches!(failure.phase, TrialPhase::Pre) => TrialStatus::Aborted,
            Self::Steps(_) | Self::StepExtraction(_) | Self::Core(_) => TrialStatus::Failed,
        }
    }

    /// Kind name used in log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Steps(_) => "StepsExecutionError",
            Self::StepExtraction(_) => "StepExtractionError",
            Self::Core(error) => error.kind(),
        }
    }

    fn stack_trace(&self) -> String {
        match self {
            Self::Steps(failure) => format!("{:?}", failure.cause),
            Self::Core(crate::Error::MissingParameterValue(_)) => String::new(),
            Self::StepExtraction(error) | Self::Core(error) => format!("{error:?}"),
        }
    }
}

/// Executes one trial.
///
/// Setup happens in [`TrialExecutor::new`]; [`TrialExecutor::run`] consumes
/// the executor and finalizes the trial exactly once, whatever the outcome.
pub struct TrialExecutor<'a> {
    trial: Trial,
    context: &'a ExecutionContext,
    recorder: TrialLogRecorder,
    sanitizer: Sanitizer,
    observers: ObserverSet,
}

impl std::fmt::Debug for TrialExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialExecutor")
            .field("trial_id", &self.trial.trial_id())
            .field("recorder", &self.recorder)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl<'a> TrialExecutor<'a> {
    /// Prepare an executor for `trial`.
    #[must_use]
    pub fn new(trial: Trial, context: &'a ExecutionContext) -> Self {
        let recorder = TrialLogRecorder::new(trial.trial_id(), Arc::clone(context.store()));
        Self {
            trial,
            context,
            recorder,
            sanitizer: context.config().sanitizer(),
            observers: ObserverSet::new(),
        }
    }

    /// Attach an observer notified when the run finishes.
    pub fn attach(&mut self, observer: Arc<dyn TrialObserver>) {
        self.observers.attach(observer);
    }

    /// Detach an observer. Returns whether it was attached.
    pub fn detach(&mut self, observer: &Arc<dyn TrialObserver>) -> bool {
        self.observers.detach(observer)
    }

    /// Trial being executed.
    #[must_use]
    pub const fn trial(&self) -> &Trial {
        &self.trial
    }

    /// Run the trial and return it in its terminal status.
    ///
    /// Never fails: every failure is recorded in the trial's status and
    /// records.
    #[must_use]
    pub fn run(mut self) -> Trial {
        let outcome = self.execute();
        self.finalize(outcome)
    }

    fn execute(&mut self) -> Result<(), TrialError> {
        self.trial.update_executed_at();
        self.trial.update_status(TrialStatus::InProgress);
        self.save_trial();

        let undefined = self.trial.undefined_variables()?;
        if !undefined.is_empty() {
            let names: Vec<String> = undefined.iter().map(|name| format!("'{name}'")).collect();
            let message = format!(
                "Trial is invalid because of missing value in experiment parameters: {}.",
                names.join(", ")
            );
            info!(trial_id = self.trial.trial_id(), "{message}");
            return Err(crate::Error::MissingParameterValue(message).into());
        }

        self.log_trial_start();
        let (pre_steps, steps, post_steps) = self.extract_steps()?;

        self.execute_steps(&pre_steps, TrialPhase::Pre)?;
        let main = self.execute_steps(&steps, TrialPhase::Steps);
        let teardown = self.execute_steps(&post_steps, TrialPhase::Post);
        match (main, teardown) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(failure), Ok(())) | (Ok(()), Err(failure)) => Err(failure.into()),
            (Err(superseded), Err(failure)) => {
                warn!(
                    trial_id = self.trial.trial_id(),
                    %superseded,
                    "steps failure superseded by post_steps failure"
                );
                Err(failure.into())
            }
        }
    }

    fn extract_steps(&self) -> Result<(Vec<Step>, Vec<Step>, Vec<Step>), TrialError> {
        let rendered = TrialPhase::ALL
            .iter()
            .map(|phase| self.trial.rendered_steps(*phase))
            .collect::<crate::Result<Vec<_>>>();
        match rendered {
            Ok(mut phases) => {
                let post_steps = phases.pop().unwrap_or_default();
                let steps = phases.pop().unwrap_or_default();
                let pre_steps = phases.pop().unwrap_or_default();
                Ok((pre_steps, steps, post_steps))
            }
            Err(cause) => {
                error!(
                    trial_id = self.trial.trial_id(),
                    "Trial Failed - Error extracting experiment steps!. Type: {}. Error: {cause}, Stack trace: {cause:?}",
                    cause.kind()
                );
                Err(TrialError::StepExtraction(cause))
            }
        }
    }

    fn execute_steps(&mut self, steps: &[Step], phase: TrialPhase) -> Result<(), StepsExecutionError> {
        for step in steps {
            let mut block = TrialLogRecord::for_step(
                phase,
                step.display_name(),
                step.arguments(),
                &self.sanitizer,
            );
            self.execute_action(step, &mut block)
                .map_err(|cause| StepsExecutionError::new(phase, cause))?;
        }
        Ok(())
    }

    fn execute_action(&mut self, step: &Step, block: &mut TrialLogRecord) -> anyhow::Result<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_action(step, block)))
            .unwrap_or_else(|payload| {
                Err(crate::Error::ActionPanicked(panic_message(payload.as_ref())).into())
            });
        match outcome {
            Ok(()) => {
                block.append(LogLevel::Info, "Completed.");
                self.recorder.commit(block);
                Ok(())
            }
            Err(cause) => {
                let kind = error_kind(&cause);
                block.append(
                    LogLevel::Error,
                    format!("Step failed. Type: {kind}. Error: {cause}"),
                );
                self.recorder.commit(block);
                error!(
                    trial_id = self.trial.trial_id(),
                    "Action {} Failed. Type: {kind}. Error: {cause}, Stack trace: {cause:?}",
                    step.description().unwrap_or_else(|| step.action())
                );
                Err(cause)
            }
        }
    }

    fn run_action(&self, step: &Step, block: &mut TrialLogRecord) -> anyhow::Result<()> {
        let loader = FunctionLoader::new(self.context.registry(), self.context.cache());
        let mut action = Action::build(step, &loader, self.context.credentials())?;

        block.append(LogLevel::Info, "Starting command execution.");
        let result = action.execute()?;
        if !result.is_null() && self.context.config().log_step_results {
            block.append(LogLevel::Info, format!("Result: {}.", display_value(&result)));
        }
        if !action.expectations().is_empty() {
            let declared = Value::Array(step.expectations().iter().cloned().map(Value::Object).collect());
            block.append(
                LogLevel::Info,
                format!("Succeeded. All expectations passed: {declared}."),
            );
        }
        Ok(())
    }

    fn log_trial_start(&self) {
        let parameters = self.sanitizer.clean_map(&self.trial.merged_parameters());
        let rendered = if parameters.is_empty() {
            "None".to_string()
        } else {
            Value::Object(parameters).to_string()
        };
        info!(trial_id = self.trial.trial_id(), "Starting with Parameters: {rendered}.");
    }

    fn save_trial(&self) {
        if let Err(error) = self.context.store().save_trial(&self.trial) {
            warn!(trial_id = self.trial.trial_id(), %error, "Failed to save trial");
        }
    }

    fn finalize(mut self, outcome: Result<(), TrialError>) -> Trial {
        let mut block = TrialLogRecord::new(TrialStage::Result);
        match outcome {
            Ok(()) => {
                self.trial.update_status(TrialStatus::Succeeded);
                block.append(LogLevel::Info, "Trial Completed.");
                info!(trial_id = self.trial.trial_id(), "Completed.");
            }
            Err(failure) => {
                let status = failure.status();
                let kind = failure.kind();
                self.trial.update_status(status);
                block.append(
                    LogLevel::Error,
                    format!("Trial {status}. Type: {kind}. Error: {failure}"),
                );
                error!(
                    trial_id = self.trial.trial_id(),
                    "Trial {status}. Type: {kind}. Error: {failure}, Stack trace: {}",
                    failure.stack_trace()
                );
            }
        }

        self.recorder.commit(&block);
        self.trial.set_records(self.recorder.record().clone());
        self.save_trial();
        self.observers.notify(&self.trial);
        self.trial
    }
}

/// Run `trial` with a fresh observer from every registered factory.
#[must_use]
pub fn execute_trial(trial: Trial, context: &ExecutionContext) -> Trial {
    let mut executor = TrialExecutor::new(trial, context);
    for factory in context.observer_factories() {
        executor.attach(factory());
    }
    executor.run()
}
