//! Observer/Notification channel
//!
//! Observers are attached to an executor before it runs and notified once
//! with the finalized trial. Notification is best-effort: a failing or
//! panicking observer is logged and never affects other observers or the
//! trial outcome.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::panic_message;
use crate::experiment::Trial;

/// Receives the finalized trial.
pub trait TrialObserver: Send + Sync {
    /// Handle a completed trial run.
    ///
    /// # Errors
    ///
    /// Errors are logged by the notifier and otherwise ignored.
    fn update(&self, trial: &Trial) -> anyhow::Result<()>;
}

/// Creates a fresh observer for every trial run.
pub type ObserverFactory = Arc<dyn Fn() -> Arc<dyn TrialObserver> + Send + Sync>;

/// Ordered set of attached observers.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn TrialObserver>>,
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ObserverSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer; notification follows attachment order.
    pub fn attach(&mut self, observer: Arc<dyn TrialObserver>) {
        tracing::info!("Subject: Attached an observer.");
        self.observers.push(observer);
    }

    /// Detach a previously attached observer. Returns whether it was found.
    pub fn detach(&mut self, observer: &Arc<dyn TrialObserver>) -> bool {
        let Some(index) = self
            .observers
            .iter()
            .position(|attached| Arc::ptr_eq(attached, observer))
        else {
            return false;
        };
        self.observers.remove(index);
        true
    }

    /// Number of attached observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Check if no observer is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Call every observer with `trial`, isolating failures.
    pub fn notify(&self, trial: &Trial) {
        tracing::info!(trial_id = trial.trial_id(), "Subject: Notifying observers...");
        for observer in &self.observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.update(trial))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(trial_id = trial.trial_id(), %error, "Observer failed");
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(trial_id = trial.trial_id(), %message, "Observer panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::Experiment;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl TrialObserver for Recording {
        fn update(&self, trial: &Trial) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, trial.trial_id()));
            if self.fail {
                anyhow::bail!("{} is broken", self.name);
            }
            Ok(())
        }
    }

    fn observer(name: &'static str, calls: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn TrialObserver> {
        Arc::new(Recording {
            name,
            calls: Arc::clone(calls),
            fail,
        })
    }

    #[test]
    fn test_notify_in_order_isolating_failures() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut set = ObserverSet::new();
        set.attach(observer("a", &calls, true));
        set.attach(observer("b", &calls, false));

        set.notify(&Trial::new("t-1", Experiment::new("e", "n")));
        assert_eq!(*calls.lock().unwrap(), ["a:t-1", "b:t-1"]);
    }

    struct Panicking;

    impl TrialObserver for Panicking {
        fn update(&self, _trial: &Trial) -> anyhow::Result<()> {
            panic!("observer crashed")
        }
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut set = ObserverSet::new();
        set.attach(Arc::new(Panicking));
        set.attach(observer("b", &calls, false));

        set.notify(&Trial::new("t-1", Experiment::new("e", "n")));
        assert_eq!(*calls.lock().unwrap(), ["b:t-1"]);
    }

    #[test]
    fn test_detach() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let first = observer("a", &calls, false);
        let mut set = ObserverSet::new();
        set.attach(Arc::clone(&first));
        set.attach(observer("b", &calls, false));

        assert!(set.detach(&first));
        assert!(!set.detach(&first));
        assert_eq!(set.len(), 1);

        set.notify(&Trial::new("t-1", Experiment::new("e", "n")));
        assert_eq!(*calls.lock().unwrap(), ["b:t-1"]);
    }
}
