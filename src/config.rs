//! Executor configuration and the shared execution context
//!
//! # Example JSON
//!
//! ```json
//! {
//!   "sensitive_keys": ["auth", "token", "password", "cookie", "secret"],
//!   "redaction_placeholder": "*****",
//!   "log_step_results": true
//! }
//! ```
//!
//! Every field is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::action::{ActionProvider, FunctionCache, NamespaceRegistry};
use crate::credential::CredentialRegistry;
use crate::experiment::TrialStore;
use crate::observe::{ObserverFactory, TrialObserver};
use crate::recorder::{Sanitizer, DEFAULT_PLACEHOLDER, DEFAULT_SENSITIVE_KEYS};
use crate::Result;

/// Behaviour switches of the trial executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Parameter keys redacted in step log blocks (case-insensitive substrings).
    #[serde(default = "default_sensitive_keys")]
    pub sensitive_keys: Vec<String>,

    /// Replacement for redacted values.
    #[serde(default = "default_placeholder")]
    pub redaction_placeholder: String,

    /// Whether step blocks include the `Result: ...` line.
    #[serde(default = "default_log_step_results")]
    pub log_step_results: bool,
}

fn default_sensitive_keys() -> Vec<String> {
    DEFAULT_SENSITIVE_KEYS.iter().map(ToString::to_string).collect()
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

const fn default_log_step_results() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sensitive_keys: default_sensitive_keys(),
            redaction_placeholder: default_placeholder(),
            log_step_results: default_log_step_results(),
        }
    }
}

impl ExecutorConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] or [`crate::Error::Json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Set the sensitive keys.
    #[must_use]
    pub fn sensitive_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the redaction placeholder.
    #[must_use]
    pub fn redaction_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.redaction_placeholder = placeholder.into();
        self
    }

    /// Enable or disable the `Result: ...` step log line.
    #[must_use]
    pub const fn log_step_results(mut self, enabled: bool) -> Self {
        self.log_step_results = enabled;
        self
    }

    /// Sanitizer for step parameters.
    #[must_use]
    pub fn sanitizer(&self) -> Sanitizer {
        Sanitizer::new(&self.sensitive_keys, self.redaction_placeholder.clone())
    }
}

/// Process-wide collaborators of every trial run.
///
/// Built once at startup and shared by reference; the function cache is
/// shared across clones.
#[derive(Clone)]
pub struct ExecutionContext {
    registry: Arc<NamespaceRegistry>,
    credentials: Arc<CredentialRegistry>,
    cache: Arc<FunctionCache>,
    store: Arc<dyn TrialStore>,
    observers: Vec<ObserverFactory>,
    config: ExecutorConfig,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("registry", &self.registry)
            .field("credentials", &self.credentials)
            .field("cache", &self.cache.len())
            .field("observers", &self.observers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Create a builder around the trial store.
    #[must_use]
    pub fn builder(store: Arc<dyn TrialStore>) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(store)
    }

    /// Namespace registry.
    #[must_use]
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Credential registry.
    #[must_use]
    pub fn credentials(&self) -> &CredentialRegistry {
        &self.credentials
    }

    /// Shared function cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<FunctionCache> {
        &self.cache
    }

    /// Trial store.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn TrialStore> {
        &self.store
    }

    /// Observer factories, one observer per run each.
    #[must_use]
    pub fn observer_factories(&self) -> &[ObserverFactory] {
        &self.observers
    }

    /// Executor configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

/// Builder for `ExecutionContext`.
pub struct ExecutionContextBuilder {
    registry: NamespaceRegistry,
    credentials: CredentialRegistry,
    cache: Arc<FunctionCache>,
    store: Arc<dyn TrialStore>,
    observers: Vec<ObserverFactory>,
    config: ExecutorConfig,
}

impl ExecutionContextBuilder {
    /// Create a builder with default credentials, a fresh cache and no
    /// namespaces.
    #[must_use]
    pub fn new(store: Arc<dyn TrialStore>) -> Self {
        Self {
            registry: NamespaceRegistry::new(),
            credentials: CredentialRegistry::with_defaults(),
            cache: Arc::new(FunctionCache::new()),
            store,
            observers: Vec::new(),
            config: ExecutorConfig::default(),
        }
    }

    /// Register an action provider under a namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>, module: impl ActionProvider + 'static) -> Self {
        self.registry = self.registry.register(namespace, module);
        self
    }

    /// Replace the namespace registry.
    #[must_use]
    pub fn registry(mut self, registry: NamespaceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the credential registry.
    #[must_use]
    pub fn credentials(mut self, credentials: CredentialRegistry) -> Self {
        self.credentials = credentials;
        self
    }

    /// Share an existing function cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<FunctionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Add an observer factory, called once per run.
    #[must_use]
    pub fn observer<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn TrialObserver> + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(factory));
        self
    }

    /// Set the executor configuration.
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the `ExecutionContext`.
    #[must_use]
    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            registry: Arc::new(self.registry),
            credentials: Arc::new(self.credentials),
            cache: self.cache,
            store: self.store,
            observers: self.observers,
            config: self.config,
        }
    }
}
