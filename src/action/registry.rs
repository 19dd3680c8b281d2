//! Namespace registry and function resolution
//!
//! The host registers one [`ActionProvider`] per namespace at startup. A
//! step's action `cf.stop_app` resolves in two stages: the namespace `cf`
//! selects the provider, then `stop_app` is looked up in the provider's
//! exports, followed by the exports of its submodules in declared order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{ActionEntry, Arguments, Command, FunctionCache};
use crate::credential::Credential;
use crate::{Error, Result};

/// Namespace-level hook run while an action is bound.
///
/// Receives the prepared arguments (with `credentials` already removed) and
/// the built credential, and may rewrite the arguments or reject the
/// credential.
pub trait ActionClass: Send + Sync {
    /// Adjust arguments before the action is bound.
    ///
    /// # Errors
    ///
    /// Any error aborts the step.
    fn prepare(
        &self,
        arguments: &mut Arguments,
        credential: Option<&mut (dyn Credential + 'static)>,
    ) -> anyhow::Result<()>;
}

/// A pluggable module of actions.
pub trait ActionProvider: Send + Sync {
    /// Names this module exports.
    fn exports(&self) -> BTreeSet<String>;

    /// Entry for an exported name.
    fn get(&self, name: &str) -> Option<ActionEntry>;

    /// Further modules to search, in order, after this one.
    fn submodules(&self) -> Vec<Arc<dyn ActionProvider>> {
        Vec::new()
    }

    /// Hook applied to every action resolved through this namespace.
    fn action_class(&self) -> Option<Arc<dyn ActionClass>> {
        None
    }
}

/// Explicitly registered action module.
///
/// # Example
///
/// ```rust
/// use chaos_trials::action::{ActionModule, ActionProvider};
/// use serde_json::json;
///
/// let module = ActionModule::new()
///     .function("get_app", |args| Ok(json!({"name": args["app_name"]})));
/// assert!(module.exports().contains("get_app"));
/// ```
#[derive(Clone, Default)]
pub struct ActionModule {
    entries: BTreeMap<String, ActionEntry>,
    submodules: Vec<Arc<dyn ActionProvider>>,
    action_class: Option<Arc<dyn ActionClass>>,
}

impl fmt::Debug for ActionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionModule")
            .field("exports", &self.entries.keys().collect::<Vec<_>>())
            .field("submodules", &self.submodules.len())
            .field("action_class", &self.action_class.is_some())
            .finish()
    }
}

impl ActionModule {
    /// Create an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a plain function.
    #[must_use]
    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), ActionEntry::function(function));
        self
    }

    /// Export a command type, constructed from the arguments on every run.
    #[must_use]
    pub fn command<F, C>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Arguments) -> anyhow::Result<C> + Send + Sync + 'static,
        C: Command + 'static,
    {
        self.entries.insert(name.into(), ActionEntry::command(factory));
        self
    }

    /// Export a prebuilt entry.
    #[must_use]
    pub fn entry(mut self, name: impl Into<String>, entry: ActionEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    /// Append a module to search after this one.
    #[must_use]
    pub fn submodule(mut self, module: Arc<dyn ActionProvider>) -> Self {
        self.submodules.push(module);
        self
    }

    /// Set the namespace-level action hook.
    #[must_use]
    pub fn action_class(mut self, action_class: Arc<dyn ActionClass>) -> Self {
        self.action_class = Some(action_class);
        self
    }
}

impl ActionProvider for ActionModule {
    fn exports(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<ActionEntry> {
        self.entries.get(name).cloned()
    }

    fn submodules(&self) -> Vec<Arc<dyn ActionProvider>> {
        self.submodules.clone()
    }

    fn action_class(&self) -> Option<Arc<dyn ActionClass>> {
        self.action_class.clone()
    }
}

/// Map from namespace name to provider.
#[derive(Clone, Default)]
pub struct NamespaceRegistry {
    modules: HashMap<String, Arc<dyn ActionProvider>>,
}

impl fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut namespaces: Vec<_> = self.modules.keys().collect();
        namespaces.sort();
        f.debug_struct("NamespaceRegistry")
            .field("namespaces", &namespaces)
            .finish()
    }
}

impl NamespaceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a namespace, replacing any previous one.
    #[must_use]
    pub fn register(mut self, namespace: impl Into<String>, module: impl ActionProvider + 'static) -> Self {
        self.modules.insert(namespace.into(), Arc::new(module));
        self
    }

    /// Register a shared provider under a namespace.
    #[must_use]
    pub fn register_shared(mut self, namespace: impl Into<String>, module: Arc<dyn ActionProvider>) -> Self {
        self.modules.insert(namespace.into(), module);
        self
    }

    /// Whether a namespace is registered.
    #[must_use]
    pub fn contains(&self, namespace: &str) -> bool {
        self.modules.contains_key(namespace)
    }

    /// Number of registered namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if no namespace is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn get(&self, namespace: &str) -> Option<Arc<dyn ActionProvider>> {
        self.modules.get(namespace).cloned()
    }
}

/// Resolves action identifiers through a registry and a shared cache.
#[derive(Debug, Clone, Copy)]
pub struct FunctionLoader<'a> {
    registry: &'a NamespaceRegistry,
    cache: &'a FunctionCache,
}

impl<'a> FunctionLoader<'a> {
    /// Create a loader over a registry and cache.
    #[must_use]
    pub const fn new(registry: &'a NamespaceRegistry, cache: &'a FunctionCache) -> Self {
        Self { registry, cache }
    }

    /// Provider registered for a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNamespace`] if the namespace is not registered.
    pub fn resolve_module(&self, namespace: &str) -> Result<Arc<dyn ActionProvider>> {
        self.registry
            .get(namespace)
            .ok_or_else(|| Error::UnknownNamespace(namespace.to_string()))
    }

    /// Entry for `namespace.function`, served from the cache when present.
    ///
    /// On a miss the namespace module is searched first, then its
    /// submodules in order; the first module exporting the name wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNamespace`] or
    /// [`Error::CouldNotFindFunction`] naming `namespace.function`.
    pub fn resolve_function(&self, namespace: &str, function: &str) -> Result<ActionEntry> {
        if let Some(entry) = self.cache.get(namespace, function) {
            return Ok(entry);
        }

        let module = self.resolve_module(namespace)?;
        let mut search = vec![Arc::clone(&module)];
        search.extend(module.submodules());

        let found = search
            .iter()
            .filter(|provider| provider.exports().contains(function))
            .find_map(|provider| provider.get(function))
            .ok_or_else(|| Error::CouldNotFindFunction(format!("{namespace}.{function}")))?;

        tracing::debug!(namespace, function, "resolved action");
        Ok(self.cache.get_or_insert(namespace, function, found))
    }
}
