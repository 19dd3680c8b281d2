//! Step/Action Resolution
//!
//! Resolves a step's dotted action identifier to an executable [`Action`].
//!
//! ## Architecture
//!
//! ```text
//! Step "k8s.crd.create"
//!        │ namespace = "k8s", function = "crd.create"
//!        ▼
//! FunctionLoader ── FunctionCache (process-wide, (ns, fn) -> entry)
//!        │ miss
//!        ▼
//! NamespaceRegistry["k8s"] -> ActionProvider -> submodules...
//!        │
//!        ▼
//! ActionEntry::Function | ActionEntry::Command
//!        │ + arguments, credential, expectations
//!        ▼
//! Action::execute() -> result checked against every expectation
//! ```
//!
//! ## Example
//!
//! ```rust
//! use chaos_trials::action::{Action, ActionModule, FunctionCache, FunctionLoader, NamespaceRegistry};
//! use chaos_trials::credential::CredentialRegistry;
//! use chaos_trials::experiment::Step;
//! use serde_json::json;
//!
//! let registry = NamespaceRegistry::new().register(
//!     "cf",
//!     ActionModule::new().function("get_app", |args| Ok(json!({"name": args["app_name"]}))),
//! );
//! let cache = FunctionCache::new();
//! let loader = FunctionLoader::new(&registry, &cache);
//!
//! let step = Step::from_value(&json!({
//!     "do": "cf.get_app",
//!     "where": {"app_name": "billing"},
//!     "expect": [{"operator": "eq", "name": "billing"}]
//! }))
//! .unwrap();
//!
//! let mut action = Action::build(&step, &loader, &CredentialRegistry::with_defaults()).unwrap();
//! assert_eq!(action.execute().unwrap(), json!({"name": "billing"}));
//! ```

mod cache;
mod registry;

pub use cache::FunctionCache;
pub use registry::{ActionClass, ActionModule, ActionProvider, FunctionLoader, NamespaceRegistry};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::credential::{Credential, CredentialRegistry};
use crate::expectation::Expectation;
use crate::experiment::Step;
use crate::Error;

pub use crate::experiment::Arguments;

const CREDENTIALS_KEY: &str = "credentials";

/// Plain function action: called with the prepared arguments.
pub type ActionFn = Arc<dyn Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync>;

/// Command action constructor: receives the prepared arguments once.
pub type CommandFactory = Arc<dyn Fn(Arguments) -> anyhow::Result<Box<dyn Command>> + Send + Sync>;

/// One-shot action object for actions that need constructor-time setup.
pub trait Command: Send {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Any error fails the step.
    fn execute(&mut self) -> anyhow::Result<Value>;
}

/// Exported action, tagged at registration time.
#[derive(Clone)]
pub enum ActionEntry {
    /// Called directly with the arguments.
    Function(ActionFn),
    /// Constructed with the arguments, then executed without arguments.
    Command(CommandFactory),
}

impl fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("ActionEntry::Function"),
            Self::Command(_) => f.write_str("ActionEntry::Command"),
        }
    }
}

impl ActionEntry {
    /// Wrap a plain function.
    pub fn function<F>(function: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(function))
    }

    /// Wrap a command constructor.
    pub fn command<F, C>(factory: F) -> Self
    where
        F: Fn(Arguments) -> anyhow::Result<C> + Send + Sync + 'static,
        C: Command + 'static,
    {
        Self::Command(Arc::new(move |arguments| {
            factory(arguments).map(|command| Box::new(command) as Box<dyn Command>)
        }))
    }

    /// Whether both entries share the same implementation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Command(a), Self::Command(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

enum Callable {
    Function { function: ActionFn, arguments: Arguments },
    Command(Box<dyn Command>),
}

/// Executable binding of a step.
///
/// Built once per step per run and discarded afterwards.
pub struct Action {
    callable: Callable,
    expectations: Vec<Expectation>,
    name: Option<String>,
    credential: Option<Box<dyn Credential>>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("arguments", &self.arguments())
            .field("expectations", &self.expectations.len())
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl Action {
    /// Bind an entry to its arguments.
    ///
    /// A command entry is constructed here, consuming the arguments.
    ///
    /// # Errors
    ///
    /// Returns the command constructor's error.
    pub fn new(
        entry: ActionEntry,
        arguments: Arguments,
        expectations: Vec<Expectation>,
        name: Option<String>,
        credential: Option<Box<dyn Credential>>,
    ) -> anyhow::Result<Self> {
        let callable = match entry {
            ActionEntry::Function(function) => Callable::Function { function, arguments },
            ActionEntry::Command(factory) => Callable::Command(factory(arguments)?),
        };
        Ok(Self {
            callable,
            expectations,
            name,
            credential,
        })
    }

    /// Resolve a step and bind it.
    ///
    /// The step's arguments are copied; a `credentials` mapping is removed
    /// from the copy and built through `credentials`. The namespace's
    /// [`ActionClass`] hook, if any, runs before the entry is bound.
    ///
    /// # Errors
    ///
    /// Resolution errors ([`Error::UnknownNamespace`],
    /// [`Error::CouldNotFindFunction`]), credential and expectation build
    /// errors, and errors from the hook or command constructor.
    pub fn build(
        step: &Step,
        loader: &FunctionLoader<'_>,
        credentials: &CredentialRegistry,
    ) -> anyhow::Result<Self> {
        let module = loader.resolve_module(step.namespace())?;
        let entry = loader.resolve_function(step.namespace(), step.function_name())?;

        let mut arguments = step.arguments().clone();
        let mut credential = match arguments.shift_remove(CREDENTIALS_KEY) {
            None => None,
            Some(Value::Object(spec)) => Some(credentials.build(&spec)?),
            Some(_) => return Err(Error::InvalidCredentialType("None".to_string()).into()),
        };
        let expectations = Expectation::build_all(step.expectations())?;

        if let Some(action_class) = module.action_class() {
            action_class.prepare(&mut arguments, credential.as_deref_mut())?;
        }

        Self::new(
            entry,
            arguments,
            expectations,
            step.description().map(str::to_string),
            credential,
        )
    }

    /// Run the action and check its result against every expectation.
    ///
    /// The raw result is returned unchanged.
    ///
    /// # Errors
    ///
    /// The action's own error, or the first failing expectation.
    pub fn execute(&mut self) -> anyhow::Result<Value> {
        let result = match &mut self.callable {
            Callable::Function { function, arguments } => function(arguments)?,
            Callable::Command(command) => command.execute()?,
        };
        for expectation in &self.expectations {
            expectation.execute(&result)?;
        }
        Ok(result)
    }

    /// Step description, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Built expectations.
    #[must_use]
    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    /// Arguments passed to a function entry; `None` for commands.
    #[must_use]
    pub const fn arguments(&self) -> Option<&Arguments> {
        match &self.callable {
            Callable::Function { arguments, .. } => Some(arguments),
            Callable::Command(_) => None,
        }
    }

    /// Attached credential, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&dyn Credential> {
        self.credential.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialSecret;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scale {
        replicas: u64,
    }

    impl Command for Scale {
        fn execute(&mut self) -> anyhow::Result<Value> {
            Ok(json!({"replicas": self.replicas}))
        }
    }

    struct RegionToConfiguration;

    impl ActionClass for RegionToConfiguration {
        fn prepare(
            &self,
            arguments: &mut Arguments,
            credential: Option<&mut (dyn Credential + 'static)>,
        ) -> anyhow::Result<()> {
            if credential.is_some() {
                return Err(Error::InvalidCredentialType(
                    "Environment variables should be used for AWS client config.".to_string(),
                )
                .into());
            }
            if let Some(region) = arguments.shift_remove("region") {
                arguments.insert("configuration".to_string(), json!({"aws_region": region}));
            }
            Ok(())
        }
    }

    fn step(value: Value) -> Step {
        Step::from_value(&value).unwrap()
    }

    fn build(step: &Step, registry: &NamespaceRegistry) -> anyhow::Result<Action> {
        let cache = FunctionCache::new();
        let loader = FunctionLoader::new(registry, &cache);
        Action::build(step, &loader, &CredentialRegistry::with_defaults())
    }

    #[test]
    fn test_function_receives_arguments_without_credentials() {
        let registry = NamespaceRegistry::new().register(
            "cf",
            ActionModule::new().function("echo", |args| Ok(Value::Object(args.clone()))),
        );
        let step = step(json!({
            "do": "cf.echo",
            "where": {"app": "a", "credentials": {"type": "K8S_SERVICE_ACCOUNT_TOKEN"}}
        }));

        let mut action = build(&step, &registry).unwrap();
        assert_eq!(action.execute().unwrap(), json!({"app": "a"}));
        assert!(action.credential().is_some());
        assert!(step.arguments().contains_key("credentials"));
    }

    #[test]
    fn test_command_entry_is_constructed_with_arguments() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructed);
        let registry = NamespaceRegistry::new().register(
            "k8s",
            ActionModule::new().command("scale", move |args: Arguments| {
                counter.fetch_add(1, Ordering::SeqCst);
                let replicas = args
                    .get("replicas")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| anyhow::anyhow!("replicas is required"))?;
                Ok(Scale { replicas })
            }),
        );

        let mut action = build(&step(json!({"do": "k8s.scale", "where": {"replicas": 3}})), &registry).unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(action.arguments().is_none());
        assert_eq!(action.execute().unwrap(), json!({"replicas": 3}));

        let err = build(&step(json!({"do": "k8s.scale", "where": {"app_name": "web"}})), &registry).unwrap_err();
        assert_eq!(err.to_string(), "replicas is required");
    }

    #[test]
    fn test_expectation_failure_propagates() {
        let registry = NamespaceRegistry::new().register(
            "cf",
            ActionModule::new().function("get_app", |_| Ok(json!({"app_name": "Y"}))),
        );
        let step = step(json!({
            "do": "cf.get_app",
            "where": {"app_name": "web"},
            "expect": [{"operator": "eq", "app_name": "X"}]
        }));
        let mut action = build(&step, &registry).unwrap();
        let err = action.execute().unwrap_err();
        assert_eq!(err.to_string(), "Expectation failed(Y == X)");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::FailedExpectation(_))));
    }

    #[test]
    fn test_invalid_credential_type() {
        let registry = NamespaceRegistry::new().register("cf", ActionModule::new().function("f", |_| Ok(Value::Null)));
        let err = build(
            &step(json!({"do": "cf.f", "where": {"credentials": {"type": "LDAP"}}})),
            &registry,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid credential type: LDAP");
    }

    #[test]
    fn test_action_class_rewrites_arguments() {
        let registry = NamespaceRegistry::new().register(
            "aws",
            ActionModule::new()
                .function("stop_instance", |args| Ok(Value::Object(args.clone())))
                .action_class(Arc::new(RegionToConfiguration)),
        );
        let mut action = build(
            &step(json!({"do": "aws.stop_instance", "where": {"id": "i-1", "region": "us-east-1"}})),
            &registry,
        )
        .unwrap();
        assert_eq!(
            action.execute().unwrap(),
            json!({"id": "i-1", "configuration": {"aws_region": "us-east-1"}})
        );

        let err = build(
            &step(json!({
                "do": "aws.stop_instance",
                "where": {"credentials": {"type": "TOKEN_FILE", "token_path": "/tmp/t"}}
            })),
            &registry,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Invalid credential type: Environment variables"));
    }

    #[test]
    fn test_secret_not_fetched_at_build() {
        let registry = NamespaceRegistry::new().register("cf", ActionModule::new().function("f", |_| Ok(Value::Null)));
        let action = build(
            &step(json!({"do": "cf.f", "where": {"credentials": {"type": "TOKEN_FILE", "token_path": "/nonexistent"}}})),
            &registry,
        )
        .unwrap();
        let secret: Option<CredentialSecret> = action.credential().and_then(|credential| credential.secret());
        assert!(secret.is_none());
    }
}
