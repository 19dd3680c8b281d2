//! Credentials attached to actions
//!
//! A step passes credentials inside its `where` clause:
//!
//! ```json
//! {"credentials": {"type": "ENV_VAR_USERNAME_PASSWORD",
//!                  "username_key": "CF_USER", "password_key": "CF_PASS"}}
//! ```
//!
//! The `type` tag selects a constructor in a [`CredentialRegistry`]; the
//! remaining keys are its arguments. Secrets are read only when
//! [`Credential::fetch`] is called.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Error, Result};

/// Tag of [`EnvironmentUserNamePasswordCredential`].
pub const ENV_VAR_USERNAME_PASSWORD: &str = "ENV_VAR_USERNAME_PASSWORD";
/// Tag of [`TokenFileCredential`].
pub const TOKEN_FILE: &str = "TOKEN_FILE";
/// Tag of [`KubernetesServiceAccountTokenCredential`].
pub const K8S_SERVICE_ACCOUNT_TOKEN: &str = "K8S_SERVICE_ACCOUNT_TOKEN";

/// Token path mounted into Kubernetes pods.
pub const K8S_SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

const TYPE_KEY: &str = "type";

/// Secret material produced by a fetched credential.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSecret {
    /// Bearer style token.
    Token(String),
    /// Username and password pair.
    UsernamePassword {
        /// Username
        username: String,
        /// Password
        password: String,
    },
}

impl fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(*****)"),
            Self::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"*****")
                .finish(),
        }
    }
}

/// A credential source.
pub trait Credential: Send + Sync + fmt::Debug {
    /// Variant name, used in error messages.
    fn source(&self) -> &'static str;

    /// Read the secret from its source.
    ///
    /// # Errors
    ///
    /// Returns an error when the source does not provide the secret.
    fn fetch(&mut self) -> Result<()>;

    /// The fetched secret, `None` before [`Credential::fetch`].
    fn secret(&self) -> Option<CredentialSecret>;
}

/// Username/password pair read from two environment variables.
#[derive(Debug, Clone)]
pub struct EnvironmentUserNamePasswordCredential {
    username_key: String,
    password_key: String,
    secret: Option<CredentialSecret>,
}

impl EnvironmentUserNamePasswordCredential {
    /// Create a credential reading the given environment variables.
    #[must_use]
    pub fn new(username_key: impl Into<String>, password_key: impl Into<String>) -> Self {
        Self {
            username_key: username_key.into(),
            password_key: password_key.into(),
            secret: None,
        }
    }

    fn from_spec(spec: &Map<String, Value>) -> Result<Box<dyn Credential>> {
        Ok(Box::new(Self::new(
            required_str(spec, ENV_VAR_USERNAME_PASSWORD, "username_key")?,
            required_str(spec, ENV_VAR_USERNAME_PASSWORD, "password_key")?,
        )))
    }

    fn read_var(&self, key: &str) -> Result<String> {
        std::env::var(key).map_err(|_| Error::CredentialNotFound {
            source_name: self.source().to_string(),
            details: format!("environment variable {key} is not set"),
        })
    }
}

impl Credential for EnvironmentUserNamePasswordCredential {
    fn source(&self) -> &'static str {
        "EnvironmentUserNamePasswordCredential"
    }

    fn fetch(&mut self) -> Result<()> {
        tracing::info!(
            username_key = %self.username_key,
            password_key = %self.password_key,
            "Retrieving credentials"
        );
        let username = self.read_var(&self.username_key)?;
        let password = self.read_var(&self.password_key)?;
        self.secret = Some(CredentialSecret::UsernamePassword { username, password });
        Ok(())
    }

    fn secret(&self) -> Option<CredentialSecret> {
        self.secret.clone()
    }
}

/// Token read from a file.
#[derive(Debug, Clone)]
pub struct TokenFileCredential {
    token_path: PathBuf,
    token: Option<String>,
}

impl TokenFileCredential {
    /// Create a credential reading the token at `token_path`.
    #[must_use]
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            token: None,
        }
    }

    /// Path the token is read from.
    #[must_use]
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    fn from_spec(spec: &Map<String, Value>) -> Result<Box<dyn Credential>> {
        Ok(Box::new(Self::new(required_str(spec, TOKEN_FILE, "token_path")?)))
    }

    fn read_token(&mut self) -> Result<()> {
        self.token = Some(std::fs::read_to_string(&self.token_path)?);
        Ok(())
    }
}

impl Credential for TokenFileCredential {
    fn source(&self) -> &'static str {
        "TokenFileCredential"
    }

    fn fetch(&mut self) -> Result<()> {
        self.read_token()
    }

    fn secret(&self) -> Option<CredentialSecret> {
        self.token.clone().map(CredentialSecret::Token)
    }
}

/// Service account token mounted into Kubernetes pods.
#[derive(Debug, Clone)]
pub struct KubernetesServiceAccountTokenCredential {
    inner: TokenFileCredential,
}

impl KubernetesServiceAccountTokenCredential {
    /// Create a credential reading [`K8S_SERVICE_ACCOUNT_TOKEN_PATH`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: TokenFileCredential::new(K8S_SERVICE_ACCOUNT_TOKEN_PATH),
        }
    }
}

impl Default for KubernetesServiceAccountTokenCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl Credential for KubernetesServiceAccountTokenCredential {
    fn source(&self) -> &'static str {
        "KubernetesServiceAccountTokenCredential"
    }

    fn fetch(&mut self) -> Result<()> {
        self.inner.read_token()
    }

    fn secret(&self) -> Option<CredentialSecret> {
        self.inner.secret()
    }
}

fn required_str(spec: &Map<String, Value>, tag: &str, field: &str) -> Result<String> {
    spec.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidCredentialType(format!("{tag} requires string '{field}'")))
}

/// Constructor for a credential variant, given the definition without `type`.
pub type CredentialFactory =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Credential>> + Send + Sync>;

/// Map from credential `type` tag to constructor.
#[derive(Clone, Default)]
pub struct CredentialRegistry {
    factories: HashMap<String, CredentialFactory>,
}

impl fmt::Debug for CredentialRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.factories.keys().collect();
        tags.sort();
        f.debug_struct("CredentialRegistry").field("types", &tags).finish()
    }
}

impl CredentialRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in variants.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .register(
                ENV_VAR_USERNAME_PASSWORD,
                EnvironmentUserNamePasswordCredential::from_spec,
            )
            .register(TOKEN_FILE, TokenFileCredential::from_spec)
            .register(K8S_SERVICE_ACCOUNT_TOKEN, |_: &Map<String, Value>| {
                Ok(Box::new(KubernetesServiceAccountTokenCredential::new()) as Box<dyn Credential>)
            })
    }

    /// Register a constructor for a `type` tag, replacing any previous one.
    #[must_use]
    pub fn register<F>(mut self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Box<dyn Credential>> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
        self
    }

    /// Whether a tag is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build a credential from its definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentialType`] when `type` is missing
    /// (reported as `None`) or not registered, or when the constructor
    /// rejects the definition.
    pub fn build(&self, spec: &Map<String, Value>) -> Result<Box<dyn Credential>> {
        let tag = match spec.get(TYPE_KEY) {
            None | Some(Value::Null) => return Err(Error::InvalidCredentialType("None".to_string())),
            Some(Value::String(tag)) => tag.as_str(),
            Some(other) => return Err(Error::InvalidCredentialType(other.to_string())),
        };
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| Error::InvalidCredentialType(tag.to_string()))?;

        let mut arguments = spec.clone();
        arguments.shift_remove(TYPE_KEY);
        factory(&arguments)
    }
}
