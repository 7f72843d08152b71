//! Credential resolution
//!
//! Descriptors carry only a [`CredentialReference`]. The secret is looked up
//! when an adapter or the registrar needs it, so rotating a credential never
//! requires rebuilding an inventory.

use crate::descriptor::CredentialReference;
use crate::error::CredentialError;
use std::collections::HashMap;

/// Environment variable prefix used by [`EnvCredentialResolver`]
pub const ENV_PREFIX: &str = "MESHBOARD_CRED_";

/// A resolved secret
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password { username: String, password: String },
    ApiKey { key: String },
    ApiKeyPair { key: String, secret: String },
}

impl Credential {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "password",
            Credential::ApiKey { .. } => "api-key",
            Credential::ApiKeyPair { .. } => "api-key-pair",
        }
    }

    /// Username/password pair, as used by SSH
    pub fn password(&self, reference: &CredentialReference) -> Result<(&str, &str), CredentialError> {
        match self {
            Credential::Password { username, password } => Ok((username, password)),
            other => Err(wrong_kind(reference, "password", other)),
        }
    }

    /// Single API key. A key pair also yields its key half.
    pub fn api_key(&self, reference: &CredentialReference) -> Result<&str, CredentialError> {
        match self {
            Credential::ApiKey { key } | Credential::ApiKeyPair { key, .. } => Ok(key),
            other => Err(wrong_kind(reference, "api-key", other)),
        }
    }

    /// API key and secret
    pub fn api_key_pair(&self, reference: &CredentialReference) -> Result<(&str, &str), CredentialError> {
        match self {
            Credential::ApiKeyPair { key, secret } => Ok((key, secret)),
            other => Err(wrong_kind(reference, "api-key-pair", other)),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::ApiKey { .. } => f.debug_struct("ApiKey").field("key", &"<redacted>").finish(),
            Credential::ApiKeyPair { .. } => f
                .debug_struct("ApiKeyPair")
                .field("key", &"<redacted>")
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

fn wrong_kind(reference: &CredentialReference, expected: &'static str, found: &Credential) -> CredentialError {
    CredentialError::WrongKind {
        reference: reference.to_string(),
        expected,
        found: found.kind_name(),
    }
}

/// Turns references into secrets
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, reference: &CredentialReference) -> Result<Credential, CredentialError>;
}

/// Reads secrets from `MESHBOARD_CRED_<REF>_*` environment variables.
///
/// The reference is upper-cased and every non-alphanumeric character becomes
/// `_`, so `cisco-lab` reads `MESHBOARD_CRED_CISCO_LAB_USERNAME` and
/// `MESHBOARD_CRED_CISCO_LAB_PASSWORD`. Checked in order:
/// `USERNAME`+`PASSWORD`, `API_KEY`+`API_SECRET`, `API_KEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialResolver {
    prefix: Option<String>,
}

impl EnvCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Variable stem for a reference, e.g. `MESHBOARD_CRED_CISCO_LAB`
    pub fn variable_stem(&self, reference: &CredentialReference) -> String {
        let normalized: String = reference
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", self.prefix.as_deref().unwrap_or(ENV_PREFIX), normalized)
    }

    fn lookup(&self, reference: &CredentialReference, get: impl Fn(&str) -> Option<String>) -> Result<Credential, CredentialError> {
        let stem = self.variable_stem(reference);
        let var = |suffix: &str| get(&format!("{stem}_{suffix}")).filter(|v| !v.is_empty());

        if let (Some(username), Some(password)) = (var("USERNAME"), var("PASSWORD")) {
            return Ok(Credential::Password { username, password });
        }
        match (var("API_KEY"), var("API_SECRET")) {
            (Some(key), Some(secret)) => Ok(Credential::ApiKeyPair { key, secret }),
            (Some(key), None) => Ok(Credential::ApiKey { key }),
            _ => Err(CredentialError::NotFound {
                reference: reference.to_string(),
                source_hint: format!("{stem}_USERNAME/_PASSWORD or {stem}_API_KEY"),
            }),
        }
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, reference: &CredentialReference) -> Result<Credential, CredentialError> {
        self.lookup(reference, |name| std::env::var(name).ok())
    }
}

/// In-memory resolver, mainly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialResolver {
    entries: HashMap<String, Credential>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, credential: Credential) -> Self {
        self.entries.insert(reference.into(), credential);
        self
    }

    pub fn insert(&mut self, reference: impl Into<String>, credential: Credential) {
        self.entries.insert(reference.into(), credential);
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn resolve(&self, reference: &CredentialReference) -> Result<Credential, CredentialError> {
        self.entries
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                reference: reference.to_string(),
                source_hint: "a static credential entry".to_string(),
            })
    }
}
