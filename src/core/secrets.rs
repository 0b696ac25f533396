// ============================================
// PROMPTGATE - Provider Credentials
// ============================================

use std::collections::HashMap;
use std::fmt;

/// Opaque credential. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, for building request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Source of provider credentials, looked up by name
pub trait SecretStore: Send + Sync {
    fn resolve(&self, name: &str) -> Option<SecretString>;
}

/// Reads credentials from process environment variables
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Also loads a `.env` file from the working directory, if present
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        Self
    }
}

impl SecretStore for EnvSecretStore {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
    }
}

/// Fixed in-memory credentials
#[derive(Debug, Default, Clone)]
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretString>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), SecretString::new(value));
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        self.secrets.get(name).cloned()
    }
}
