//! Credentials for remote sources.
//!
//! Remote indexers ask a [`CredentialProvider`] for a bearer token on every
//! rebuild. No token is a valid state: requests go out anonymously and get
//! the lower anonymous rate limit.

use std::fmt;

/// Environment variables checked for a GitHub token, in order.
pub const TOKEN_ENV_VARS: [&str; 3] = ["EIX_GITHUB_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Supplies an optional bearer token for remote calls.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` for anonymous access.
    fn bearer_token(&self) -> Option<String>;
}

/// Reads the token from the process environment on each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn bearer_token(&self) -> Option<String> {
        token_from_env()
    }
}

/// Fixed token, for embedding and tests.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub const fn anonymous() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// First non-empty token among [`TOKEN_ENV_VARS`].
#[must_use]
pub fn token_from_env() -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
