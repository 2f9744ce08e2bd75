//! Caller authentication
//!
//! The provider is chosen by configuration. `dev` mode grants a fixed
//! developer principal to every caller and says so in the log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Dev,
    Token,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Dev => "dev",
            AuthMode::Token => "token",
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user: String,
    /// Granted by the development provider without checking credentials
    pub dev: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("an access token is required")]
    MissingToken,
    #[error("access token is not recognised")]
    InvalidToken,
}

pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthError>;

    fn mode(&self) -> AuthMode;
}

pub const DEV_USER: &str = "dev-user";

#[derive(Debug, Default, Clone, Copy)]
pub struct DevAuthProvider;

impl AuthProvider for DevAuthProvider {
    fn authenticate(&self, _token: Option<&str>) -> Result<Principal, AuthError> {
        warn!(user = DEV_USER, "dev auth mode: credentials are not checked");
        Ok(Principal {
            user: DEV_USER.to_string(),
            dev: true,
        })
    }

    fn mode(&self) -> AuthMode {
        AuthMode::Dev
    }
}

/// Static `token -> user` table
#[derive(Debug, Clone)]
pub struct TokenAuthProvider {
    tokens: BTreeMap<String, String>,
}

impl TokenAuthProvider {
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        TokenAuthProvider { tokens }
    }
}

impl AuthProvider for TokenAuthProvider {
    fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let token = token.ok_or(AuthError::MissingToken)?;
        let user = self.tokens.get(token).ok_or(AuthError::InvalidToken)?;
        Ok(Principal {
            user: user.clone(),
            dev: false,
        })
    }

    fn mode(&self) -> AuthMode {
        AuthMode::Token
    }
}

pub fn provider_for(mode: AuthMode, tokens: &BTreeMap<String, String>) -> Box<dyn AuthProvider> {
    match mode {
        AuthMode::Dev => Box::new(DevAuthProvider),
        AuthMode::Token => Box::new(TokenAuthProvider::new(tokens.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_provider_always_grants() {
        let p = DevAuthProvider.authenticate(None).unwrap();
        assert_eq!(p.user, DEV_USER);
        assert!(p.dev);
    }

    #[test]
    fn test_token_provider() {
        let tokens = BTreeMap::from([("s3cret".to_string(), "alice".to_string())]);
        let provider = provider_for(AuthMode::Token, &tokens);
        assert_eq!(provider.mode(), AuthMode::Token);
        assert_eq!(provider.authenticate(Some("s3cret")).unwrap().user, "alice");
        assert_eq!(provider.authenticate(Some("nope")), Err(AuthError::InvalidToken));
        assert_eq!(provider.authenticate(Some("  ")), Err(AuthError::MissingToken));
        assert_eq!(provider.authenticate(None), Err(AuthError::MissingToken));
    }
}
