use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::config::API_KEY_VARS;
use crate::error::{Result, SessionError};

/// Host capability that knows whether an assistant credential is available
///
/// The session controller asks once at startup and again whenever the user
/// wants to pick a different key.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Whether a credential has been selected
    async fn has_credential(&self) -> Result<bool>;

    /// Ask the host to let the user select a credential
    ///
    /// Returns once the host has finished its selection flow
    async fn request_credential(&self) -> Result<()>;
}

/// Credential availability fixed at construction (key from config or flags)
pub struct StaticCredentialProvider {
    available: AtomicBool,
}

impl StaticCredentialProvider {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    /// Record the outcome of a selection made outside the provider
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn has_credential(&self) -> Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn request_credential(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::MissingCredential)
        }
    }
}

/// Credential looked up in the process environment
pub struct EnvCredentialProvider {
    vars: Vec<String>,
}

impl EnvCredentialProvider {
    pub fn new(vars: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }

    fn lookup(&self) -> bool {
        self.vars.iter().any(|name| {
            std::env::var(name)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
        })
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(API_KEY_VARS)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn has_credential(&self) -> Result<bool> {
        Ok(self.lookup())
    }

    async fn request_credential(&self) -> Result<()> {
        if self.lookup() {
            Ok(())
        } else {
            tracing::warn!(vars = ?self.vars, "no assistant key found in the environment");
            Err(SessionError::MissingCredential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentialProvider::new(true);
        assert!(provider.has_credential().await.unwrap());
        assert!(provider.request_credential().await.is_ok());

        let provider = StaticCredentialProvider::new(false);
        assert!(!provider.has_credential().await.unwrap());
        assert!(matches!(
            provider.request_credential().await,
            Err(SessionError::MissingCredential)
        ));

        provider.set_available(true);
        assert!(provider.has_credential().await.unwrap());
    }

    #[tokio::test]
    async fn test_env_provider_with_unset_variable() {
        let provider = EnvCredentialProvider::new(["REPO_ASSISTANT_TEST_SURELY_UNSET_KEY"]);
        assert!(!provider.has_credential().await.unwrap());
        assert!(provider.request_credential().await.is_err());
    }
}
