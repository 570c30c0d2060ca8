//! Access token sources for the management plane.

use crate::error::{ArmError, ArmResult};
use async_trait::async_trait;

/// Environment variable read by [`EnvironmentCredential`].
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Supplies bearer tokens for a scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> ArmResult<String>;
}

/// A fixed token, e.g. from `az account get-access-token`.
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenCredential")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> ArmResult<String> {
        Ok(self.token.clone())
    }
}

/// Reads the token from `AZURE_ACCESS_TOKEN` on every request, so a
/// refreshed value is picked up without a restart.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCredential;

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(&self, _scope: &str) -> ArmResult<String> {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ArmError::Credential(format!(
                "{} is not set",
                ACCESS_TOKEN_ENV
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let credential = StaticTokenCredential::new("tok");
        assert_eq!(credential.get_token("scope").await.unwrap(), "tok");
        assert!(format!("{:?}", credential).contains("<redacted>"));
    }
}
