// Auth providers
//
// One closed set of two variants, selected once at construction from the
// classified credential mode and never re-dispatched per call.

mod refresh;
mod refreshable;

pub use refreshable::RefreshableCredentialProvider;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::CredentialStore;
use crate::types::{AuthMode, CredentialRecord};

/// A credential ready to be attached to a request, tagged with the header
/// family it belongs in.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum Credential {
    /// Sent as `x-api-key`.
    ApiKey(String),
    /// Sent as `Authorization: Bearer`.
    Bearer(String),
}

impl Credential {
    pub fn secret(&self) -> &str {
        match self {
            Credential::ApiKey(s) | Credential::Bearer(s) => s,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey(_) => write!(f, "Credential::ApiKey(<redacted>)"),
            Credential::Bearer(_) => write!(f, "Credential::Bearer(<redacted>)"),
        }
    }
}

/// Non-expiring static credential. Refresh is a no-op; a rejection by the
/// downstream API is terminal.
pub struct StaticCredentialProvider {
    secret: String,
}

impl StaticCredentialProvider {
    pub fn new(secret: String) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "static credential is empty"
            )));
        }
        Ok(Self { secret })
    }

    pub fn credentials(&self) -> Credential {
        Credential::ApiKey(self.secret.clone())
    }

    pub fn is_valid(&self) -> bool {
        !self.secret.is_empty()
    }
}

impl Drop for StaticCredentialProvider {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// The active authentication provider.
pub enum AuthProvider {
    Static(StaticCredentialProvider),
    Refreshable(RefreshableCredentialProvider),
}

impl AuthProvider {
    /// Construct the provider variant matching a persisted record's mode.
    pub fn from_record(
        record: &CredentialRecord,
        config: AuthConfig,
        store: Arc<CredentialStore>,
        client: Client,
    ) -> Result<Self, AuthError> {
        match record.mode {
            AuthMode::ApiKey => Ok(AuthProvider::Static(StaticCredentialProvider::new(
                record.access_token.clone(),
            )?)),
            AuthMode::Oauth => Ok(AuthProvider::Refreshable(
                RefreshableCredentialProvider::new(record.token_set()?, config, store, client)?,
            )),
        }
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            AuthProvider::Static(_) => AuthMode::ApiKey,
            AuthProvider::Refreshable(_) => AuthMode::Oauth,
        }
    }

    /// Credentials for the next outbound request. May suspend while a
    /// refresh is in flight; this is the subsystem's only blocking point.
    pub async fn credentials(&self) -> Result<Credential, AuthError> {
        match self {
            AuthProvider::Static(p) => Ok(p.credentials()),
            AuthProvider::Refreshable(p) => {
                let tokens = p.credentials().await?;
                Ok(Credential::Bearer(tokens.access_token.clone()))
            }
        }
    }

    /// Force a refresh. A no-op success for static credentials.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        match self {
            AuthProvider::Static(_) => Ok(()),
            AuthProvider::Refreshable(p) => p.refresh().await.map(|_| ()),
        }
    }

    /// React to an authentication rejection from the downstream API.
    ///
    /// Static credentials cannot recover; refreshable ones force a refresh
    /// regardless of computed state. There is deliberately no fallback from
    /// one mode to the other.
    pub async fn on_auth_failure(&self) -> Result<(), AuthError> {
        match self {
            AuthProvider::Static(_) => Err(AuthError::StaticCredentialInvalid),
            AuthProvider::Refreshable(p) => p.on_auth_failure().await.map(|_| ()),
        }
    }

    pub async fn is_valid(&self) -> bool {
        match self {
            AuthProvider::Static(p) => p.is_valid(),
            AuthProvider::Refreshable(p) => p.is_valid().await,
        }
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AuthProvider::Static(_) => None,
            AuthProvider::Refreshable(p) => p.expires_at().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_round_trip() {
        let provider = StaticCredentialProvider::new("sk-ant-api03-test".to_string()).unwrap();
        assert!(provider.is_valid());
        assert_eq!(provider.credentials().secret(), "sk-ant-api03-test");
    }

    #[test]
    fn test_static_provider_rejects_empty_secret() {
        assert!(StaticCredentialProvider::new(String::new()).is_err());
    }

    #[tokio::test]
    async fn test_static_refresh_is_noop() {
        let provider = AuthProvider::Static(
            StaticCredentialProvider::new("sk-ant-api03-test".to_string()).unwrap(),
        );
        provider.refresh().await.unwrap();
        assert_eq!(provider.mode(), AuthMode::ApiKey);
        assert!(provider.expires_at().await.is_none());
    }

    #[tokio::test]
    async fn test_static_auth_failure_is_terminal() {
        let provider = AuthProvider::Static(
            StaticCredentialProvider::new("sk-ant-api03-test".to_string()).unwrap(),
        );
        assert!(matches!(
            provider.on_auth_failure().await,
            Err(AuthError::StaticCredentialInvalid)
        ));
    }

    #[test]
    fn test_credential_debug_redacts() {
        let cred = Credential::Bearer("oauth-secret".to_string());
        assert!(!format!("{cred:?}").contains("oauth-secret"));
    }
}
