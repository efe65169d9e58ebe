// Auth service facade
//
// The surface an external CLI layer drives: login, status, refresh, logout.
// Owns the store, the shared HTTP client, and the active provider.

use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use tokio::sync::RwLock;

use crate::authenticator::RequestAuthenticator;
use crate::config::AuthConfig;
use crate::detector;
use crate::error::AuthError;
use crate::provider::AuthProvider;
use crate::store::{ClearReport, CredentialStore};
use crate::types::{AuthMode, AuthStatus, CredentialRecord, TokenSet};

pub struct AuthService {
    config: AuthConfig,
    store: Arc<CredentialStore>,
    client: Client,
    provider: RwLock<Option<Arc<AuthProvider>>>,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let store = Arc::new(CredentialStore::from_config(&config));
        Self::with_store(config, store)
    }

    /// Build the service over an explicit store (custom backend selection).
    pub fn with_store(config: AuthConfig, store: Arc<CredentialStore>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            config,
            store,
            client,
            provider: RwLock::new(None),
        })
    }

    /// Classify a pasted secret, persist it, and activate the matching
    /// provider.
    ///
    /// An `oauth-` secret on its own becomes a provisional record with no
    /// refresh token and no expiry; pair it with `login_oauth` when the full
    /// token set from a login flow is available.
    pub async fn login(&self, secret: &str) -> Result<AuthStatus, AuthError> {
        let mode = detector::classify(secret)?;
        tracing::info!(%mode, "logging in");

        let record = CredentialRecord {
            mode,
            access_token: secret.to_string(),
            refresh_token: None,
            expires_at: None,
        };
        self.activate(record).await
    }

    /// Persist a complete OAuth token set obtained from an external login
    /// flow and activate the refreshable provider.
    pub async fn login_oauth(&self, tokens: TokenSet) -> Result<AuthStatus, AuthError> {
        tokens.validate()?;
        tracing::info!(expires_at = ?tokens.expires_at, "logging in with OAuth tokens");

        let record = CredentialRecord::from_token_set(AuthMode::Oauth, &tokens);
        self.activate(record).await
    }

    async fn activate(&self, record: CredentialRecord) -> Result<AuthStatus, AuthError> {
        self.store.save(&record).await?;

        let provider = Arc::new(AuthProvider::from_record(
            &record,
            self.config.clone(),
            Arc::clone(&self.store),
            self.client.clone(),
        )?);
        *self.provider.write().await = Some(Arc::clone(&provider));

        self.status_of(&provider).await
    }

    /// Discover credentials across the store's precedence chain and activate
    /// a provider for them.
    pub async fn resolve(&self) -> Result<Arc<AuthProvider>, AuthError> {
        if let Some(provider) = self.provider.read().await.as_ref() {
            return Ok(Arc::clone(provider));
        }

        let record = self.store.load().await.ok_or(AuthError::NotLoggedIn)?;
        let provider = Arc::new(AuthProvider::from_record(
            &record,
            self.config.clone(),
            Arc::clone(&self.store),
            self.client.clone(),
        )?);

        let mut slot = self.provider.write().await;
        // A concurrent resolve may have won the race; keep the first one so
        // refresh serialization stays per-instance.
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        *slot = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Mode, expiry, and context limit of the active credentials.
    pub async fn status(&self) -> Result<AuthStatus, AuthError> {
        let provider = self.resolve().await?;
        self.status_of(&provider).await
    }

    /// Force a refresh and report the resulting status.
    pub async fn refresh(&self) -> Result<AuthStatus, AuthError> {
        let provider = self.resolve().await?;
        provider.refresh().await?;
        self.status_of(&provider).await
    }

    /// Drop the active provider and delete credentials from every backend.
    ///
    /// The report lists exactly which backends were cleared and which
    /// failed; a partial sweep is surfaced, never hidden.
    pub async fn logout(&self) -> ClearReport {
        *self.provider.write().await = None;
        let report = self.store.clear().await;
        if report.is_complete() {
            tracing::info!("logged out, all backends cleared");
        } else {
            tracing::warn!(
                failed = report.failed.len(),
                "logout left credentials in some backends"
            );
        }
        report
    }

    /// A request authenticator over the active provider.
    pub async fn authenticator(&self) -> Result<RequestAuthenticator, AuthError> {
        let provider = self.resolve().await?;
        Ok(RequestAuthenticator::new(provider, self.client.clone()))
    }

    async fn status_of(&self, provider: &AuthProvider) -> Result<AuthStatus, AuthError> {
        let mode = provider.mode();
        Ok(AuthStatus {
            mode,
            expires_at: provider.expires_at().await,
            context_limit: mode.context_limit(),
        })
    }
}
