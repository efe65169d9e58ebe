// Refreshable credential provider
//
// Holds the in-memory token set and serializes refreshes per instance: at
// most one network refresh is ever in flight, and every caller that needs
// credentials while one is running awaits that same operation. The refresh
// itself runs on a spawned task, so a caller abandoning its wait never
// cancels the network call out from under the other waiters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::Client;
use tokio::sync::{Mutex, RwLock};

use super::refresh::{self, RefreshError};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::CredentialStore;
use crate::types::{AuthMode, CredentialRecord, TokenSet, TokenState};

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenSet, RefreshError>>>;

pub struct RefreshableCredentialProvider {
    shared: Arc<SharedState>,
}

struct SharedState {
    tokens: RwLock<TokenSet>,
    in_flight: Mutex<Option<SharedRefresh>>,
    /// Sticky once refresh exhausts its retries; only a new login (a new
    /// provider instance) recovers.
    failed: AtomicBool,
    client: Client,
    config: AuthConfig,
    store: Arc<CredentialStore>,
}

impl RefreshableCredentialProvider {
    pub fn new(
        tokens: TokenSet,
        config: AuthConfig,
        store: Arc<CredentialStore>,
        client: Client,
    ) -> Result<Self, AuthError> {
        tokens.validate()?;
        Ok(Self {
            shared: Arc::new(SharedState {
                tokens: RwLock::new(tokens),
                in_flight: Mutex::new(None),
                failed: AtomicBool::new(false),
                client,
                config,
                store,
            }),
        })
    }

    /// Current credentials, refreshing first when inside the skew buffer or
    /// past expiry. Reads outside a refresh are atomic snapshots.
    pub async fn credentials(&self) -> Result<TokenSet, AuthError> {
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(AuthError::OauthTokenExpired);
        }

        let snapshot = self.shared.tokens.read().await.clone();
        match snapshot.state_at(Utc::now(), self.shared.config.refresh_skew) {
            TokenState::Fresh => Ok(snapshot),
            TokenState::NearExpiry | TokenState::Expired => self.refresh().await,
        }
    }

    /// Reactive path: the downstream API rejected credentials the provider
    /// believed fresh (clock skew, server-side revocation). Forces a refresh
    /// regardless of computed state.
    pub async fn on_auth_failure(&self) -> Result<TokenSet, AuthError> {
        tracing::warn!("downstream API rejected the access token, forcing refresh");
        self.refresh().await
    }

    /// Run (or join) a refresh and return the resulting token set.
    pub async fn refresh(&self) -> Result<TokenSet, AuthError> {
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(AuthError::OauthTokenExpired);
        }

        let operation = {
            let mut in_flight = self.shared.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(operation) => {
                    tracing::debug!("joining in-flight token refresh");
                    operation.clone()
                }
                None => {
                    let operation = spawn_refresh(Arc::clone(&self.shared));
                    *in_flight = Some(operation.clone());
                    operation
                }
            }
        };

        operation.await.map_err(|e| match e {
            RefreshError::MissingRefreshToken => AuthError::OauthRefresh {
                reason: "no refresh token on record".to_string(),
            },
            RefreshError::Exhausted => AuthError::OauthTokenExpired,
        })
    }

    /// True while the provider holds a usable, non-expired token set.
    pub async fn is_valid(&self) -> bool {
        if self.shared.failed.load(Ordering::SeqCst) {
            return false;
        }
        let tokens = self.shared.tokens.read().await;
        tokens.state_at(Utc::now(), self.shared.config.refresh_skew) != TokenState::Expired
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.shared.tokens.read().await.expires_at
    }
}

/// Start the refresh on its own task and hand back a future every waiter can
/// clone. The task clears the in-flight slot itself once the token set (and
/// failure flag) are settled.
fn spawn_refresh(shared: Arc<SharedState>) -> SharedRefresh {
    let handle = tokio::spawn(async move {
        let result = run_refresh(&shared).await;
        *shared.in_flight.lock().await = None;
        result
    });

    async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "refresh task aborted");
                Err(RefreshError::Exhausted)
            }
        }
    }
    .boxed()
    .shared()
}

async fn run_refresh(shared: &SharedState) -> Result<TokenSet, RefreshError> {
    let refresh_token = shared.tokens.read().await.refresh_token.clone();
    let Some(refresh_token) = refresh_token else {
        tracing::error!("cannot refresh: record has no refresh token");
        shared.failed.store(true, Ordering::SeqCst);
        return Err(RefreshError::MissingRefreshToken);
    };

    match refresh::execute(&shared.client, &shared.config, &refresh_token).await {
        Ok(new_tokens) => {
            // Replace the whole set inside the critical section; stale
            // secrets are dropped (and zeroed), not retained.
            *shared.tokens.write().await = new_tokens.clone();

            let record = CredentialRecord::from_token_set(AuthMode::Oauth, &new_tokens);
            if let Err(e) = shared.store.save(&record).await {
                // The in-memory set stays authoritative until the next
                // successful write; surfacing this as a refresh failure
                // would discard a perfectly good token.
                tracing::warn!(error = %e, "failed to persist refreshed tokens");
            }

            Ok(new_tokens)
        }
        Err(e) => {
            shared.failed.store(true, Ordering::SeqCst);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BackendKind, FileBackend};
    use chrono::Duration as ChronoDuration;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_config(endpoint: &str) -> AuthConfig {
        AuthConfig {
            token_endpoint: endpoint.to_string(),
            refresh_base_delay: Duration::from_millis(10),
            secrets_file: PathBuf::from("/nonexistent"),
            ..AuthConfig::default()
        }
    }

    fn file_store(dir: &tempfile::TempDir) -> Arc<CredentialStore> {
        Arc::new(CredentialStore::with_backends(
            vec![Arc::new(FileBackend::new(dir.path().join("credentials.json")))],
            Some(BackendKind::SecretsFile),
            Duration::from_millis(50),
        ))
    }

    fn oauth_tokens(expires_in: ChronoDuration) -> TokenSet {
        TokenSet::new(
            "oauth-current-access".to_string(),
            Some("oauth-current-refresh".to_string()),
            Some(Utc::now() + expires_in),
        )
        .unwrap()
    }

    fn provider(
        tokens: TokenSet,
        endpoint: &str,
        store: Arc<CredentialStore>,
    ) -> RefreshableCredentialProvider {
        RefreshableCredentialProvider::new(tokens, test_config(endpoint), store, Client::new())
            .unwrap()
    }

    fn refresh_body(access: &str) -> String {
        format!(
            r#"{{"access_token": "{access}", "refresh_token": "oauth-rotated-refresh", "expires_in": 28800}}"#
        )
    }

    #[tokio::test]
    async fn test_fresh_token_is_returned_without_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let tokens = oauth_tokens(ChronoDuration::minutes(10));
        let provider = provider(
            tokens.clone(),
            &format!("{}/v1/oauth/token", server.url()),
            file_store(&dir),
        );

        // Repeated calls while fresh: identical snapshots, zero network calls
        let first = provider.credentials().await.unwrap();
        let second = provider.credentials().await.unwrap();
        assert_eq!(first, tokens);
        assert_eq!(second, tokens);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_near_expiry_triggers_exactly_one_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refresh_body("oauth-proactive"))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        // Expires in 4 minutes: inside the 5 minute skew buffer
        let provider = provider(
            oauth_tokens(ChronoDuration::minutes(4)),
            &format!("{}/v1/oauth/token", server.url()),
            file_store(&dir),
        );

        let tokens = provider.credentials().await.unwrap();
        assert_eq!(tokens.access_token, "oauth-proactive");
        assert_eq!(tokens.refresh_token.as_deref(), Some("oauth-rotated-refresh"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refresh_body("oauth-shared"))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(provider(
            oauth_tokens(ChronoDuration::minutes(-1)),
            &format!("{}/v1/oauth/token", server.url()),
            file_store(&dir),
        ));

        let calls = (0..10).map(|_| {
            let provider = Arc::clone(&provider);
            async move { provider.credentials().await }
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            assert_eq!(result.unwrap().access_token, "oauth-shared");
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_replaces_and_persists_token_set() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refresh_body("oauth-rotated-access"))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        let provider = provider(
            oauth_tokens(ChronoDuration::minutes(-1)),
            &format!("{}/v1/oauth/token", server.url()),
            Arc::clone(&store),
        );

        let tokens = provider.credentials().await.unwrap();
        assert_eq!(tokens.access_token, "oauth-rotated-access");
        // The old pair is fully replaced, not appended
        assert_ne!(tokens.access_token, "oauth-current-access");
        assert_ne!(
            tokens.refresh_token.as_deref(),
            Some("oauth-current-refresh")
        );

        // The store holds the rotated record
        let persisted = store.load().await.unwrap();
        assert_eq!(persisted.access_token, "oauth-rotated-access");
        assert_eq!(
            persisted.refresh_token.as_deref(),
            Some("oauth-rotated-refresh")
        );
    }

    #[tokio::test]
    async fn test_exhausted_refresh_is_sticky() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/oauth/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .expect(3)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let provider = provider(
            oauth_tokens(ChronoDuration::minutes(-1)),
            &format!("{}/v1/oauth/token", server.url()),
            file_store(&dir),
        );

        let err = provider.credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::OauthTokenExpired));

        // Subsequent calls keep failing without further network traffic
        let err = provider.credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::OauthTokenExpired));
        assert!(!provider.is_valid().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_on_auth_failure_refreshes_while_fresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refresh_body("oauth-reactive"))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        // 10 minutes out: computed state is Fresh, refresh happens anyway
        let provider = provider(
            oauth_tokens(ChronoDuration::minutes(10)),
            &format!("{}/v1/oauth/token", server.url()),
            file_store(&dir),
        );

        let tokens = provider.on_auth_failure().await.unwrap();
        assert_eq!(tokens.access_token, "oauth-reactive");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        // Provisional login: bare access token, unknown expiry
        let tokens = TokenSet::new("oauth-bare".to_string(), None, None).unwrap();
        let provider = provider(
            tokens,
            &format!("{}/v1/oauth/token", server.url()),
            file_store(&dir),
        );

        let err = provider.credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::OauthRefresh { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_cancel_refresh() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(refresh_body("oauth-survivor"))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        let provider = Arc::new(provider(
            oauth_tokens(ChronoDuration::minutes(-1)),
            &format!("{}/v1/oauth/token", server.url()),
            Arc::clone(&store),
        ));

        // First caller starts the refresh, then its wait is dropped
        {
            let provider = Arc::clone(&provider);
            let waiter = tokio::spawn(async move { provider.credentials().await });
            waiter.abort();
            let _ = waiter.await;
        }

        // The underlying refresh keeps running; a later caller still gets
        // its result (or joins it mid-flight).
        let tokens = provider.credentials().await.unwrap();
        assert_eq!(tokens.access_token, "oauth-survivor");
    }
}
