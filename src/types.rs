// Credential and token data types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AuthError;

/// Context limit for API-key credentials (tokens).
pub const API_KEY_CONTEXT_LIMIT: u32 = 200_000;

/// Context limit for OAuth credentials (tokens).
/// Materially smaller than the API-key tier.
pub const OAUTH_CONTEXT_LIMIT: u32 = 40_000;

/// Authentication mode, fixed at construction time for the lifetime
/// of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Long-lived static API key, sent as `x-api-key`.
    ApiKey,
    /// Short-lived access token with a refresh token, sent as a bearer token.
    Oauth,
}

impl AuthMode {
    /// Advisory input-size limit for this mode, in tokens.
    pub fn context_limit(&self) -> u32 {
        match self {
            AuthMode::ApiKey => API_KEY_CONTEXT_LIMIT,
            AuthMode::Oauth => OAUTH_CONTEXT_LIMIT,
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::ApiKey => write!(f, "api_key"),
            AuthMode::Oauth => write!(f, "oauth"),
        }
    }
}

/// Lifecycle state of a token set relative to its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Comfortably inside the validity window.
    Fresh,
    /// Inside the skew buffer before expiry; refresh proactively.
    NearExpiry,
    /// Past expiry (or expiry unknown); must refresh before use.
    Expired,
}

/// Access/refresh secret pair with expiry.
///
/// Secrets are zeroed on drop. The `Debug` impl redacts them so a token set
/// can appear in tracing fields without leaking credential values.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AuthError> {
        let set = Self {
            access_token,
            refresh_token,
            expires_at,
        };
        set.validate()?;
        Ok(set)
    }

    /// A refresh token without a known expiry is unusable: the provider
    /// could never decide when to use it.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_token.is_empty() {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "token set has an empty access token"
            )));
        }
        if self.refresh_token.is_some() && self.expires_at.is_none() {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "token set carries a refresh token but no expiry"
            )));
        }
        Ok(())
    }

    /// Classify this set against the given skew buffer at time `now`.
    ///
    /// An unknown expiry classifies as `Expired`: with no expiration info,
    /// assume a refresh is needed.
    pub fn state_at(&self, now: DateTime<Utc>, skew: std::time::Duration) -> TokenState {
        let Some(expires_at) = self.expires_at else {
            return TokenState::Expired;
        };
        let skew = Duration::seconds(skew.as_secs() as i64);
        if now >= expires_at {
            TokenState::Expired
        } else if now >= expires_at - skew {
            TokenState::NearExpiry
        } else {
            TokenState::Fresh
        }
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Persisted credential form, owned by the `CredentialStore`.
///
/// Providers hold an in-memory copy and push updates back through the store
/// after every mutation; the store is the source of truth across restarts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub mode: AuthMode,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn from_token_set(mode: AuthMode, tokens: &TokenSet) -> Self {
        Self {
            mode,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at,
        }
    }

    pub fn token_set(&self) -> Result<TokenSet, AuthError> {
        TokenSet::new(
            self.access_token.clone(),
            self.refresh_token.clone(),
            self.expires_at,
        )
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("mode", &self.mode)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Snapshot returned by `status()` for an external CLI layer.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub mode: AuthMode,
    pub expires_at: Option<DateTime<Utc>>,
    pub context_limit: u32,
}

/// Token-endpoint refresh request body.
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub grant_type: &'a str,
    pub refresh_token: &'a str,
    pub client_id: &'a str,
}

/// Token-endpoint refresh response body.
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}
