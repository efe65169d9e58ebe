// Error taxonomy
//
// Every variant carries remediation in its message. No constructor accepts a
// credential value, so no error can ever render one.

use thiserror::Error;

use crate::store::BackendKind;

/// Authentication and token-lifecycle errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The secret matched no known prefix. Fatal to login, never retried:
    /// guessing the mode would route requests through the wrong header.
    #[error(
        "unrecognized credential format: expected an `sk-ant-` API key or an \
         `oauth-` token; re-run login with a valid credential"
    )]
    UnrecognizedCredentialFormat,

    /// No credential was found in any backend.
    #[error("no credentials found; run login first")]
    NotLoggedIn,

    /// Refresh attempts were exhausted (or the credential is terminally
    /// unusable); the only remediation is a fresh login.
    #[error("OAuth token expired and could not be refreshed; re-run login")]
    OauthTokenExpired,

    /// A refresh could not be attempted at all.
    #[error("OAuth token refresh failed: {reason}; re-run login")]
    OauthRefresh { reason: String },

    /// The downstream API rejected a static credential. No refresh is
    /// possible for this mode.
    #[error("the API rejected the static credential; check the key and re-run login")]
    StaticCredentialInvalid,

    /// A credential backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Transport-level failure talking to the downstream API.
    #[error("request transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// A credential backend failed to read, write, or delete.
///
/// Partial failures during `clear()` are reported per backend via
/// `ClearReport`, never collapsed into a single boolean.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    #[error("failed to read from {backend} backend: {reason}")]
    Read { backend: BackendKind, reason: String },

    #[error("failed to write to {backend} backend: {reason}")]
    Write { backend: BackendKind, reason: String },

    #[error("failed to delete from {backend} backend: {reason}")]
    Delete { backend: BackendKind, reason: String },

    #[error("{backend} backend is read-only; select a writable backend")]
    ReadOnlyBackend { backend: BackendKind },

    #[error("stored credential record in {backend} backend is malformed: {reason}")]
    Malformed { backend: BackendKind, reason: String },

    #[error("timed out clearing {backend} backend")]
    Timeout { backend: BackendKind },
}

impl StorageError {
    /// The backend this error originated from.
    pub fn backend(&self) -> BackendKind {
        match self {
            StorageError::Unavailable { backend, .. }
            | StorageError::Read { backend, .. }
            | StorageError::Write { backend, .. }
            | StorageError::Delete { backend, .. }
            | StorageError::ReadOnlyBackend { backend }
            | StorageError::Malformed { backend, .. }
            | StorageError::Timeout { backend } => *backend,
        }
    }
}
