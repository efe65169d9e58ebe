// Credential storage
//
// Reads resolve across backends in a fixed precedence order; writes target a
// single caller-selected backend. The store owns the persisted record;
// providers hold an in-memory copy and push updates back through here.

mod env;
mod file;
mod keyring;

pub use env::EnvBackend;
pub use file::FileBackend;
pub use keyring::KeyringBackend;

use std::sync::Arc;

use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::StorageError;
use crate::types::CredentialRecord;

/// Identifies one credential backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Environment,
    Keyring,
    SecretsFile,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Environment => write!(f, "environment"),
            BackendKind::Keyring => write!(f, "keyring"),
            BackendKind::SecretsFile => write!(f, "secrets-file"),
        }
    }
}

/// One storage backend. Implementations are synchronous; the store pushes
/// them through `spawn_blocking`.
pub trait CredentialBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Returns `None` when the backend holds no record.
    fn load(&self) -> Result<Option<CredentialRecord>, StorageError>;

    fn save(&self, record: &CredentialRecord) -> Result<(), StorageError>;

    /// Deleting an absent record is not an error.
    fn delete(&self) -> Result<(), StorageError>;
}

/// Per-backend outcome of a `clear()` sweep.
#[derive(Debug, Default)]
pub struct ClearReport {
    pub cleared: Vec<BackendKind>,
    pub failed: Vec<(BackendKind, StorageError)>,
}

impl ClearReport {
    /// True when every backend was left without a record.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Multi-backend credential store with fixed read precedence:
/// environment, OS secret store, local secrets file.
pub struct CredentialStore {
    backends: Vec<Arc<dyn CredentialBackend>>,
    write_backend: Option<BackendKind>,
    clear_timeout: std::time::Duration,
}

impl CredentialStore {
    pub fn from_config(config: &AuthConfig) -> Self {
        let backends: Vec<Arc<dyn CredentialBackend>> = vec![
            Arc::new(EnvBackend::new(config.credential_env_var.clone())),
            Arc::new(KeyringBackend::new(
                config.keyring_service.clone(),
                config.keyring_user.clone(),
            )),
            Arc::new(FileBackend::new(config.secrets_file.clone())),
        ];
        Self {
            backends,
            write_backend: config.write_backend,
            clear_timeout: config.clear_timeout,
        }
    }

    /// Build a store over an explicit backend set, in precedence order.
    pub fn with_backends(
        backends: Vec<Arc<dyn CredentialBackend>>,
        write_backend: Option<BackendKind>,
        clear_timeout: std::time::Duration,
    ) -> Self {
        Self {
            backends,
            write_backend,
            clear_timeout,
        }
    }

    /// Resolve a credential record from the first backend that yields one.
    ///
    /// Partial records are never merged across backends. A backend that
    /// errors is logged and skipped so a broken keyring cannot mask a valid
    /// secrets file.
    pub async fn load(&self) -> Option<CredentialRecord> {
        for backend in &self.backends {
            let kind = backend.kind();
            let backend = Arc::clone(backend);
            let result = tokio::task::spawn_blocking(move || backend.load()).await;

            match result {
                Ok(Ok(Some(record))) => {
                    tracing::debug!(backend = %kind, "resolved credentials");
                    return Some(record);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(backend = %kind, error = %e, "skipping backend during load");
                }
                Err(e) => {
                    tracing::warn!(backend = %kind, error = %e, "backend load task failed");
                }
            }
        }
        None
    }

    /// Persist a record, returning the backend that took the write.
    ///
    /// With no explicit target, the OS secret store is tried first and the
    /// secrets file serves as the fallback when it is unavailable.
    pub async fn save(&self, record: &CredentialRecord) -> Result<BackendKind, StorageError> {
        if let Some(target) = self.write_backend {
            return self.save_to(target, record).await;
        }

        match self.save_to(BackendKind::Keyring, record).await {
            Ok(kind) => Ok(kind),
            Err(e) => {
                tracing::warn!(error = %e, "keyring write failed, falling back to secrets file");
                self.save_to(BackendKind::SecretsFile, record).await
            }
        }
    }

    async fn save_to(
        &self,
        target: BackendKind,
        record: &CredentialRecord,
    ) -> Result<BackendKind, StorageError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.kind() == target)
            .cloned()
            .ok_or(StorageError::Unavailable {
                backend: target,
                reason: "backend not configured".to_string(),
            })?;

        let record = record.clone();
        let result = tokio::task::spawn_blocking(move || backend.save(&record))
            .await
            .map_err(|e| StorageError::Write {
                backend: target,
                reason: e.to_string(),
            })?;

        result.map(|()| {
            tracing::debug!(backend = %target, "persisted credentials");
            target
        })
    }

    /// Best-effort delete from every backend.
    ///
    /// Continues past individual failures and bounds each backend by the
    /// configured time budget so an interactive logout never hangs on a
    /// stuck secret service. Backends have no transactional guarantees
    /// across each other; a partial sweep is reported, not hidden.
    pub async fn clear(&self) -> ClearReport {
        let mut report = ClearReport::default();

        for backend in &self.backends {
            let kind = backend.kind();
            let backend = Arc::clone(backend);
            let delete = tokio::task::spawn_blocking(move || backend.delete());

            match tokio::time::timeout(self.clear_timeout, delete).await {
                Ok(Ok(Ok(()))) => report.cleared.push(kind),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(backend = %kind, error = %e, "clear failed");
                    report.failed.push((kind, e));
                }
                Ok(Err(e)) => {
                    tracing::warn!(backend = %kind, error = %e, "clear task failed");
                    report.failed.push((
                        kind,
                        StorageError::Delete {
                            backend: kind,
                            reason: e.to_string(),
                        },
                    ));
                }
                Err(_) => {
                    tracing::warn!(backend = %kind, "clear timed out");
                    report.failed.push((kind, StorageError::Timeout { backend: kind }));
                }
            }
        }

        report
    }
}
