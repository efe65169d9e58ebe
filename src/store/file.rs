// Local secrets-file backend
//
// JSON record at a fixed path, created with owner-only permissions. A file
// found with broader permissions is still read, with a warning.

use std::path::PathBuf;

use crate::error::StorageError;
use crate::store::{BackendKind, CredentialBackend};
use crate::types::CredentialRecord;

pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[cfg(unix)]
    fn warn_on_broad_permissions(&self) {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = std::fs::metadata(&self.path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    mode = format!("{:o}", mode & 0o777),
                    "secrets file is readable by other users; run chmod 600 on it"
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn warn_on_broad_permissions(&self) {}
}

impl CredentialBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SecretsFile
    }

    fn load(&self) -> Result<Option<CredentialRecord>, StorageError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::Read {
                    backend: BackendKind::SecretsFile,
                    reason: e.to_string(),
                })
            }
        };

        self.warn_on_broad_permissions();

        let record = serde_json::from_str(&data).map_err(|e| StorageError::Malformed {
            backend: BackendKind::SecretsFile,
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let write_err = |e: std::io::Error| StorageError::Write {
            backend: BackendKind::SecretsFile,
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let data = serde_json::to_string_pretty(record).map_err(|e| StorageError::Write {
            backend: BackendKind::SecretsFile,
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, data).map_err(write_err)?;

        // Owner-only, every time: a pre-existing file keeps its old mode
        // otherwise.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }

        Ok(())
    }

    fn delete(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete {
                backend: BackendKind::SecretsFile,
                reason: e.to_string(),
            }),
        }
    }
}
