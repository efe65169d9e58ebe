// Process-environment backend
//
// Discovery only: a raw secret in a single environment variable, classified
// on read. Writes are rejected; live secrets are never passed through the
// process environment.

use crate::detector;
use crate::error::StorageError;
use crate::store::{BackendKind, CredentialBackend};
use crate::types::CredentialRecord;

pub struct EnvBackend {
    var: String,
}

impl EnvBackend {
    pub fn new(var: String) -> Self {
        Self { var }
    }
}

impl CredentialBackend for EnvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Environment
    }

    fn load(&self) -> Result<Option<CredentialRecord>, StorageError> {
        let secret = match std::env::var(&self.var) {
            Ok(s) if !s.is_empty() => s,
            _ => return Ok(None),
        };

        let mode = detector::classify(&secret).map_err(|_| StorageError::Malformed {
            backend: BackendKind::Environment,
            reason: format!("value of {} matches no known credential prefix", self.var),
        })?;

        // The environment carries a bare secret: no refresh token, no expiry.
        Ok(Some(CredentialRecord {
            mode,
            access_token: secret,
            refresh_token: None,
            expires_at: None,
        }))
    }

    fn save(&self, _record: &CredentialRecord) -> Result<(), StorageError> {
        Err(StorageError::ReadOnlyBackend {
            backend: BackendKind::Environment,
        })
    }

    fn delete(&self) -> Result<(), StorageError> {
        // Process-local only; nothing survives the process anyway.
        std::env::remove_var(&self.var);
        Ok(())
    }
}
