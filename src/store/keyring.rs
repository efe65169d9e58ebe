// OS secret store backend
//
// One keyring entry holding the JSON-serialized record. Encryption at rest
// and first-use consent are the platform's business; this backend only maps
// the entry to a `CredentialRecord`.

use keyring::Entry;

use crate::error::StorageError;
use crate::store::{BackendKind, CredentialBackend};
use crate::types::CredentialRecord;

pub struct KeyringBackend {
    service: String,
    user: String,
}

impl KeyringBackend {
    pub fn new(service: String, user: String) -> Self {
        Self { service, user }
    }

    fn entry(&self) -> Result<Entry, StorageError> {
        Entry::new(&self.service, &self.user).map_err(|e| StorageError::Unavailable {
            backend: BackendKind::Keyring,
            reason: e.to_string(),
        })
    }
}

impl CredentialBackend for KeyringBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Keyring
    }

    fn load(&self) -> Result<Option<CredentialRecord>, StorageError> {
        let data = match self.entry()?.get_password() {
            Ok(d) => d,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                return Err(StorageError::Read {
                    backend: BackendKind::Keyring,
                    reason: e.to_string(),
                })
            }
        };

        let record = serde_json::from_str(&data).map_err(|e| StorageError::Malformed {
            backend: BackendKind::Keyring,
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let data = serde_json::to_string(record).map_err(|e| StorageError::Write {
            backend: BackendKind::Keyring,
            reason: e.to_string(),
        })?;

        self.entry()?
            .set_password(&data)
            .map_err(|e| StorageError::Write {
                backend: BackendKind::Keyring,
                reason: e.to_string(),
            })
    }

    fn delete(&self) -> Result<(), StorageError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Delete {
                backend: BackendKind::Keyring,
                reason: e.to_string(),
            }),
        }
    }
}
