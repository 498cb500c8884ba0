//! Secret store collaborator: the only persistence boundary for credentials.
//!
//! Records are addressed by a [`SecretRef`], an opaque reference distinct from the
//! credential value itself. Two stores ship with the crate:
//!
//! | Store | Backing |
//! |-------|---------|
//! | [`KeyringSecretStore`] | OS keychain via `keyring`, one JSON entry per ref |
//! | [`MemorySecretStore`] | process memory, for tests and ephemeral hosts |

use super::record::TokenRecord;
use crate::{Error, Result};
use async_trait::async_trait;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Keychain service name shared with the rest of the ai-protocol tooling.
pub const KEYRING_SERVICE: &str = "ai-protocol";

/// Opaque reference to a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(format!("oauth-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_token(&self, secret_ref: &SecretRef) -> Result<Option<TokenRecord>>;

    async fn set_token(&self, secret_ref: &SecretRef, record: &TokenRecord) -> Result<()>;

    async fn delete_token(&self, secret_ref: &SecretRef) -> Result<()>;

    fn is_expired(&self, record: &TokenRecord, buffer_ms: u64) -> bool {
        record.is_expired(buffer_ms)
    }

    fn create_ref(&self) -> SecretRef {
        SecretRef::generate()
    }
}

#[derive(Default)]
pub struct MemorySecretStore {
    records: Mutex<HashMap<SecretRef, TokenRecord>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_token(&self, secret_ref: &SecretRef) -> Result<Option<TokenRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(secret_ref).cloned())
    }

    async fn set_token(&self, secret_ref: &SecretRef, record: &TokenRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.insert(secret_ref.clone(), record.clone());
        Ok(())
    }

    async fn delete_token(&self, secret_ref: &SecretRef) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.remove(secret_ref);
        Ok(())
    }
}

/// OS keychain store. `keyring` calls block, so they run on the blocking pool.
pub struct KeyringSecretStore {
    service: String,
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    async fn with_entry<T, F>(&self, secret_ref: &SecretRef, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let user = secret_ref.as_str().to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &user).map_err(|e| Error::SecretStore(e.to_string()))?;
            op(entry).map_err(|e| Error::SecretStore(e.to_string()))
        })
        .await
        .map_err(|e| Error::SecretStore(format!("keyring task failed: {}", e)))?
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn get_token(&self, secret_ref: &SecretRef) -> Result<Option<TokenRecord>> {
        let raw = self
            .with_entry(secret_ref, |entry| match entry.get_password() {
                Ok(raw) => Ok(Some(raw)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            })
            .await?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::malformed("stored token record", e.to_string())),
            None => Ok(None),
        }
    }

    async fn set_token(&self, secret_ref: &SecretRef, record: &TokenRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.with_entry(secret_ref, move |entry| entry.set_password(&raw))
            .await
    }

    async fn delete_token(&self, secret_ref: &SecretRef) -> Result<()> {
        self.with_entry(secret_ref, |entry| match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}
