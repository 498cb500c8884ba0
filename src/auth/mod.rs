//! 认证模块：OAuth 授权、令牌交换/刷新/吊销与凭据存储。
//!
//! # Token Lifecycle
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | [`TokenManager`] state machine and status notifications |
//! | [`oauth`] | Authorization URL, token endpoint and user-info calls |
//! | [`callback`] | Loopback listener for the OAuth redirect |
//! | [`store`] | [`SecretStore`] collaborator (keyring / memory) |
//! | [`record`] | [`TokenRecord`], [`AccountInfo`], [`TokenStatus`] |
//!
//! The orchestrator does not talk to the manager directly; it asks a
//! [`CredentialProvider`] for a [`Credential`], so hosts with their own token
//! handling can plug in a [`StaticCredential`] or a custom provider.

pub mod callback;
pub mod manager;
pub mod oauth;
pub mod record;
pub mod store;

pub use callback::{CallbackParams, CallbackServer};
pub use manager::{TokenManager, EXPIRY_BUFFER_MS};
pub use oauth::{build_authorization, AuthorizationRequest, OAuthClient};
pub use record::{now_ms, AccountInfo, TokenRecord, TokenStatus};
pub use store::{KeyringSecretStore, MemorySecretStore, SecretRef, SecretStore, KEYRING_SERVICE};

use crate::Result;
use async_trait::async_trait;
use tracing::info;

/// Opens the provider-hosted authorization page (browser, QR code, ...).
#[async_trait]
pub trait AuthorizationOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Prints the URL through `tracing`; hosts without a browser integration copy it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOpener;

#[async_trait]
impl AuthorizationOpener for LogOpener {
    async fn open(&self, url: &str) -> Result<()> {
        info!(url = %url, "open this URL to authorize");
        Ok(())
    }
}

/// What a call needs from the account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub project_id: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            project_id: None,
        }
    }

    pub fn with_project_id(mut self, project: impl Into<String>) -> Self {
        self.project_id = Some(project.into());
        self
    }

    pub fn from_record(record: &TokenRecord) -> Self {
        Self {
            access_token: record.access_token.clone(),
            project_id: record.account.project_id.clone(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Result<Credential>;
}

/// Fixed credential, e.g. a token obtained by the host.
#[derive(Debug, Clone)]
pub struct StaticCredential(pub Credential);

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }
}
