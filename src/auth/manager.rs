//! Token lifecycle state machine.
//!
//! ```text
//! not-authorized ──authorize/exchange──► valid ◄──refresh── expired
//!                                          │  ╲                ▲
//!                                          │   ╲───(time)──────┘
//!                                          └──revoke──► revoked
//! ```
//!
//! Every transition is broadcast as a [`TokenStatus`]. Persistence goes through the
//! [`SecretStore`]; the manager keeps an in-memory copy of the current record.
//! Concurrent callers racing on an expiring token may both refresh; both end up
//! with a valid token.

use super::callback::CallbackServer;
use super::oauth::{build_authorization, OAuthClient};
use super::record::{AccountInfo, TokenRecord, TokenStatus};
use super::store::{SecretRef, SecretStore};
use super::{AuthorizationOpener, Credential, CredentialProvider, LogOpener};
use crate::config::{BridgeConfig, OAuthConfig, OAuthFlavor};
use crate::drivers::{code_assist, driver_for};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Safety margin applied by [`TokenManager::get_credential`].
pub const EXPIRY_BUFFER_MS: u64 = 5 * 60 * 1000;

const STATUS_CHANNEL_CAPACITY: usize = 16;

pub struct TokenManager {
    oauth: OAuthClient,
    http: HttpTransport,
    store: Arc<dyn SecretStore>,
    secret_ref: SecretRef,
    record: RwLock<Option<TokenRecord>>,
    status: Mutex<TokenStatus>,
    events: broadcast::Sender<TokenStatus>,
    opener: Arc<dyn AuthorizationOpener>,
    callback_timeout: Duration,
    discovery_endpoints: Vec<String>,
    project_hint: Option<String>,
    // Cancelled and replaced by `cancel_pending`; interactive flows hold a clone.
    interactive: Mutex<CancellationToken>,
}

impl TokenManager {
    pub fn new(
        oauth: OAuthConfig,
        http: HttpTransport,
        store: Arc<dyn SecretStore>,
        secret_ref: SecretRef,
    ) -> Self {
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let discovery_endpoints = match oauth.flavor {
            OAuthFlavor::Google => code_assist::LOAD_ENDPOINTS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            OAuthFlavor::IFlow => Vec::new(),
        };
        Self {
            oauth: OAuthClient::new(oauth, http.clone()),
            http,
            store,
            secret_ref,
            record: RwLock::new(None),
            status: Mutex::new(TokenStatus::NotAuthorized),
            events,
            opener: Arc::new(LogOpener),
            callback_timeout: Duration::from_secs(300),
            discovery_endpoints,
            project_hint: None,
            interactive: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn from_config(
        config: &BridgeConfig,
        store: Arc<dyn SecretStore>,
        secret_ref: SecretRef,
    ) -> Result<Self> {
        let http = HttpTransport::new(&config.transport, &config.timeouts)?;
        let mut manager = Self::new(config.oauth.clone(), http, store, secret_ref)
            .with_callback_timeout(config.timeouts.callback());
        if config.oauth.flavor == OAuthFlavor::Google {
            manager.discovery_endpoints = driver_for(config.provider).discovery_endpoints();
        }
        manager.project_hint = config.project_id.clone();
        Ok(manager)
    }

    pub fn with_opener(mut self, opener: Arc<dyn AuthorizationOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Endpoints used for Code Assist project discovery. Empty disables discovery.
    pub fn with_discovery_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discovery_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project_hint(mut self, project: impl Into<String>) -> Self {
        self.project_hint = Some(project.into());
        self
    }

    pub fn secret_ref(&self) -> &SecretRef {
        &self.secret_ref
    }

    pub fn status(&self) -> TokenStatus {
        *self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TokenStatus> {
        self.events.subscribe()
    }

    /// Abort in-flight interactive flows. Later calls on the manager are unaffected;
    /// refresh and revoke are never cancelled by this.
    pub fn cancel_pending(&self) {
        let mut slot = self.interactive.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *slot, CancellationToken::new()).cancel();
    }

    fn interactive_token(&self) -> CancellationToken {
        self.interactive
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn emit(&self, status: TokenStatus) {
        *self.status.lock().unwrap_or_else(|p| p.into_inner()) = status;
        info!(status = ?status, secret_ref = %self.secret_ref, "token status changed");
        // No subscribers is fine.
        let _ = self.events.send(status);
    }

    pub fn is_expired(&self, record: &TokenRecord, buffer_ms: u64) -> bool {
        self.store.is_expired(record, buffer_ms)
    }

    /// Current record, loading it from the secret store on first use.
    pub async fn current_record(&self) -> Result<Option<TokenRecord>> {
        if let Some(record) = self.record.read().await.clone() {
            return Ok(Some(record));
        }
        let loaded = self.store.get_token(&self.secret_ref).await?;
        if let Some(record) = &loaded {
            *self.record.write().await = Some(record.clone());
        }
        Ok(loaded)
    }

    async fn persist(&self, record: &TokenRecord) -> Result<()> {
        self.store.set_token(&self.secret_ref, record).await?;
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    /// Run the interactive flow: open the authorization URL, wait for the loopback
    /// redirect, then exchange the code.
    pub async fn authorize(&self) -> Result<TokenRecord> {
        let cancel = self.interactive_token();
        let cfg = self.oauth.config();
        let server = CallbackServer::bind(cfg.callback_port, cfg.callback_path.clone()).await?;
        let redirect_uri = cfg.redirect_uri(server.port());
        let auth = build_authorization(cfg, &redirect_uri)?;
        info!(flavor = ?cfg.flavor, port = server.port(), "starting interactive authorization");

        if let Err(e) = self.opener.open(&auth.url).await {
            self.emit(TokenStatus::Error);
            return Err(e);
        }

        let code = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            code = server.wait_for_code(&auth.state, self.callback_timeout) => code,
        };
        let code = match code {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "authorization callback failed");
                self.emit(TokenStatus::Error);
                return Err(e);
            }
        };
        self.exchange_with_verifier(
            &code,
            &auth.redirect_uri,
            auth.code_verifier.as_deref(),
            &cancel,
        )
        .await
    }

    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<TokenRecord> {
        self.exchange_with_verifier(code, redirect_uri, None, &CancellationToken::new())
            .await
    }

    async fn exchange_with_verifier(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TokenRecord> {
        let record = match self
            .oauth
            .exchange_code(code, redirect_uri, code_verifier, cancel)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "authorization code exchange failed");
                self.emit(TokenStatus::Error);
                return Err(e);
            }
        };
        let account = match self.fetch_account(&record.access_token, cancel).await {
            Ok(account) => account,
            Err(e) => {
                self.emit(TokenStatus::Error);
                return Err(e);
            }
        };
        let record = record.with_account(account);
        self.persist(&record).await?;
        info!(
            has_refresh_token = record.refresh_token.is_some(),
            expires_at_ms = ?record.expires_at_ms,
            "authorization exchange complete"
        );
        self.emit(TokenStatus::Valid);
        Ok(record)
    }

    /// Account metadata after a successful exchange. Google metadata is best effort;
    /// the iFlow API key is required.
    async fn fetch_account(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AccountInfo> {
        let flavor = self.oauth.config().flavor;
        let mut account = match self.oauth.fetch_user_info(access_token, cancel).await {
            Ok(account) => account,
            Err(e) if flavor == OAuthFlavor::Google => {
                warn!(error = %e, "user info lookup failed");
                AccountInfo::default()
            }
            Err(e) => return Err(e),
        };
        if flavor == OAuthFlavor::Google && !self.discovery_endpoints.is_empty() {
            let discovered = code_assist::discover_project(
                &self.http,
                &self.discovery_endpoints,
                access_token,
                self.project_hint.as_deref(),
                cancel,
            )
            .await?;
            account.project_id = discovered.project_id;
            account.tier = discovered.tier;
        } else if account.project_id.is_none() {
            account.project_id = self.project_hint.clone();
        }
        Ok(account)
    }

    /// Exchange `refresh_token` for a fresh access token. A refresh token absent
    /// from the response keeps the prior one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        let prior = self.current_record().await?;
        let cancel = CancellationToken::new();
        let mut fresh = match self.oauth.refresh_token(refresh_token, &cancel).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.emit(TokenStatus::Error);
                return Err(e);
            }
        };
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token.to_string());
        }
        if let Some(prior) = prior {
            fresh.account = prior.account;
        }
        self.persist(&fresh).await?;
        info!(expires_at_ms = ?fresh.expires_at_ms, "access token refreshed");
        self.emit(TokenStatus::Valid);
        Ok(fresh)
    }

    /// Revoke upstream (best effort) and forget the stored record.
    pub async fn revoke(&self) -> Result<()> {
        if let Some(record) = self.current_record().await? {
            let token = record.refresh_token.as_deref().unwrap_or(&record.access_token);
            if let Err(e) = self.oauth.revoke(token, &CancellationToken::new()).await {
                warn!(error = %e, "upstream revocation failed; deleting local credential anyway");
            }
        }
        self.store.delete_token(&self.secret_ref).await?;
        *self.record.write().await = None;
        self.emit(TokenStatus::Revoked);
        Ok(())
    }

    /// A live credential, refreshing once when within [`EXPIRY_BUFFER_MS`] of expiry.
    ///
    /// Returns [`Error::ReauthorizationRequired`] when nothing is stored, no refresh
    /// token exists, or the refresh fails.
    pub async fn get_credential(&self) -> Result<TokenRecord> {
        let Some(record) = self.current_record().await? else {
            return Err(Error::reauthorize("no credential stored"));
        };
        if !self.is_expired(&record, EXPIRY_BUFFER_MS) {
            if self.status() != TokenStatus::Valid {
                self.emit(TokenStatus::Valid);
            }
            return Ok(record);
        }

        info!("access token expired or near expiry, refreshing");
        let Some(refresh_token) = record.refresh_token.clone() else {
            self.emit(TokenStatus::Expired);
            return Err(Error::reauthorize(
                "access token expired and no refresh token is stored",
            ));
        };
        match self.refresh(&refresh_token).await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                self.emit(TokenStatus::Expired);
                Err(Error::reauthorize(format!("token refresh failed: {}", e)))
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for TokenManager {
    async fn credential(&self) -> Result<Credential> {
        let record = self.get_credential().await?;
        Ok(Credential::from_record(&record))
    }
}
