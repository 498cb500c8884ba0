use crate::auth::{Credential, CredentialProvider, StaticCredential, TokenManager};
use crate::cache::{SharedCaches, DEFAULT_SIGNATURE_CAPACITY};
use crate::client::core::ProviderClient;
use crate::config::BridgeConfig;
use crate::drivers::{driver_for, ProviderDriver};
use crate::error::ErrorContext;
use crate::transform::process_session_id;
use crate::transport::HttpTransport;
use crate::{Error, Result};
use std::sync::Arc;

/// Builder for [`ProviderClient`].
pub struct ProviderClientBuilder {
    config: BridgeConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
    caches: Option<SharedCaches>,
    session_id: Option<String>,
    transport: Option<HttpTransport>,
    driver: Option<Box<dyn ProviderDriver>>,
}

impl ProviderClientBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            credentials: None,
            caches: None,
            session_id: None,
            transport: None,
            driver: None,
        }
    }

    /// Use a fixed bearer token.
    pub fn with_static_token(self, token: impl Into<String>) -> Self {
        self.with_credential(Credential::new(token))
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials = Some(Arc::new(StaticCredential(credential)));
        self
    }

    /// Resolve credentials through a token manager (refreshes near expiry).
    pub fn with_token_manager(mut self, manager: Arc<TokenManager>) -> Self {
        self.credentials = Some(manager);
        self
    }

    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Scope the caches to this client (and whoever else holds the handle).
    /// Default: the process-wide instance.
    pub fn with_caches(mut self, caches: SharedCaches) -> Self {
        self.caches = Some(caches);
        self
    }

    /// Default: the process session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the driver selected by `config.provider`.
    pub fn with_driver(mut self, driver: Box<dyn ProviderDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<ProviderClient> {
        self.config.validate()?;
        let credentials = self.credentials.ok_or_else(|| {
            Error::configuration_with_context(
                "no credential source configured",
                ErrorContext::new()
                    .with_field_path("credentials")
                    .with_details("use with_static_token, with_credential or with_token_manager"),
            )
        })?;
        let transport = match self.transport {
            Some(t) => t,
            None => HttpTransport::new(&self.config.transport, &self.config.timeouts)?,
        };
        let caches = match self.caches {
            Some(c) => c,
            None if self.config.signature_cache_capacity == DEFAULT_SIGNATURE_CAPACITY => {
                SharedCaches::global()
            }
            None => SharedCaches::with_capacity(self.config.signature_cache_capacity),
        };
        let driver = self.driver.unwrap_or_else(|| driver_for(self.config.provider));

        Ok(ProviderClient {
            config: self.config,
            driver,
            transport,
            credentials,
            caches,
            session_id: self.session_id.unwrap_or_else(|| process_session_id().to_string()),
        })
    }
}
