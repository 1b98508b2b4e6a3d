//! Process-scoped CSRF state
//!
//! [`CsrfProtection`] owns the signing keys and the revocation store. Build
//! one at startup and hand out the middleware, endpoint, issuer and
//! validator it produces. Without a successfully built instance there is no
//! middleware, so a missing key can never result in unchecked traffic.

use crate::codec::TokenCodec;
use crate::config::CsrfConfig;
use crate::endpoint::TokenEndpoint;
use crate::error::{CsrfError, Result};
use crate::issuer::{IssuedToken, TokenDelivery, TokenIssuer};
use crate::key::{KeyRing, SigningKey};
use crate::middleware::CsrfMiddleware;
use crate::revocation::{MemoryRevocationStore, RevocationStore, RevocationSweeper, SweeperHandle};
use crate::validator::RequestValidator;
use crate::verdict::Verdict;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builder for [`CsrfProtection`]
pub struct CsrfProtectionBuilder {
    config: CsrfConfig,
    key: Option<SigningKey>,
    store: Option<Arc<dyn RevocationStore>>,
}

impl CsrfProtectionBuilder {
    /// Use this key instead of loading `signing_key_source`
    pub fn key(mut self, key: SigningKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Use this revocation store instead of the in-memory default
    pub fn store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and load the signing key.
    ///
    /// # Errors
    ///
    /// `KeyUnavailable` if the key source cannot be read, `Config` if the
    /// configuration is invalid.
    pub fn build(self) -> Result<CsrfProtection> {
        self.config.validate()?;

        let key = match self.key {
            Some(key) => key,
            None => self.config.signing_key_source.load().inspect_err(|e| {
                error!(
                    source = %self.config.signing_key_source.describe(),
                    error = %e,
                    "Failed to load CSRF signing key"
                );
            })?,
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryRevocationStore::new()));
        let config = Arc::new(self.config);
        let keys = Arc::new(KeyRing::new(key, config.grace_period()));
        let codec = TokenCodec::new(keys.clone());

        info!(
            key_id = %keys.snapshot().current().key_id(),
            store = store.store_type(),
            token_ttl = config.token_ttl,
            rotation_enabled = keys.rotation_enabled(),
            "CSRF protection initialized"
        );

        Ok(CsrfProtection {
            issuer: TokenIssuer::new(codec.clone(), config.ttl()),
            validator: RequestValidator::new(codec, store.clone()),
            config,
            keys,
            store,
            sweeper: Mutex::new(None),
        })
    }
}

/// Owner of the signing keys and revocation store
pub struct CsrfProtection {
    config: Arc<CsrfConfig>,
    keys: Arc<KeyRing>,
    store: Arc<dyn RevocationStore>,
    issuer: TokenIssuer,
    validator: RequestValidator,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl CsrfProtection {
    pub fn builder(config: CsrfConfig) -> CsrfProtectionBuilder {
        CsrfProtectionBuilder {
            config,
            key: None,
            store: None,
        }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    pub fn store(&self) -> &Arc<dyn RevocationStore> {
        &self.store
    }

    pub fn issuer(&self) -> TokenIssuer {
        self.issuer.clone()
    }

    pub fn validator(&self) -> RequestValidator {
        self.validator.clone()
    }

    pub fn middleware(&self) -> CsrfMiddleware {
        CsrfMiddleware::new(self.config.clone(), self.validator.clone())
    }

    pub fn token_endpoint(&self) -> TokenEndpoint {
        TokenEndpoint::new(self.config.clone(), self.issuer.clone())
    }

    /// Issue a token with the configured TTL
    pub fn issue(&self, session_id: Option<&str>) -> Result<IssuedToken> {
        self.issuer.issue(session_id, None)
    }

    /// Delivery channels for `token`
    pub fn delivery(&self, token: &IssuedToken, secure_transport: bool) -> TokenDelivery {
        TokenDelivery::new(&self.config, token, secure_transport)
    }

    pub async fn validate(&self, cookie: Option<&str>, header: Option<&str>) -> Verdict {
        self.validator.validate(cookie, header).await
    }

    /// Revoke a presented token until its own expiry (logout).
    ///
    /// Tokens that do not verify cannot be revoked and are returned as
    /// `Rejected(BadSignature)`.
    pub async fn revoke_token(&self, encoded: &str) -> Result<()> {
        let payload = self.validator.codec().decode(encoded)?;
        self.store
            .revoke(payload.token_id(), payload.expires_at)
            .await?;
        debug!(expires_at = %payload.expires_at, "CSRF token revoked");
        Ok(())
    }

    /// Revoke the presented token and issue its replacement
    pub async fn rotate_token(
        &self,
        encoded: &str,
        session_id: Option<&str>,
    ) -> Result<IssuedToken> {
        self.revoke_token(encoded).await?;
        self.issue(session_id)
    }

    /// Reload the key source and rotate to the loaded key.
    ///
    /// If the source cannot be read the current key stays in service and
    /// the error is returned.
    pub fn rotate_key(&self) -> Result<()> {
        if !self.keys.rotation_enabled() {
            return Err(CsrfError::RotationDisabled);
        }

        let key = match self.config.signing_key_source.load() {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    source = %self.config.signing_key_source.describe(),
                    error = %e,
                    "Signing key reload failed; keeping current key"
                );
                return Err(e);
            }
        };

        self.rotate_key_to(key)
    }

    /// Rotate to an explicit key
    pub fn rotate_key_to(&self, key: SigningKey) -> Result<()> {
        self.keys.rotate(key, Utc::now())
    }

    /// Start the background revocation sweep. Must be called from within a
    /// tokio runtime. A second call while running is a no-op.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            warn!("Revocation sweeper already running");
            return;
        }

        *sweeper = Some(
            RevocationSweeper::new(self.store.clone(), self.config.sweep_every()).start(),
        );
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop background work
    pub async fn shutdown(&self) {
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        info!("CSRF protection shut down");
    }
}

impl std::fmt::Debug for CsrfProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfProtection")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("store", &self.store.store_type())
            .finish()
    }
}
