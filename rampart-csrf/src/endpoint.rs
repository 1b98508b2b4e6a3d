//! Token issuance endpoint

use crate::config::CsrfConfig;
use crate::issuer::{IssuedToken, TokenDelivery, TokenIssuer};
use rampart_core::{Error, HandlerFn, HttpRequest, HttpResponse, handler};
use std::sync::Arc;
use tracing::debug;

/// Handler for the token path. Needs no prior token, and every call issues
/// a fresh one.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    config: Arc<CsrfConfig>,
    issuer: TokenIssuer,
}

impl TokenEndpoint {
    pub fn new(config: Arc<CsrfConfig>, issuer: TokenIssuer) -> Self {
        Self { config, issuer }
    }

    pub fn path(&self) -> &str {
        &self.config.token_path
    }

    /// Issue a token for `request`, binding the session header value if one
    /// is configured and present
    pub fn issue_for(&self, request: &HttpRequest) -> crate::Result<IssuedToken> {
        let session_id = self
            .config
            .session_header
            .as_deref()
            .and_then(|name| request.header(name))
            .filter(|value| !value.is_empty());

        self.issuer.issue(session_id, None)
    }

    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let token = self.issue_for(&request)?;
        debug!(
            path = %request.path,
            secure = request.is_secure(),
            "Serving CSRF token"
        );

        let delivery = TokenDelivery::new(&self.config, &token, request.is_secure());
        Ok(delivery.apply(HttpResponse::ok())?)
    }

    /// Wrap as a [`HandlerFn`] for routing
    pub fn into_handler(self) -> HandlerFn {
        let endpoint = Arc::new(self);
        handler(move |req| {
            let endpoint = endpoint.clone();
            async move { endpoint.handle(req).await }
        })
    }
}
