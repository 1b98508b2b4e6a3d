use crate::config::CsrfConfig;
use crate::validator::RequestValidator;
use crate::verdict::{RejectReason, Verdict};
use rampart_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use serde::Serialize;
use std::sync::Arc;
use tracing::{trace, warn};

/// Message shared by every rejection, whatever the reason
pub const REJECTION_MESSAGE: &str = "CSRF validation failed. Obtain a fresh token and retry.";

/// Body of a 403 rejection
#[derive(Debug, Clone, Serialize)]
pub struct RejectionBody {
    pub error: &'static str,
    pub reason: RejectReason,
    pub message: &'static str,
}

impl From<RejectReason> for RejectionBody {
    fn from(reason: RejectReason) -> Self {
        Self {
            error: "csrf_validation_failed",
            reason,
            message: REJECTION_MESSAGE,
        }
    }
}

/// CSRF protection middleware
///
/// Safe methods and bypassed paths pass straight through. Every other
/// request must carry the same token in the cookie and the header, or it is
/// answered with a 403 and never reaches the handler.
#[derive(Clone)]
pub struct CsrfMiddleware {
    config: Arc<CsrfConfig>,
    validator: RequestValidator,
}

impl CsrfMiddleware {
    pub fn new(config: Arc<CsrfConfig>, validator: RequestValidator) -> Self {
        Self { config, validator }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Check if request needs CSRF protection
    pub fn needs_protection(&self, request: &HttpRequest) -> bool {
        if self
            .config
            .safe_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.method))
        {
            return false;
        }

        let path = request
            .path
            .split_once('?')
            .map_or(request.path.as_str(), |(path, _)| path);

        if is_token_path(&self.config.token_path, path) {
            return false;
        }

        !self
            .config
            .bypass_paths
            .iter()
            .any(|pattern| path_matches(pattern, path))
    }

    /// Validate the request's cookie and header tokens
    pub async fn check(&self, request: &HttpRequest) -> Verdict {
        let cookie = request.cookie(&self.config.cookie_name);
        let header = request.header(&self.config.header_name);
        self.validator.validate(cookie, header).await
    }

    /// 403 response for a rejected request
    pub fn rejection_response(reason: RejectReason) -> Result<HttpResponse, Error> {
        Ok(HttpResponse::forbidden()
            .with_json(&RejectionBody::from(reason))?
            .with_header("Cache-Control", "no-store"))
    }
}

/// The issuance endpoint itself, with at most a trailing `/`; never anything
/// below it
fn is_token_path(token_path: &str, path: &str) -> bool {
    let token_path = token_path.trim_end_matches('/');
    path == token_path || path.strip_suffix('/') == Some(token_path)
}

/// Exact path, whole-segment prefix, or trailing `*` wildcard
fn path_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }

    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() {
        return path == "/";
    }

    path == pattern
        || path
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait::async_trait]
impl Middleware for CsrfMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        if !self.needs_protection(&req) {
            trace!(method = %req.method, path = %req.path, "CSRF check bypassed");
            return next(req).await;
        }

        match self.check(&req).await {
            Verdict::Accept => next(req).await,
            Verdict::Reject(reason) => {
                warn!(
                    reason = %reason,
                    kind = reason.kind().as_str(),
                    method = %req.method,
                    path = %req.path,
                    "CSRF validation failed"
                );
                Self::rejection_response(reason)
            }
        }
    }
}
