//! Double-submit validation
//!
//! Checks run cheapest first: presence, then equality of the two submitted
//! values, then the signature, then expiry, and only then the revocation
//! store.

use crate::codec::TokenCodec;
use crate::revocation::RevocationStore;
use crate::verdict::{RejectReason, Verdict};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, trace};

/// Decides ACCEPT or REJECT for one request's cookie and header tokens
#[derive(Clone)]
pub struct RequestValidator {
    codec: TokenCodec,
    store: Arc<dyn RevocationStore>,
}

impl RequestValidator {
    pub fn new(codec: TokenCodec, store: Arc<dyn RevocationStore>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn RevocationStore> {
        &self.store
    }

    pub async fn validate(&self, cookie: Option<&str>, header: Option<&str>) -> Verdict {
        self.validate_at(cookie, header, Utc::now()).await
    }

    /// Validate as if the current time were `now`. Empty values count as absent.
    pub async fn validate_at(
        &self,
        cookie: Option<&str>,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Verdict {
        let Some(cookie) = cookie.filter(|v| !v.is_empty()) else {
            return Verdict::Reject(RejectReason::MissingCookie);
        };
        let Some(header) = header.filter(|v| !v.is_empty()) else {
            return Verdict::Reject(RejectReason::MissingHeader);
        };

        if !bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
            return Verdict::Reject(RejectReason::Mismatch);
        }

        let payload = match self.codec.decode_at(cookie, now) {
            Ok(payload) => payload,
            Err(reason) => return Verdict::Reject(reason),
        };

        if payload.is_expired_at(now) {
            return Verdict::Reject(RejectReason::Expired);
        }

        match self.store.is_revoked(payload.token_id()).await {
            Ok(false) => {
                trace!(token_id = %payload.token_id(), "CSRF token accepted");
                Verdict::Accept
            }
            Ok(true) => Verdict::Reject(RejectReason::Revoked),
            Err(e) => {
                // fail closed
                error!(
                    error = %e,
                    store = self.store.store_type(),
                    "Revocation lookup failed; rejecting request"
                );
                Verdict::Reject(RejectReason::Revoked)
            }
        }
    }
}

impl std::fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestValidator")
            .field("codec", &self.codec)
            .field("store", &self.store.store_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CsrfError, Result};
    use crate::issuer::TokenIssuer;
    use crate::key::{KeyRing, SigningKey};
    use crate::revocation::MemoryRevocationStore;
    use async_trait::async_trait;
    use chrono::Duration;

    struct Fixture {
        issuer: TokenIssuer,
        validator: RequestValidator,
        store: Arc<MemoryRevocationStore>,
    }

    fn fixture() -> Fixture {
        let key = SigningKey::from_bytes(vec![9; 32]).unwrap();
        let codec = TokenCodec::new(Arc::new(KeyRing::new(key, Duration::zero())));
        let store = Arc::new(MemoryRevocationStore::new());
        Fixture {
            issuer: TokenIssuer::new(codec.clone(), Duration::hours(24)),
            validator: RequestValidator::new(codec, store.clone()),
            store,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RevocationStore for FailingStore {
        async fn revoke(&self, _: &str, _: DateTime<Utc>) -> Result<()> {
            Err(CsrfError::store("unreachable"))
        }
        async fn is_revoked(&self, _: &str) -> Result<bool> {
            Err(CsrfError::store("unreachable"))
        }
        async fn sweep(&self, _: DateTime<Utc>) -> Result<usize> {
            Err(CsrfError::store("unreachable"))
        }
        async fn len(&self) -> Result<usize> {
            Err(CsrfError::store("unreachable"))
        }
        fn store_type(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_matching_pair_accepted() {
        let f = fixture();
        let token = f.issuer.issue(None, None).unwrap();

        let verdict = f
            .validator
            .validate(Some(&token.value), Some(&token.value))
            .await;
        assert_eq!(verdict, Verdict::Accept);
    }

    #[tokio::test]
    async fn test_missing_values() {
        let f = fixture();
        let token = f.issuer.issue(None, None).unwrap();
        let value = token.value.as_str();

        assert_eq!(
            f.validator.validate(None, Some(value)).await,
            Verdict::Reject(RejectReason::MissingCookie)
        );
        assert_eq!(
            f.validator.validate(Some(value), None).await,
            Verdict::Reject(RejectReason::MissingHeader)
        );
        assert_eq!(
            f.validator.validate(Some(""), Some(value)).await,
            Verdict::Reject(RejectReason::MissingCookie)
        );
        assert_eq!(
            f.validator.validate(Some(value), Some("")).await,
            Verdict::Reject(RejectReason::MissingHeader)
        );
        // cookie is checked first
        assert_eq!(
            f.validator.validate(None, None).await,
            Verdict::Reject(RejectReason::MissingCookie)
        );
    }

    #[tokio::test]
    async fn test_two_valid_tokens_mismatch() {
        let f = fixture();
        let a = f.issuer.issue(None, None).unwrap();
        let b = f.issuer.issue(None, None).unwrap();

        assert!(f.validator.validate(Some(&a.value), Some(&a.value)).await.is_accept());
        assert!(f.validator.validate(Some(&b.value), Some(&b.value)).await.is_accept());
        assert_eq!(
            f.validator.validate(Some(&a.value), Some(&b.value)).await,
            Verdict::Reject(RejectReason::Mismatch)
        );
    }

    #[tokio::test]
    async fn test_forged_pair_is_bad_signature() {
        let f = fixture();
        let verdict = f
            .validator
            .validate(Some("forged.value"), Some("forged.value"))
            .await;
        assert_eq!(verdict, Verdict::Reject(RejectReason::BadSignature));
    }

    #[tokio::test]
    async fn test_expiry_monotonicity() {
        let f = fixture();
        let ttl = Duration::seconds(600);
        let token = f.issuer.issue(None, Some(ttl)).unwrap();
        let issued_at = token.payload.issued_at;
        let value = Some(token.value.as_str());

        assert!(
            f.validator
                .validate_at(value, value, issued_at + ttl - Duration::seconds(1))
                .await
                .is_accept()
        );
        assert!(f.validator.validate_at(value, value, issued_at + ttl).await.is_accept());
        assert_eq!(
            f.validator
                .validate_at(value, value, issued_at + ttl + Duration::seconds(1))
                .await,
            Verdict::Reject(RejectReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_revoked_token_rejected() {
        let f = fixture();
        let token = f.issuer.issue(None, None).unwrap();
        let value = Some(token.value.as_str());

        f.store
            .revoke(token.payload.token_id(), token.expires_at())
            .await
            .unwrap();
        assert_eq!(
            f.validator.validate(value, value).await,
            Verdict::Reject(RejectReason::Revoked)
        );

        // a second revoke changes nothing
        f.store
            .revoke(token.payload.token_id(), token.expires_at())
            .await
            .unwrap();
        assert_eq!(
            f.validator.validate(value, value).await,
            Verdict::Reject(RejectReason::Revoked)
        );
    }

    #[tokio::test]
    async fn test_expired_reported_before_revoked() {
        let f = fixture();
        let token = f.issuer.issue(None, Some(Duration::seconds(10))).unwrap();
        let value = Some(token.value.as_str());
        f.store
            .revoke(token.payload.token_id(), token.expires_at())
            .await
            .unwrap();

        assert_eq!(
            f.validator
                .validate_at(value, value, token.expires_at() + Duration::seconds(1))
                .await,
            Verdict::Reject(RejectReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let f = fixture();
        let validator = RequestValidator::new(f.validator.codec().clone(), Arc::new(FailingStore));
        let token = f.issuer.issue(None, None).unwrap();

        assert_eq!(
            validator.validate(Some(&token.value), Some(&token.value)).await,
            Verdict::Reject(RejectReason::Revoked)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_validation() {
        let f = fixture();
        let validator = Arc::new(f.validator);
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let token = f.issuer.issue(None, None).unwrap();
            let validator = validator.clone();
            tasks.push(tokio::spawn(async move {
                validator
                    .validate(Some(&token.value), Some(&token.value))
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), Verdict::Accept);
        }
    }
}
