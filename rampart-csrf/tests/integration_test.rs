//! Integration tests for rampart-csrf

use chrono::Duration;
use rampart_core::{HttpRequest, HttpResponse, MiddlewareChain, handler};
use rampart_csrf::*;
use std::sync::Arc;

fn protection(config: CsrfConfig) -> CsrfProtection {
    CsrfProtection::builder(config)
        .key(SigningKey::generate())
        .build()
        .unwrap()
}

#[test]
fn test_csrf_config_builder() {
    let config = CsrfConfig::default()
        .with_token_ttl(7200)
        .with_cookie_name("_csrf")
        .with_header_name("X-XSRF-TOKEN")
        .with_cookie_secure(true)
        .with_cookie_same_site(SameSite::Strict);

    assert_eq!(config.token_ttl, 7200);
    assert_eq!(config.cookie_name, "_csrf");
    assert_eq!(config.header_name, "X-XSRF-TOKEN");
    assert!(config.cookie_secure);
    assert_eq!(config.cookie_same_site, SameSite::Strict);
    assert!(config.validate().is_ok());
}

#[test]
fn test_token_with_session() {
    let csrf = protection(CsrfConfig::default());
    let token = csrf.issue(Some("session123")).unwrap();

    assert_eq!(token.payload.session_id.as_deref(), Some("session123"));
    assert_eq!(token.ttl_seconds(), 86_400);
}

#[tokio::test]
async fn test_scenario() {
    let csrf = protection(CsrfConfig::default());
    let validator = csrf.validator();

    // issue, then accept identical cookie and header
    let first = csrf.issue(None).unwrap();
    let v = Some(first.value.as_str());
    assert_eq!(validator.validate(v, v).await, Verdict::Accept);

    // revoke, then reject
    csrf.revoke_token(&first.value).await.unwrap();
    assert_eq!(
        validator.validate(v, v).await,
        Verdict::Reject(RejectReason::Revoked)
    );

    // a fresh token past its TTL
    let second = csrf
        .issuer()
        .issue(None, Some(Duration::seconds(30)))
        .unwrap();
    let v = Some(second.value.as_str());
    assert_eq!(
        validator
            .validate_at(v, v, second.expires_at() + Duration::seconds(1))
            .await,
        Verdict::Reject(RejectReason::Expired)
    );

    // two valid tokens from separate calls
    let x = csrf.issue(None).unwrap();
    let y = csrf.issue(None).unwrap();
    assert_eq!(
        validator
            .validate(Some(y.value.as_str()), Some(x.value.as_str()))
            .await,
        Verdict::Reject(RejectReason::Mismatch)
    );
}

#[tokio::test]
async fn test_endpoint_then_protected_request() {
    let csrf = protection(CsrfConfig::default());
    let endpoint = csrf.token_endpoint().into_handler();

    let mut chain = MiddlewareChain::new();
    chain.use_middleware(csrf.middleware());

    // obtaining the first token needs no token
    let issued = chain
        .apply(HttpRequest::new("POST", "/csrf-token"), endpoint)
        .await
        .unwrap();
    assert_eq!(issued.status, 200);
    let value = issued.header("X-CSRF-Token").unwrap().to_string();

    let request = HttpRequest::new("POST", "/orders")
        .with_header("Cookie", format!("csrf_token={}", value))
        .with_header("X-CSRF-Token", value);
    let response = chain
        .apply(
            request,
            handler(|_req| async { Ok(HttpResponse::new(201)) }),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_tokens_from_another_key_rejected() {
    let ours = protection(CsrfConfig::default());
    let theirs = protection(CsrfConfig::default());

    let foreign = theirs.issue(None).unwrap();
    let v = Some(foreign.value.as_str());
    assert_eq!(
        ours.validate(v, v).await,
        Verdict::Reject(RejectReason::BadSignature)
    );
}

#[tokio::test]
async fn test_custom_store_is_used() {
    let store = Arc::new(MemoryRevocationStore::new());
    let csrf = CsrfProtection::builder(CsrfConfig::default())
        .key(SigningKey::generate())
        .store(store.clone())
        .build()
        .unwrap();

    let token = csrf.issue(None).unwrap();
    csrf.revoke_token(&token.value).await.unwrap();

    assert!(store.is_revoked(token.payload.token_id()).await.unwrap());
    assert_eq!(store.expiry_of(token.payload.token_id()), Some(token.expires_at()));
}

#[tokio::test]
async fn test_rejection_maps_to_framework_error() {
    let csrf = protection(CsrfConfig::default());
    let err = csrf.revoke_token("garbage").await.unwrap_err();
    let framework: rampart_core::Error = err.into();
    assert_eq!(framework.status_code(), 403);
}
