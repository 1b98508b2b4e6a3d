//! # Rampart CSRF Protection
//!
//! Double-submit cookie CSRF protection with signed, expiring and revocable
//! tokens.
//!
//! ## Features
//!
//! - ✅ **Signed Tokens** - HMAC-SHA256 over a JSON payload, constant-time verification
//! - ✅ **Double Submit** - Cookie and header must carry the same token
//! - ✅ **Revocation** - Logout and token rotation, with background sweeping
//! - ✅ **Key Rotation** - Previous key accepted for a configurable grace period
//! - ✅ **Middleware Integration** - Plugs into a `rampart_core::MiddlewareChain`
//! - ✅ **Path Bypass** - Exempt webhooks and other paths from protection
//!
//! ## Quick Start
//!
//! ```rust
//! use rampart_csrf::{CsrfConfig, CsrfProtection, SigningKey};
//!
//! # tokio_test::block_on(async {
//! let csrf = CsrfProtection::builder(CsrfConfig::default())
//!     .key(SigningKey::generate())
//!     .build()
//!     .unwrap();
//!
//! let token = csrf.issue(None).unwrap();
//! let value = Some(token.value.as_str());
//! assert!(csrf.validate(value, value).await.is_accept());
//!
//! // logout
//! csrf.revoke_token(&token.value).await.unwrap();
//! assert!(csrf.validate(value, value).await.is_reject());
//! # });
//! ```
//!
//! In production the key comes from `signing_key_source` (by default the
//! base64 value of `CSRF_SIGNING_KEY`); [`CsrfProtectionBuilder::build`]
//! fails if it cannot be loaded.
//!
//! ## Usage with a middleware chain
//!
//! ```rust
//! use rampart_core::{HttpRequest, HttpResponse, MiddlewareChain, handler};
//! use rampart_csrf::{CsrfConfig, CsrfProtection, SigningKey};
//!
//! # tokio_test::block_on(async {
//! let csrf = CsrfProtection::builder(CsrfConfig::default())
//!     .key(SigningKey::generate())
//!     .build()
//!     .unwrap();
//!
//! let mut chain = MiddlewareChain::new();
//! chain.use_middleware(csrf.middleware());
//!
//! let response = chain
//!     .apply(
//!         HttpRequest::new("POST", "/transfer"),
//!         handler(|_req| async { Ok(HttpResponse::ok()) }),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(response.status, 403);
//! # });
//! ```

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod issuer;
pub mod key;
pub mod middleware;
pub mod protection;
pub mod revocation;
pub mod validator;
pub mod verdict;

pub use codec::{TokenCodec, TokenPayload};
pub use config::{CsrfConfig, SameSite};
pub use endpoint::TokenEndpoint;
pub use error::{CsrfError, Result};
pub use issuer::{IssuedToken, TokenBody, TokenDelivery, TokenIssuer};
pub use key::{KeyRing, SecretSource, SigningKey};
pub use middleware::{CsrfMiddleware, RejectionBody};
pub use protection::{CsrfProtection, CsrfProtectionBuilder};
#[cfg(feature = "redis")]
pub use revocation::RedisRevocationStore;
pub use revocation::{MemoryRevocationStore, RevocationStore, RevocationSweeper, SweeperHandle};
pub use validator::RequestValidator;
pub use verdict::{FailureKind, RejectReason, Verdict};
