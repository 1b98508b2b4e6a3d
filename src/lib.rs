// Rampart - CSRF protection for async Rust HTTP services
//
// This crate re-exports the request-interception core and the CSRF
// components so applications depend on a single crate.

// Re-export core functionality
pub use rampart_core::*;

// Re-export the CSRF crate under its own name and at the top level
pub use rampart_csrf;
pub use rampart_csrf::{
    CsrfConfig, CsrfError, CsrfMiddleware, CsrfProtection, CsrfProtectionBuilder, IssuedToken,
    MemoryRevocationStore, RejectReason, RequestValidator, RevocationStore, SameSite,
    SecretSource, SigningKey, TokenDelivery, TokenEndpoint, TokenIssuer, Verdict,
};

#[cfg(feature = "redis")]
pub use rampart_csrf::RedisRevocationStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CsrfConfig,
        CsrfMiddleware,
        CsrfProtection,
        Error,
        HttpRequest,
        HttpResponse,
        Middleware,
        MiddlewareChain,
        RejectReason,
        SameSite,
        SecretSource,
        SigningKey,
        TokenEndpoint,
        Verdict,
        handler,
    };
    pub use rampart_core::logging::{LogConfig, LogFormat, LogLevel};
}
