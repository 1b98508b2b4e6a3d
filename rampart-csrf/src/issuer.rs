//! Token issuance and delivery

use crate::codec::{TokenCodec, TokenPayload};
use crate::config::CsrfConfig;
use crate::error::{CsrfError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rampart_core::HttpResponse;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, trace};

/// Nonce size in bytes (256 bits of entropy)
pub const NONCE_LEN: usize = 32;

/// A freshly issued token: the signed wire value plus what it encodes
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub payload: TokenPayload,
}

impl IssuedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.payload.expires_at
    }

    /// Lifetime in whole seconds, used for the cookie `Max-Age`
    pub fn ttl_seconds(&self) -> i64 {
        (self.payload.expires_at - self.payload.issued_at).num_seconds()
    }
}

/// Creates signed tokens. Has no side effects beyond drawing randomness.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    codec: TokenCodec,
    default_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(codec: TokenCodec, default_ttl: Duration) -> Self {
        Self { codec, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token valid from now
    pub fn issue(&self, session_id: Option<&str>, ttl: Option<Duration>) -> Result<IssuedToken> {
        self.issue_at(session_id, ttl, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// `now` is truncated to whole seconds, the precision of the wire format.
    pub fn issue_at(
        &self,
        session_id: Option<&str>,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl <= Duration::zero() {
            return Err(CsrfError::config("token TTL must be positive"));
        }

        let issued_at = DateTime::from_timestamp(now.timestamp(), 0)
            .ok_or_else(|| CsrfError::config("issue time out of range"))?;
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| CsrfError::config("token TTL out of range"))?;

        let payload = TokenPayload {
            nonce: generate_nonce(),
            issued_at,
            expires_at,
            session_id: session_id.map(str::to_string),
        };
        let value = self.codec.encode(&payload)?;

        debug!(
            expires_at = %payload.expires_at,
            session_bound = payload.session_id.is_some(),
            "Issued CSRF token"
        );
        trace!(token_id = %payload.nonce, "Issued CSRF token id");

        Ok(IssuedToken { value, payload })
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// JSON body returned by the issuance endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TokenBody {
    pub csrf_token: String,
    pub header_name: String,
    pub expires_at: DateTime<Utc>,
}

/// How one issued token reaches the client: as a cookie, a response header
/// and a body field, all carrying the same value.
#[derive(Debug, Clone)]
pub struct TokenDelivery {
    pub set_cookie: String,
    pub header_name: String,
    pub header_value: String,
    pub body: TokenBody,
}

impl TokenDelivery {
    /// Describe delivery of `token`. `secure_transport` adds `Secure` to the
    /// cookie even if the configuration does not force it.
    pub fn new(config: &CsrfConfig, token: &IssuedToken, secure_transport: bool) -> Self {
        Self {
            set_cookie: build_cookie(config, token, config.cookie_secure || secure_transport),
            header_name: config.header_name.clone(),
            header_value: token.value.clone(),
            body: TokenBody {
                csrf_token: token.value.clone(),
                header_name: config.header_name.clone(),
                expires_at: token.expires_at(),
            },
        }
    }

    /// Write all three channels onto a response
    pub fn apply(self, response: HttpResponse) -> Result<HttpResponse> {
        let response = response
            .with_json(&self.body)
            .map_err(|e| CsrfError::config(e.to_string()))?;

        Ok(response
            .with_header("Set-Cookie", self.set_cookie)
            .with_header(self.header_name, self.header_value)
            .with_header("Cache-Control", "no-store"))
    }
}

fn build_cookie(config: &CsrfConfig, token: &IssuedToken, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}",
        config.cookie_name,
        token.value,
        config.cookie_path,
        token.ttl_seconds()
    );

    if let Some(ref domain) = config.cookie_domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }

    if secure {
        cookie.push_str("; Secure");
    }

    cookie.push_str("; HttpOnly");
    cookie.push_str(&format!("; SameSite={}", config.cookie_same_site.as_str()));

    cookie
}
