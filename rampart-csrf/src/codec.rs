//! Token payloads and their signed wire form
//!
//! An encoded token is `base64url(json) "." base64url(hmac)`, unpadded, so it
//! is safe as both a cookie value and a header value. The MAC is
//! HMAC-SHA256 over the exact JSON bytes.

use crate::error::Result;
use crate::key::{KeyRing, SigningKey};
use crate::verdict::RejectReason;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::trace;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '.';

/// HMAC-SHA256 output length in bytes
const MAC_LEN: usize = 32;

/// Signed contents of a CSRF token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPayload {
    /// Random nonce, base64url of 32 bytes; doubles as the token identifier
    pub nonce: String,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// Optional caller/session binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TokenPayload {
    /// Identifier used by the revocation store
    pub fn token_id(&self) -> &str {
        &self.nonce
    }

    /// A token is still valid at exactly `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Signs and verifies tokens with the process key ring. Stateless apart from
/// the shared keys.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: Arc<KeyRing>,
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyRing>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Serialize and sign a payload with the current key
    pub fn encode(&self, payload: &TokenPayload) -> Result<String> {
        let json = serde_json::to_vec(payload)?;
        let keys = self.keys.snapshot();
        let signature = sign(keys.current(), &json).finalize().into_bytes();

        Ok(format!(
            "{}{}{}",
            URL_SAFE_NO_PAD.encode(&json),
            SEPARATOR,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify and decode a token using the clock for the key grace window
    pub fn decode(&self, encoded: &str) -> std::result::Result<TokenPayload, RejectReason> {
        self.decode_at(encoded, Utc::now())
    }

    /// Verify and decode a token.
    ///
    /// Every failure, structural or cryptographic, is reported as
    /// [`RejectReason::BadSignature`]. Expiry is not checked here.
    pub fn decode_at(
        &self,
        encoded: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<TokenPayload, RejectReason> {
        let (payload_part, signature_part) =
            split_token(encoded).ok_or(RejectReason::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| RejectReason::BadSignature)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|_| RejectReason::BadSignature)?;
        if signature.len() != MAC_LEN {
            return Err(RejectReason::BadSignature);
        }

        let keys = self.keys.snapshot();
        let verified = keys
            .verification_keys(now)
            .any(|key| sign(key, &json).verify_slice(&signature).is_ok());
        if !verified {
            trace!("CSRF token signature did not verify");
            return Err(RejectReason::BadSignature);
        }

        serde_json::from_slice(&json).map_err(|_| RejectReason::BadSignature)
    }
}

/// Exactly two non-empty segments
fn split_token(encoded: &str) -> Option<(&str, &str)> {
    let (payload, signature) = encoded.split_once(SEPARATOR)?;
    if payload.is_empty() || signature.is_empty() || signature.contains(SEPARATOR) {
        return None;
    }
    Some((payload, signature))
}

fn sign(key: &SigningKey, data: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    mac
}
