//! Signing keys and key rotation
//!
//! One [`KeyRing`] exists per process. It is built at startup from a
//! [`SecretSource`] and shared by the codec for every request. Rotation swaps
//! in a whole new [`KeySet`], so readers see either the old set or the new
//! one and never a mix.

use crate::error::{CsrfError, Result};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum signing key length in bytes
pub const MIN_KEY_LEN: usize = 32;

/// Environment variable read by the default [`SecretSource`]
pub const DEFAULT_KEY_ENV: &str = "CSRF_SIGNING_KEY";

/// Secret key for HMAC-SHA256 token signatures
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// Wrap raw key bytes. Keys shorter than [`MIN_KEY_LEN`] are refused.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_KEY_LEN {
            return Err(CsrfError::key_unavailable(format!(
                "signing key must be at least {} bytes, got {}",
                MIN_KEY_LEN,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Decode a base64 (standard or URL-safe) encoded key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = STANDARD
            .decode(encoded)
            .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
            .map_err(|_| CsrfError::key_unavailable("signing key is not valid base64"))?;
        Self::from_bytes(bytes)
    }

    /// Generate a random 256-bit key
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Short public identifier for logs (SHA-256 prefix, not the key)
    pub fn key_id(&self) -> String {
        Sha256::digest(&self.bytes)
            .iter()
            .take(4)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id())
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where the signing key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretSource {
    /// Base64 key in an environment variable
    Env { var: String },
    /// Base64 key in a file, surrounding whitespace ignored
    File { path: PathBuf },
    /// Base64 key given directly; meant for tests
    Inline { value: String },
}

impl SecretSource {
    pub fn env(var: impl Into<String>) -> Self {
        Self::Env { var: var.into() }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn inline(value: impl Into<String>) -> Self {
        Self::Inline { value: value.into() }
    }

    /// Human-readable description, safe to log
    pub fn describe(&self) -> String {
        match self {
            Self::Env { var } => format!("env:{}", var),
            Self::File { path } => format!("file:{}", path.display()),
            Self::Inline { .. } => "inline".to_string(),
        }
    }

    /// Load and decode the key
    pub fn load(&self) -> Result<SigningKey> {
        debug!(source = %self.describe(), "Loading CSRF signing key");

        let encoded = match self {
            Self::Env { var } => std::env::var(var).map_err(|_| {
                CsrfError::key_unavailable(format!("environment variable {} is not set", var))
            })?,
            Self::File { path } => std::fs::read_to_string(path).map_err(|e| {
                CsrfError::key_unavailable(format!("cannot read {}: {}", path.display(), e))
            })?,
            Self::Inline { value } => value.clone(),
        };

        SigningKey::from_base64(&encoded).map_err(|e| match e {
            CsrfError::KeyUnavailable(msg) => {
                CsrfError::key_unavailable(format!("{} ({})", msg, self.describe()))
            }
            other => other,
        })
    }
}

impl Default for SecretSource {
    fn default() -> Self {
        Self::env(DEFAULT_KEY_ENV)
    }
}

#[derive(Debug)]
struct RetiredKey {
    key: Arc<SigningKey>,
    valid_until: DateTime<Utc>,
}

/// Immutable snapshot of the keys in use
#[derive(Debug)]
pub struct KeySet {
    current: Arc<SigningKey>,
    previous: Option<RetiredKey>,
}

impl KeySet {
    /// Key used to sign new tokens
    pub fn current(&self) -> &SigningKey {
        &self.current
    }

    /// Keys accepted for verification at `now`: the current key, then the
    /// previous one while its grace window is open.
    pub fn verification_keys(&self, now: DateTime<Utc>) -> impl Iterator<Item = &SigningKey> {
        let previous = self
            .previous
            .as_ref()
            .filter(|retired| now <= retired.valid_until)
            .map(|retired| retired.key.as_ref());

        std::iter::once(self.current.as_ref()).chain(previous)
    }

    /// End of the previous key's grace window, if one exists
    pub fn previous_valid_until(&self) -> Option<DateTime<Utc>> {
        self.previous.as_ref().map(|retired| retired.valid_until)
    }
}

/// Process-wide holder of the signing keys
#[derive(Debug)]
pub struct KeyRing {
    keys: RwLock<Arc<KeySet>>,
    grace_period: Duration,
}

impl KeyRing {
    /// Create a ring with a single key. A zero grace period disables rotation.
    pub fn new(key: SigningKey, grace_period: Duration) -> Self {
        info!(key_id = %key.key_id(), "CSRF signing key installed");
        Self {
            keys: RwLock::new(Arc::new(KeySet {
                current: Arc::new(key),
                previous: None,
            })),
            grace_period,
        }
    }

    /// Current key set; the lock is held only long enough to clone the `Arc`
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.keys.read().clone()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn rotation_enabled(&self) -> bool {
        self.grace_period > Duration::zero()
    }

    /// Replace the signing key. The outgoing key keeps verifying tokens until
    /// `now + grace_period`; any older retired key is dropped.
    pub fn rotate(&self, new_key: SigningKey, now: DateTime<Utc>) -> Result<()> {
        if !self.rotation_enabled() {
            return Err(CsrfError::RotationDisabled);
        }

        let valid_until = now
            .checked_add_signed(self.grace_period)
            .ok_or_else(|| CsrfError::config("rotation grace period out of range"))?;

        let new_id = new_key.key_id();
        let mut guard = self.keys.write();
        let retired = RetiredKey {
            key: guard.current.clone(),
            valid_until,
        };
        let old_id = retired.key.key_id();

        *guard = Arc::new(KeySet {
            current: Arc::new(new_key),
            previous: Some(retired),
        });
        drop(guard);

        info!(
            old_key_id = %old_id,
            new_key_id = %new_id,
            grace_until = %valid_until,
            "CSRF signing key rotated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_bytes(vec![byte; 32]).unwrap()
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(SigningKey::from_bytes(vec![1, 2, 3]).is_err());
        assert!(SigningKey::from_bytes(vec![0; 31]).is_err());
        assert!(SigningKey::from_bytes(vec![0; 32]).is_ok());
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = SigningKey::generate();
        let b = SigningKey::generate();
        assert_eq!(a.as_bytes().len(), MIN_KEY_LEN);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = key(0xAB);
        let debug = format!("{:?}", key);
        assert!(debug.contains("key_id"));
        assert!(!debug.contains(&format!("{:?}", key.as_bytes())));
        assert!(!debug.contains(&STANDARD.encode(key.as_bytes())));
    }

    #[test]
    fn test_base64_variants() {
        let raw = [7u8; 32];
        let standard = STANDARD.encode(raw);
        let url_safe = URL_SAFE_NO_PAD.encode(raw);

        assert_eq!(SigningKey::from_base64(&standard).unwrap().as_bytes(), &raw);
        assert_eq!(SigningKey::from_base64(&url_safe).unwrap().as_bytes(), &raw);
        assert!(SigningKey::from_base64("not base64 at all!").is_err());
    }

    #[test]
    fn test_inline_source() {
        let source = SecretSource::inline(STANDARD.encode([9u8; 48]));
        let key = source.load().unwrap();
        assert_eq!(key.as_bytes().len(), 48);
        assert_eq!(source.describe(), "inline");
    }

    #[test]
    fn test_missing_env_source() {
        let source = SecretSource::env("RAMPART_TEST_KEY_THAT_DOES_NOT_EXIST_91823");
        let err = source.load().unwrap_err();
        assert!(matches!(err, CsrfError::KeyUnavailable(_)));
        assert!(err.to_string().contains("RAMPART_TEST_KEY_THAT_DOES_NOT_EXIST_91823"));
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("rampart-key-{}.b64", std::process::id()));
        std::fs::write(&path, format!("{}\n", STANDARD.encode([3u8; 32]))).unwrap();

        let key = SecretSource::file(&path).load().unwrap();
        assert_eq!(key.as_bytes(), &[3u8; 32]);

        std::fs::remove_file(&path).unwrap();
        assert!(SecretSource::file(&path).load().is_err());
    }

    #[test]
    fn test_source_deserialize() {
        let source: SecretSource =
            serde_json::from_str(r#"{"type":"file","path":"/run/secrets/csrf"}"#).unwrap();
        assert_eq!(source, SecretSource::file("/run/secrets/csrf"));
        assert_eq!(SecretSource::default(), SecretSource::env(DEFAULT_KEY_ENV));
    }

    #[test]
    fn test_rotation_disabled_by_default() {
        let ring = KeyRing::new(key(1), Duration::zero());
        assert!(!ring.rotation_enabled());
        assert!(matches!(
            ring.rotate(key(2), Utc::now()),
            Err(CsrfError::RotationDisabled)
        ));
        assert_eq!(ring.snapshot().current().as_bytes(), &[1u8; 32]);
    }

    #[test]
    fn test_rotation_grace_window() {
        let ring = KeyRing::new(key(1), Duration::seconds(300));
        let now = Utc::now();
        ring.rotate(key(2), now).unwrap();

        let keys = ring.snapshot();
        assert_eq!(keys.current().as_bytes(), &[2u8; 32]);

        let inside: Vec<_> = keys.verification_keys(now + Duration::seconds(300)).collect();
        assert_eq!(inside.len(), 2);
        assert_eq!(inside[1].as_bytes(), &[1u8; 32]);

        let after: Vec<_> = keys.verification_keys(now + Duration::seconds(301)).collect();
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn test_second_rotation_drops_oldest_key() {
        let ring = KeyRing::new(key(1), Duration::seconds(60));
        let now = Utc::now();
        ring.rotate(key(2), now).unwrap();
        ring.rotate(key(3), now).unwrap();

        let keys = ring.snapshot();
        let accepted: Vec<_> = keys
            .verification_keys(now)
            .map(|k| k.as_bytes()[0])
            .collect();
        assert_eq!(accepted, vec![3, 2]);
    }

    #[test]
    fn test_snapshot_survives_rotation() {
        let ring = KeyRing::new(key(1), Duration::seconds(60));
        let before = ring.snapshot();
        ring.rotate(key(2), Utc::now()).unwrap();

        assert_eq!(before.current().as_bytes(), &[1u8; 32]);
        assert_eq!(ring.snapshot().current().as_bytes(), &[2u8; 32]);
    }

    #[test]
    fn test_rotation_past_max_date_keeps_current_key() {
        let ring = KeyRing::new(key(1), Duration::days(365));
        let err = ring.rotate(key(2), DateTime::<Utc>::MAX_UTC).unwrap_err();

        assert!(matches!(err, CsrfError::Config(_)));
        assert_eq!(ring.snapshot().current().as_bytes(), &[1u8; 32]);
    }
}
