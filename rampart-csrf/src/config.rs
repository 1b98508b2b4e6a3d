use crate::error::{CsrfError, Result};
use crate::key::SecretSource;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CSRF_";

/// CSRF protection configuration
///
/// Durations are whole seconds. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Token time-to-live in seconds
    pub token_ttl: i64,

    /// Cookie name for CSRF token
    pub cookie_name: String,

    /// Header name for CSRF token
    pub header_name: String,

    /// Cookie domain
    pub cookie_domain: Option<String>,

    /// Cookie path
    pub cookie_path: String,

    /// Always mark the cookie `Secure`. HTTPS requests get it regardless.
    pub cookie_secure: bool,

    /// Cookie SameSite policy
    pub cookie_same_site: SameSite,

    /// Safe HTTP methods (never validated)
    pub safe_methods: Vec<String>,

    /// Path patterns exempt from validation
    pub bypass_paths: Vec<String>,

    /// Path of the token issuance endpoint (always exempt)
    pub token_path: String,

    /// Request header whose value is bound into issued tokens as the session id
    pub session_header: Option<String>,

    /// Where the signing key is loaded from
    pub signing_key_source: SecretSource,

    /// Seconds the previous key keeps verifying after a rotation; 0 disables rotation
    pub rotation_grace_period: i64,

    /// Seconds between revocation store sweeps
    pub sweep_interval: u64,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    #[serde(alias = "strict")]
    Strict,
    #[serde(alias = "lax")]
    Lax,
    #[serde(alias = "none")]
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl: 86_400, // 24 hours
            cookie_name: "csrf_token".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            cookie_domain: None,
            cookie_path: "/".to_string(),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
                "TRACE".to_string(),
            ],
            bypass_paths: Vec::new(),
            token_path: "/csrf-token".to_string(),
            session_header: None,
            signing_key_source: SecretSource::default(),
            rotation_grace_period: 0,
            sweep_interval: 60,
        }
    }
}

impl CsrfConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CsrfError::config(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading CSRF configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            CsrfError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by `CSRF_*` environment variables, after loading a
    /// `.env` file if one exists
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CSRF_*` overrides from an iterator of variables. Unknown names
    /// are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match name {
                "TOKEN_TTL" => self.token_ttl = parse_number(&key, &value)?,
                "COOKIE_NAME" => self.cookie_name = value,
                "HEADER_NAME" => self.header_name = value,
                "COOKIE_DOMAIN" => self.cookie_domain = Some(value),
                "COOKIE_PATH" => self.cookie_path = value,
                "COOKIE_SECURE" => self.cookie_secure = parse_bool(&key, &value)?,
                "COOKIE_SAME_SITE" => {
                    self.cookie_same_site = SameSite::parse(&value).ok_or_else(|| {
                        CsrfError::config(format!("{} must be Strict, Lax or None", key))
                    })?
                }
                "BYPASS_PATHS" => {
                    self.bypass_paths = value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                "TOKEN_PATH" => self.token_path = value,
                "SESSION_HEADER" => self.session_header = Some(value),
                "SIGNING_KEY_ENV" => self.signing_key_source = SecretSource::env(value),
                "SIGNING_KEY_FILE" => self.signing_key_source = SecretSource::file(value),
                "ROTATION_GRACE_PERIOD" => {
                    self.rotation_grace_period = parse_number(&key, &value)?
                }
                "SWEEP_INTERVAL" => self.sweep_interval = parse_number(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Check the configuration for values that would weaken or break protection
    pub fn validate(&self) -> Result<()> {
        if self.token_ttl <= 0 {
            return Err(CsrfError::config("token_ttl must be positive"));
        }
        if self.rotation_grace_period < 0 {
            return Err(CsrfError::config("rotation_grace_period cannot be negative"));
        }
        check_span("token_ttl", self.token_ttl)?;
        check_span("rotation_grace_period", self.rotation_grace_period)?;
        if self.sweep_interval == 0 {
            return Err(CsrfError::config("sweep_interval must be positive"));
        }
        if self.cookie_name.is_empty() || self.cookie_name.contains([';', '=', ' ', ',']) {
            return Err(CsrfError::config("cookie_name is not a valid cookie name"));
        }
        if self.header_name.is_empty()
            || !self
                .header_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CsrfError::config("header_name is not a valid header name"));
        }
        if !self.token_path.starts_with('/') {
            return Err(CsrfError::config("token_path must start with '/'"));
        }
        if self.cookie_same_site == SameSite::None && !self.cookie_secure {
            return Err(CsrfError::config(
                "SameSite=None requires cookie_secure = true",
            ));
        }
        Ok(())
    }

    /// Token TTL. Out-of-range values yield zero, which the issuer refuses.
    pub fn ttl(&self) -> Duration {
        Duration::try_seconds(self.token_ttl).unwrap_or_else(Duration::zero)
    }

    /// Rotation grace period. Out-of-range values yield zero (rotation disabled).
    pub fn grace_period(&self) -> Duration {
        Duration::try_seconds(self.rotation_grace_period).unwrap_or_else(Duration::zero)
    }

    pub fn sweep_every(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval)
    }

    /// Set token TTL
    pub fn with_token_ttl(mut self, ttl_seconds: i64) -> Self {
        self.token_ttl = ttl_seconds;
        self
    }

    /// Set cookie name
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set cookie domain
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set cookie secure flag
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// Replace safe methods
    pub fn with_safe_methods(mut self, methods: Vec<String>) -> Self {
        self.safe_methods = methods;
        self
    }

    /// Replace bypass path patterns
    pub fn with_bypass_paths(mut self, paths: Vec<String>) -> Self {
        self.bypass_paths = paths;
        self
    }

    /// Set the issuance endpoint path
    pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Bind issued tokens to the value of this request header
    pub fn with_session_header(mut self, header: impl Into<String>) -> Self {
        self.session_header = Some(header.into());
        self
    }

    /// Set the signing key source
    pub fn with_signing_key_source(mut self, source: SecretSource) -> Self {
        self.signing_key_source = source;
        self
    }

    /// Set the rotation grace period in seconds
    pub fn with_rotation_grace_period(mut self, seconds: i64) -> Self {
        self.rotation_grace_period = seconds;
        self
    }

    /// Set the sweep interval in seconds
    pub fn with_sweep_interval(mut self, seconds: u64) -> Self {
        self.sweep_interval = seconds;
        self
    }
}

/// A span in seconds must be representable and must not push the current
/// time out of range.
fn check_span(name: &str, seconds: i64) -> Result<()> {
    Duration::try_seconds(seconds)
        .and_then(|span| Utc::now().checked_add_signed(span))
        .map(|_| ())
        .ok_or_else(|| CsrfError::config(format!("{} is out of range", name)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CsrfError::config(format!("{} must be a number", key)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CsrfError::config(format!("{} must be a boolean", key))),
    }
}
