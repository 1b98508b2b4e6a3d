//! Redis revocation store
//!
//! Shares revocations across application instances. Each entry is a key
//! set to expire just after the token itself, so Redis drops entries on its
//! own. `SET .. EXAT` needs Redis 6.2 or later. Requires the `redis` feature.

use crate::error::Result;
use crate::revocation::{RevocationStore, entry_deadline};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

/// Redis-backed revocation store
pub struct RedisRevocationStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRevocationStore {
    /// Connect to Redis
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn new(url: &str) -> Result<Self> {
        debug!(url = %url, "Connecting to Redis for CSRF revocation");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: "csrf:revoked".to_string(),
        })
    }

    /// Connect with a custom key prefix
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let mut store = Self::new(url).await?;
        store.prefix = prefix.into();
        Ok(store)
    }

    fn key(&self, token_id: &str) -> String {
        format!("{}:{}", self.prefix, token_id)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let deadline = entry_deadline(expires_at);

        let mut conn = self.conn.clone();
        // NX keeps the first recorded expiry; EXAT is absolute so the entry
        // cannot lapse before the token does
        let _: redis::Value = redis::cmd("SET")
            .arg(self.key(token_id))
            .arg(expires_at.timestamp())
            .arg("EXAT")
            .arg(deadline)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        trace!(token_id = %token_id, deadline = deadline, "Revoked CSRF token in Redis");
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.key(token_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize> {
        // keys carry their own TTL
        Ok(0)
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        let mut count = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            count += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(count)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
