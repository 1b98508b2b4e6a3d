//! In-memory revocation store
//!
//! Backed by DashMap, so lookups and revocations on different tokens only
//! contend when they land on the same shard.

use crate::error::Result;
use crate::revocation::RevocationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

/// In-memory revocation store
pub struct MemoryRevocationStore {
    /// Token id -> expiry of the revoked token
    entries: DashMap<String, DateTime<Utc>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        debug!("Creating in-memory revocation store");
        Self {
            entries: DashMap::new(),
        }
    }

    /// Recorded expiry for a revoked token
    pub fn expiry_of(&self, token_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(token_id).map(|entry| *entry)
    }
}

impl Default for MemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        // first expiry wins
        self.entries
            .entry(token_id.to_string())
            .or_insert(expires_at);
        trace!(token_id = %token_id, "Revoked CSRF token");
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool> {
        Ok(self.entries.contains_key(token_id))
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        self.entries.retain(|_, expires_at| {
            let keep = *expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed = removed, remaining = self.entries.len(), "Swept revocation entries");
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
