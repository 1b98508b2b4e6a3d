//! Revocation storage backends
//!
//! A revoked token stays rejected until its own expiry, after which the
//! entry is dead weight and a sweep may drop it.
//!
//! - **Memory**: in-process map using DashMap (default, single instance)
//! - **Redis**: shared store for multi-instance deployments (`redis` feature)

mod memory;
#[cfg(feature = "redis")]
mod redis;
mod sweeper;

pub use memory::MemoryRevocationStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisRevocationStore;
pub use sweeper::{RevocationSweeper, SweeperHandle};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage for tokens that must be rejected before their natural expiry
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `token_id` as revoked until `expires_at`.
    ///
    /// Revoking an already revoked token is a no-op.
    async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Whether `token_id` has been revoked
    async fn is_revoked(&self, token_id: &str) -> Result<bool>;

    /// Remove entries whose expiry is strictly before `now`.
    /// Returns the number removed.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Number of entries currently held
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Store type name for debugging
    fn store_type(&self) -> &'static str;
}

/// Unix second at which a store with whole-second expiry may drop the entry
/// for a token expiring at `expires_at`.
///
/// Tokens are accepted until `now > expires_at`, so the entry must outlive
/// every instant of the second containing `expires_at`.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) fn entry_deadline(expires_at: DateTime<Utc>) -> i64 {
    expires_at.timestamp().saturating_add(1)
}
