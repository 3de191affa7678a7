//! # mux-lock
//!
//! The distributed GPU mutex.
//!
//! One key in an external TTL'd store decides who may use the GPU. The
//! store only needs three primitives: set-if-absent with TTL, read, and
//! holder-checked delete. [`GpuMutex`] layers the back-off series and the
//! [`Lease`] handle on top; the Redis backend is the production store and
//! the in-memory backend serves tests and single-process deployments.
//!
//! Every record carries a TTL, so a crashed holder is cleared by the
//! store itself, never by guesswork.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod mutex;
pub mod redis_store;

pub use memory::MemoryLockStore;
pub use mutex::{GpuMutex, Lease, LOCK_BACKOFF_SECS};
pub use redis_store::RedisLockStore;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors that can occur during lock operations
#[derive(Debug, Error)]
pub enum LockError {
    /// The store itself failed (connection, protocol)
    #[error("Lock store error: {0}")]
    Store(String),

    /// The mutex stayed contended through the whole back-off series
    #[error("GPU lock unavailable (held by {holder:?})")]
    Unavailable { holder: Option<String> },
}

/// What the store currently says about the mutex key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Current holder, if any
    pub holder: Option<String>,
    /// Remaining TTL in seconds; negative means no record
    pub ttl_seconds: i64,
}

/// Capability interface over the external key-value store
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically set `key = holder` with `ttl`, only if absent.
    /// True iff this call took the lock.
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Current value of the key
    async fn holder(&self, key: &str) -> Result<Option<String>>;

    /// Remaining TTL in seconds; negative when the key is absent
    async fn ttl_seconds(&self, key: &str) -> Result<i64>;

    /// Delete the key only if its value still equals `holder`.
    /// True iff a record was deleted.
    async fn release_if(&self, key: &str, holder: &str) -> Result<bool>;

    /// Unconditionally delete the key. True iff a record existed.
    async fn force_release(&self, key: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::Unavailable {
            holder: Some("comfyui".to_string()),
        };
        assert!(err.to_string().contains("comfyui"));
    }
}
