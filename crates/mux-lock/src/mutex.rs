//! GPU mutex and lease
//!
//! [`GpuMutex`] wraps a [`LockStore`] with the contended-acquisition
//! policy: one immediate attempt, then retries after 1, 2, 4, 8 and 16
//! seconds. A successful acquisition yields a [`Lease`]; releasing it
//! deletes the key only while the stored value still names this holder,
//! so a lease that outlived its TTL can never free somebody else's lock.

use crate::{LockError, LockRecord, LockStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Back-off series for contended acquisition, in seconds
pub const LOCK_BACKOFF_SECS: [u64; 5] = [1, 2, 4, 8, 16];

/// The distributed mutex over one well-known key
#[derive(Clone)]
pub struct GpuMutex {
    store: Arc<dyn LockStore>,
    key: String,
}

impl GpuMutex {
    /// Create the mutex over `key` in the given store
    pub fn new(store: Arc<dyn LockStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The mutex key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// One acquisition attempt, no waiting
    pub async fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<Option<Lease>> {
        if self.store.acquire(&self.key, holder, ttl).await? {
            info!("GPU lock acquired by {}", holder);
            Ok(Some(Lease {
                store: self.store.clone(),
                key: self.key.clone(),
                holder: holder.to_string(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Acquire with the back-off series; fails with
    /// [`LockError::Unavailable`] once the series is exhausted.
    pub async fn acquire(&self, holder: &str, ttl: Duration) -> Result<Lease> {
        if let Some(lease) = self.try_acquire(holder, ttl).await? {
            return Ok(lease);
        }

        let current = self.store.holder(&self.key).await?;
        warn!("GPU locked by {:?}, waiting...", current);

        for delay in LOCK_BACKOFF_SECS {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            if let Some(lease) = self.try_acquire(holder, ttl).await? {
                return Ok(lease);
            }
        }

        let holder_now = self.store.holder(&self.key).await?;
        Err(LockError::Unavailable { holder: holder_now })
    }

    /// What the store currently records for the key
    pub async fn record(&self) -> Result<LockRecord> {
        Ok(LockRecord {
            holder: self.store.holder(&self.key).await?,
            ttl_seconds: self.store.ttl_seconds(&self.key).await?,
        })
    }

    /// Operator escape hatch: delete the key no matter who holds it
    pub async fn force_release(&self) -> Result<bool> {
        let released = self.store.force_release(&self.key).await?;
        if released {
            warn!("GPU lock force-released");
        }
        Ok(released)
    }
}

/// Scoped hold of the GPU mutex.
///
/// Call [`Lease::release`] on every exit path. Dropping an unreleased
/// lease only logs; the TTL is the backstop, not the cleanup path.
pub struct Lease {
    store: Arc<dyn LockStore>,
    key: String,
    holder: String,
    released: bool,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("holder", &self.holder)
            .field("released", &self.released)
            .finish()
    }
}

impl Lease {
    /// The holder this lease was granted to
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Release the mutex if this lease still owns it.
    ///
    /// Returns false when the record had already expired and been taken
    /// by someone else; in that case nothing is deleted.
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        let released = self.store.release_if(&self.key, &self.holder).await?;
        if released {
            info!("GPU lock released by {}", self.holder);
        } else {
            warn!(
                "GPU lock no longer held by {} at release time; left untouched",
                self.holder
            );
        }
        Ok(released)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "lease for {} dropped without release; TTL will clear it",
                self.holder
            );
        }
    }
}
