//! In-process lock store
//!
//! Mirrors the external store's semantics, TTL expiry included, for tests
//! and single-process deployments that do not want a network dependency.

use crate::{LockStore, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Entry {
    holder: String,
    expires_at: Instant,
}

/// TTL'd key-value lock store held in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryLockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                holder: holder.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn holder(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        Ok(entries.get(key).map(|entry| entry.holder.clone()))
    }

    async fn ttl_seconds(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        Ok(entries
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()).as_secs() as i64)
            .unwrap_or(-2))
    }

    async fn release_if(&self, key: &str, holder: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        match entries.get(key) {
            Some(entry) if entry.holder == holder => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn force_release(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        Ok(entries.remove(key).is_some())
    }
}
