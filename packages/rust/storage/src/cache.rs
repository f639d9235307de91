//! Fingerprint-keyed response cache with TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::Storage;

/// Lowercase and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic SHA-256 fingerprint of request parameters.
///
/// Each part is length-prefixed so that `("ab", "c")` and `("a", "bc")` differ.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Provider response cache.
///
/// Never fails a caller: a missing or broken store turns every `get` into a
/// miss and every `put` into a no-op, with a logged warning.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Option<Arc<Storage>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Option<Arc<Storage>>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached payload for `key`, if present and not expired.
    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.cache_get(key, Utc::now().timestamp_millis()).await {
            Ok(hit) => {
                debug!(key = &key[..key.len().min(12)], hit = hit.is_some(), "cache lookup");
                hit
            }
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store `payload` under `key` with the configured TTL.
    pub async fn put(&self, key: &str, provider: &str, payload: &str) {
        self.put_with_ttl(key, provider, payload, self.ttl).await;
    }

    pub async fn put_with_ttl(&self, key: &str, provider: &str, payload: &str, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);
        if let Err(e) = store.cache_put(key, provider, payload, now, expires_at).await {
            warn!(error = %e, "cache write failed, continuing without caching");
        }
    }

    /// Remove all entries. Returns how many were removed.
    pub async fn clear(&self) -> u64 {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        store.cache_clear().await.unwrap_or_else(|e| {
            warn!(error = %e, "cache clear failed");
            0
        })
    }

    /// Remove expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> u64 {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        match store
            .cache_purge_expired(Utc::now().timestamp_millis())
            .await
        {
            Ok(n) => {
                if n > 0 {
                    debug!(removed = n, "purged expired cache entries");
                }
                n
            }
            Err(e) => {
                warn!(error = %e, "cache purge failed");
                0
            }
        }
    }
}
