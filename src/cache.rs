//! Context cache.
//!
//! Backed by a `dashmap::DashMap` kept in-process rather than behind a
//! database, with per-bucket TTLs and weak ETags so repeated
//! `GET /context/*` calls can be served without recomputation.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// TTL buckets by resource kind. `Default` covers anything not explicitly listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheBucket {
    AccountMetadata,
    ActivityStats,
    Balances,
    Transfer,
    Agent,
    Batch,
    Default,
}

impl CacheBucket {
    pub fn ttl(&self) -> Duration {
        match self {
            CacheBucket::AccountMetadata => Duration::from_secs(5 * 60),
            CacheBucket::ActivityStats => Duration::from_secs(60 * 60),
            CacheBucket::Balances => Duration::from_secs(30),
            CacheBucket::Transfer | CacheBucket::Agent | CacheBucket::Batch => Duration::from_secs(2 * 60),
            CacheBucket::Default => Duration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant: String,
    pub path: String,
    pub query_fingerprint: String,
}

impl CacheKey {
    pub fn new(tenant: impl Into<String>, path: impl Into<String>, query_fingerprint: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            path: path.into(),
            query_fingerprint: query_fingerprint.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Value,
    pub etag: String,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }

    /// Seconds since this entry was written, for the `X-Cache-Age` header.
    pub fn age_seconds(&self) -> u64 {
        self.stored_at.elapsed().as_secs()
    }

    /// Seconds left before expiry, for `Cache-Control: max-age=`.
    pub fn ttl_remaining_seconds(&self) -> u64 {
        self.ttl.saturating_sub(self.stored_at.elapsed()).as_secs()
    }
}

/// Computes a weak ETag over the canonical JSON serialization of `body`.
///
/// `DefaultHasher` is not a cryptographic hash and is not stable across Rust
/// versions, which is fine here: the ETag only needs to be stable within one
/// running process, never compared across deploys.
fn weak_etag(body: &Value) -> String {
    let canonical = serde_json::to_string(body).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("W/\"{:016x}\"", hasher.finish())
}

/// In-process TTL cache for `GET /context/*` responses.
pub struct ContextCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ContextCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    /// Spawns the background sweeper that removes expired entries every 5
    /// minutes. Returns the join handle so callers can abort it on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }

    fn sweep(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
        tracing::debug!(remaining = self.entries.len(), "context cache swept");
    }

    /// Returns the cached entry if present and unexpired.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            None
        } else {
            Some(entry.clone())
        }
    }

    pub fn put(&self, key: CacheKey, body: Value, bucket: CacheBucket) -> CacheEntry {
        let entry = CacheEntry {
            etag: weak_etag(&body),
            body,
            stored_at: Instant::now(),
            ttl: bucket.ttl(),
        };
        self.entries.insert(key, entry.clone());
        entry
    }

    /// Removes every entry whose path starts with `prefix`, used after a
    /// mutation invalidates everything under e.g. `/context/accounts/acc_1`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.path.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

/// Whether a request should bypass the cache: either the
/// `Cache-Control: no-cache` header or a `?fresh=true` query param.
pub fn bypasses_cache(cache_control: Option<&str>, fresh_query_param: Option<&str>) -> bool {
    let no_cache_header = cache_control
        .map(|v| v.to_ascii_lowercase().contains("no-cache"))
        .unwrap_or(false);
    let fresh_param = fresh_query_param
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    no_cache_header || fresh_param
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips_the_body() {
        let cache = ContextCache::new();
        let key = CacheKey::new("tenant_1", "/context/accounts/acc_1", "");
        cache.put(key.clone(), json!({"account_id": "acc_1"}), CacheBucket::AccountMetadata);
        let entry = cache.get(&key).expect("entry present");
        assert_eq!(entry.body, json!({"account_id": "acc_1"}));
        assert!(entry.etag.starts_with("W/\""));
    }

    #[test]
    fn same_body_produces_same_etag() {
        let a = weak_etag(&json!({"a": 1, "b": 2}));
        let b = weak_etag(&json!({"a": 1, "b": 2}));
        assert_eq!(a, b);
    }

    #[test]
    fn invalidate_prefix_removes_matching_entries_only() {
        let cache = ContextCache::new();
        cache.put(
            CacheKey::new("t1", "/context/accounts/acc_1", ""),
            json!({}),
            CacheBucket::AccountMetadata,
        );
        cache.put(
            CacheKey::new("t1", "/context/agents/agent_1", ""),
            json!({}),
            CacheBucket::Agent,
        );
        cache.invalidate_prefix("/context/accounts");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bypasses_cache_checks_header_and_query_param() {
        assert!(bypasses_cache(Some("no-cache"), None));
        assert!(bypasses_cache(None, Some("true")));
        assert!(!bypasses_cache(Some("max-age=60"), None));
        assert!(!bypasses_cache(None, None));
    }
}
