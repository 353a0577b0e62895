//! `Idempotency-Key` replay cache.
//!
//! Mirrors `cache.rs`'s TTL-bucketed `DashMap` design: a single entry-level
//! lock per key lets a concurrent retry either wait behind the original
//! request or observe its replayed response, without a separate lock
//! manager. Unlike the context cache, entries here are keyed by
//! `(tenant, idempotency_key)` and store the exact response body + status
//! that was returned the first time a given key was used.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const REPLAY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    tenant: String,
    idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub status: u16,
    pub body: Value,
    stored_at: Instant,
}

impl Recorded {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= REPLAY_TTL
    }
}

/// Bounded-TTL store of `Idempotency-Key` -> response replays: a caller
/// that retries the same mutating request with the same key gets back the
/// original response rather than a second side effect.
pub struct IdempotencyStore {
    entries: DashMap<Key, Recorded>,
}

impl IdempotencyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: DashMap::new() })
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
            loop {
                interval.tick().await;
                store.entries.retain(|_, v| !v.is_expired());
            }
        })
    }

    pub fn get(&self, tenant: &str, idempotency_key: &str) -> Option<Recorded> {
        let key = Key {
            tenant: tenant.to_string(),
            idempotency_key: idempotency_key.to_string(),
        };
        let entry = self.entries.get(&key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(&key);
            None
        } else {
            Some(entry.clone())
        }
    }

    pub fn put(&self, tenant: &str, idempotency_key: &str, status: u16, body: Value) {
        let key = Key {
            tenant: tenant.to_string(),
            idempotency_key: idempotency_key.to_string(),
        };
        self.entries.insert(
            key,
            Recorded {
                status,
                body,
                stored_at: Instant::now(),
            },
        );
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self { entries: DashMap::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let store = IdempotencyStore::new();
        store.put("t1", "key_1", 201, json!({"id": "txn_1"}));
        let recorded = store.get("t1", "key_1").expect("entry present");
        assert_eq!(recorded.status, 201);
        assert_eq!(recorded.body, json!({"id": "txn_1"}));
    }

    #[test]
    fn keys_are_scoped_per_tenant() {
        let store = IdempotencyStore::new();
        store.put("t1", "key_1", 201, json!({"id": "txn_1"}));
        assert!(store.get("t2", "key_1").is_none());
    }
}
