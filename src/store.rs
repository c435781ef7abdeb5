// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Counter store abstraction.
//!
//! The rate limiter and abuse log live in a shared Redis instance. All
//! mutation goes through the store's own atomic primitives (INCR, EXPIRE,
//! LPUSH/LTRIM), so no application-level locking is layered on top.
//!
//! The Redis client is constructed once at startup and injected; the
//! connection manager handles reconnects internally, so concurrent
//! cold-start requests never race to open duplicate connections.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from the counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Shared durable counter with expiry plus an append-only log.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` and return the post-increment value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the time-to-live on `key` in seconds.
    async fn expire(&self, key: &str, secs: i64) -> Result<(), StoreError>;

    /// Remaining time-to-live on `key` in seconds.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    /// Prepend `entry` to the list at `key` and trim it to `max_len`
    /// entries, most recent first.
    async fn push_capped(&self, key: &str, entry: &str, max_len: usize) -> Result<(), StoreError>;
}

/// Redis-backed counter store.
#[derive(Clone)]
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Open a connection manager against the given Redis URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut con = self.manager.clone();
        Ok(con.incr(key, 1).await?)
    }

    async fn expire(&self, key: &str, secs: i64) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        con.expire::<_, ()>(key, secs).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut con = self.manager.clone();
        Ok(con.ttl(key).await?)
    }

    async fn push_capped(&self, key: &str, entry: &str, max_len: usize) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        con.lpush::<_, _, ()>(key, entry).await?;
        con.ltrim::<_, ()>(key, 0, max_len as isize - 1).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct Counter {
    count: i64,
    expires_at: Option<Instant>,
}

/// In-process counter store with the same expiry semantics as Redis.
/// Used by the test suites.
#[derive(Clone, Default)]
pub struct MemoryStore {
    counters: Arc<RwLock<HashMap<String, Counter>>>,
    logs: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a log list, most recent first.
    pub async fn log_entries(&self, key: &str) -> Vec<String> {
        self.logs
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut counters = self.counters.write().await;
        let now = Instant::now();
        let counter = counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: None,
        });

        // An elapsed expiry means the key is gone; the increment starts a
        // fresh window
        if counter.expires_at.is_some_and(|at| at <= now) {
            counter.count = 0;
            counter.expires_at = None;
        }

        counter.count += 1;
        Ok(counter.count)
    }

    async fn expire(&self, key: &str, secs: i64) -> Result<(), StoreError> {
        let mut counters = self.counters.write().await;
        if let Some(counter) = counters.get_mut(key) {
            counter.expires_at = Some(Instant::now() + Duration::from_secs(secs.max(0) as u64));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let counters = self.counters.read().await;
        match counters.get(key).and_then(|c| c.expires_at) {
            Some(at) => {
                let now = Instant::now();
                if at <= now {
                    Ok(-2)
                } else {
                    Ok(at.duration_since(now).as_secs() as i64)
                }
            }
            None => Ok(-1),
        }
    }

    async fn push_capped(&self, key: &str, entry: &str, max_len: usize) -> Result<(), StoreError> {
        let mut logs = self.logs.write().await;
        let list = logs.entry(key.to_string()).or_default();
        list.insert(0, entry.to_string());
        list.truncate(max_len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_is_sequential() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.incr("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ttl_reports_remaining_window() {
        let store = MemoryStore::new();
        store.incr("k").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), -1);

        store.expire("k", 120).await.unwrap();
        let ttl = store.ttl("k").await.unwrap();
        assert!(ttl > 0 && ttl <= 120);
    }

    #[tokio::test]
    async fn test_elapsed_expiry_resets_count() {
        let store = MemoryStore::new();
        store.incr("k").await.unwrap();
        store.incr("k").await.unwrap();
        store.expire("k", 0).await.unwrap();

        // Key has lapsed; next increment starts a fresh window
        assert_eq!(store.incr("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_push_capped_trims_oldest() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .push_capped("log", &format!("entry-{i}"), 3)
                .await
                .unwrap();
        }

        let entries = store.log_entries("log").await;
        assert_eq!(entries, vec!["entry-4", "entry-3", "entry-2"]);
    }
}
