//! Owner cache implementations behind the [`OwnerCache`] port.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use scc::HashMap;
use tokio::time::Instant;

use crate::{core::process_id::ProcessId, ports::owner_cache::OwnerCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    owner: String,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Concurrent owner cache with lazy expiry.
///
/// Entries past `ttl` are dropped on the next access; [`purge_expired`]
/// can be run periodically to bound memory for process ids that are never
/// requested again.
///
/// [`purge_expired`]: TtlOwnerCache::purge_expired
pub struct TtlOwnerCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl TtlOwnerCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry; returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut removed = 0;
        let removed_ref = &mut removed;
        self.entries
            .retain_async(|_, entry| {
                let keep = entry.is_fresh(ttl);
                if !keep {
                    *removed_ref += 1;
                }
                keep
            })
            .await;
        removed
    }

    /// Run [`purge_expired`](Self::purge_expired) every `ttl` in a background task.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.ttl);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.purge_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, remaining = self.len(), "expired owner cache entries purged");
                }
            }
        })
    }
}

#[async_trait]
impl OwnerCache for TtlOwnerCache {
    async fn get(&self, process_id: &ProcessId) -> Option<String> {
        // Clone out so the bucket lock is released before returning.
        let entry = self
            .entries
            .get_async(process_id.as_str())
            .await
            .map(|entry| entry.get().clone())?;

        if entry.is_fresh(self.ttl) {
            return Some(entry.owner);
        }

        let ttl = self.ttl;
        // A concurrent refresh may have landed in between; only drop stale values.
        let _ = self
            .entries
            .remove_if_async(process_id.as_str(), |current| !current.is_fresh(ttl))
            .await;
        None
    }

    async fn put(&self, process_id: &ProcessId, owner: String) {
        let entry = CacheEntry {
            owner,
            fetched_at: Instant::now(),
        };
        let _ = self
            .entries
            .upsert_async(process_id.as_str().to_string(), entry)
            .await;
    }
}

/// Cache that never stores anything; every resolution hits the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOwnerCache;

#[async_trait]
impl OwnerCache for NoopOwnerCache {
    async fn get(&self, _process_id: &ProcessId) -> Option<String> {
        None
    }

    async fn put(&self, _process_id: &ProcessId, _owner: String) {}
}
