//! In-process access_token cache.
//!
//! - One entry per application, keyed `access_token_<agentid>`, so several clients may share
//!   a single `TokenCache` behind an `Arc` without clobbering each other.
//! - Entries carry an absolute local expiry (`tokio::time::Instant`) computed as
//!   `expires_in - safety_margin` from the moment they were stored. Expired entries are
//!   treated as absent and removed lazily on read.
//! - A per-cache async lock serializes refetches so concurrent misses issue one upstream call.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Seconds subtracted from the upstream `expires_in`.
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Token store shared by the token fetcher and the request executor.
#[derive(Debug)]
pub struct TokenCache {
    entries: DashMap<String, CachedToken>,
    refresh_lock: Mutex<()>,
    safety_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            refresh_lock: Mutex::new(()),
            safety_margin: Duration::from_secs(DEFAULT_SAFETY_MARGIN_SECS),
        }
    }

    /// Override the margin subtracted from upstream `expires_in`
    pub fn with_safety_margin(mut self, secs: u64) -> Self {
        self.safety_margin = Duration::from_secs(secs);
        self
    }

    /// Cache key for an application
    pub fn key_for(agent_id: i64) -> String {
        format!("access_token_{}", agent_id)
    }

    /// Return the cached token for `agent_id` if it is still inside its TTL.
    pub fn get(&self, agent_id: i64) -> Option<String> {
        let key = Self::key_for(agent_id);
        let now = Instant::now();
        let hit = self.entries.get(&key).map(|e| e.value().clone())?;
        if hit.is_valid_at(now) {
            debug!(
                key = %key,
                remaining_secs = (hit.expires_at - now).as_secs(),
                "token cache hit"
            );
            Some(hit.access_token)
        } else {
            debug!(key = %key, "cached token expired");
            self.entries
                .remove_if(&key, |_, v| !v.is_valid_at(Instant::now()));
            None
        }
    }

    /// Store a freshly issued token; the local TTL is `expires_in - safety_margin`.
    pub fn insert(&self, agent_id: i64, access_token: String, expires_in: u64) {
        let ttl = self.ttl_for(expires_in);
        let key = Self::key_for(agent_id);
        debug!(key = %key, ttl_secs = ttl.as_secs(), "token cached");
        self.entries.insert(
            key,
            CachedToken {
                access_token,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop the entry for `agent_id`; no-op if absent.
    pub fn invalidate(&self, agent_id: i64) {
        if self.entries.remove(&Self::key_for(agent_id)).is_some() {
            debug!(agent_id, "cached token invalidated");
        }
    }

    /// Drop the entry for `agent_id` only while it still holds `rejected`.
    ///
    /// A token stored by a concurrent refresh is kept.
    pub fn invalidate_if(&self, agent_id: i64, rejected: &str) {
        let removed = self
            .entries
            .remove_if(&Self::key_for(agent_id), |_, v| v.access_token == rejected);
        if removed.is_some() {
            debug!(agent_id, "rejected token invalidated");
        } else {
            debug!(agent_id, "rejected token already replaced");
        }
    }

    /// Number of stored entries, expired ones included until next read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }

    fn ttl_for(&self, expires_in: u64) -> Duration {
        Duration::from_secs(expires_in).saturating_sub(self.safety_margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_expires_exactly_after_ttl() {
        let cache = TokenCache::new();
        cache.insert(1000002, "tok1".into(), 7200);

        tokio::time::advance(Duration::from_secs(7139)).await;
        assert_eq!(cache.get(1000002).as_deref(), Some("tok1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(1000002), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_in_below_margin_is_never_served() {
        let cache = TokenCache::new();
        cache.insert(7, "short".into(), 30);
        assert_eq!(cache.get(7), None);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_safety_margin() {
        let cache = TokenCache::new().with_safety_margin(300);
        cache.insert(7, "t".into(), 7200);
        tokio::time::advance(Duration::from_secs(6899)).await;
        assert!(cache.get(7).is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(7).is_none());
    }

    #[test]
    fn entries_are_scoped_by_agent_id() {
        let cache = TokenCache::new();
        cache.insert(1, "a".into(), 7200);
        cache.insert(2, "b".into(), 7200);
        assert_eq!(cache.get(1).as_deref(), Some("a"));
        assert_eq!(cache.get(2).as_deref(), Some("b"));

        cache.invalidate(1);
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(2).as_deref(), Some("b"));

        // absent key
        cache.invalidate(1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_if_only_drops_the_rejected_token() {
        let cache = TokenCache::new();
        cache.insert(1, "fresh".into(), 7200);

        cache.invalidate_if(1, "stale");
        assert_eq!(cache.get(1).as_deref(), Some("fresh"));

        cache.invalidate_if(1, "fresh");
        assert_eq!(cache.get(1), None);

        // absent key
        cache.invalidate_if(1, "fresh");
        assert!(cache.is_empty());
    }

    #[test]
    fn key_format() {
        assert_eq!(TokenCache::key_for(1000002), "access_token_1000002");
    }
}
