//! StatsCache - per-phone statistics with a TTL, backed by a durable snapshot.
//!
//! Every read and write goes through one async mutex. Each write persists the full
//! store while still holding that lock, so snapshots reach the store in write order.
//! Storage failures are logged and otherwise ignored: the cache degrades to cold,
//! the request path never fails because of it.

use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{Phone, PhoneStats};
use crate::ports::{CacheEntry, Clock, Snapshot, SnapshotStore};

pub struct StatsCache {
    entries: Mutex<Snapshot>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl StatsCache {
    /// Load the last snapshot (dropping whatever has already expired).
    pub async fn open(store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let entries = match store.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load cache snapshot, starting with an empty cache");
                Snapshot::new()
            }
        };
        let cache = Self {
            entries: Mutex::new(entries),
            store,
            clock,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        };
        let live = {
            let mut entries = cache.entries.lock().await;
            cache.purge(&mut entries);
            entries.len()
        };
        info!(entries = live, ttl_secs = ttl.as_secs(), "Stats cache opened");
        cache
    }

    /// Valid stats for `phone`, if any. Purges every expired entry first.
    pub async fn get(&self, phone: Phone) -> Option<PhoneStats> {
        let mut entries = self.entries.lock().await;
        self.purge(&mut entries);
        entries.get(&phone).map(|entry| entry.data.clone())
    }

    /// Store stats for one phone, stamped now, and persist.
    pub async fn save(&self, phone: Phone, stats: PhoneStats) {
        self.save_all([(phone, stats)]).await;
    }

    /// Store several phones under one lock and persist a single snapshot.
    pub async fn save_all(&self, stats: impl IntoIterator<Item = (Phone, PhoneStats)>) {
        let mut entries = self.entries.lock().await;
        let stored_at = self.clock.now();
        for (phone, data) in stats {
            entries.insert(phone, CacheEntry { data, stored_at });
        }
        self.purge(&mut entries);
        if let Err(e) = self.store.save(&entries).await {
            warn!(error = %e, entries = entries.len(), "Failed to persist cache snapshot");
        }
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.purge(&mut entries);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // An entry is valid while `now - stored_at <= ttl`.
    fn purge(&self, entries: &mut Snapshot) {
        let now = self.clock.now();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.stored_at <= self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            debug!(expired, "Purged expired cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallRecord;
    use crate::impls::InMemorySnapshotStore;
    use crate::ports::FixedClock;
    use chrono::DateTime;

    const TTL: Duration = Duration::from_secs(600);

    fn stats(duration_ms: i64) -> PhoneStats {
        let mut stats = PhoneStats::new();
        stats.record(&CallRecord {
            phone: 1,
            start_ms: 0,
            end_ms: duration_ms,
        });
        stats
    }

    /// Phones held in memory, read without purging.
    async fn resident(cache: &StatsCache) -> Vec<Phone> {
        let mut phones: Vec<Phone> = cache.entries.lock().await.keys().copied().collect();
        phones.sort_unstable();
        phones
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn roundtrip_within_ttl() {
        let clock = clock();
        let store = Arc::new(InMemorySnapshotStore::new());
        let cache = StatsCache::open(store.clone(), clock.clone(), TTL).await;

        cache.save(1, stats(20_000)).await;
        clock.advance(TimeDelta::seconds(600));

        assert_eq!(cache.get(1).await, Some(stats(20_000)));
        assert_eq!(store.saves(), 1);
        assert!(store.stored().contains_key(&1));
    }

    #[tokio::test]
    async fn expires_after_ttl_and_purges_store_wide() {
        let clock = clock();
        let cache = StatsCache::open(Arc::new(InMemorySnapshotStore::new()), clock.clone(), TTL).await;

        cache.save(1, stats(5_000)).await;
        clock.advance(TimeDelta::seconds(300));
        cache.save(2, stats(5_000)).await;
        clock.advance(TimeDelta::seconds(301));

        assert_eq!(resident(&cache).await, vec![1, 2]);
        assert_eq!(cache.get(2).await, Some(stats(5_000)));
        assert_eq!(resident(&cache).await, vec![2]);
        assert_eq!(cache.get(1).await, None);
    }

    #[tokio::test]
    async fn save_after_expiry_persists_without_expired_entries() {
        let clock = clock();
        let store = Arc::new(InMemorySnapshotStore::new());
        let cache = StatsCache::open(store.clone(), clock.clone(), TTL).await;

        cache.save(1, stats(5_000)).await;
        assert!(store.stored().contains_key(&1));

        clock.advance(TimeDelta::seconds(601));
        cache.save(3, stats(7_000)).await;

        let stored = store.stored();
        assert!(!stored.contains_key(&1));
        assert_eq!(stored[&3].data, stats(7_000));
        assert_eq!(store.saves(), 2);
    }

    #[tokio::test]
    async fn zero_attempt_stats_are_cached() {
        let cache = StatsCache::open(Arc::new(InMemorySnapshotStore::new()), clock(), TTL).await;
        cache.save(42, PhoneStats::new()).await;

        let cached = cache.get(42).await.unwrap();
        assert_eq!(cached.attempt_count, 0);
        assert_eq!(cached.min_price, f64::INFINITY);
    }

    #[tokio::test]
    async fn open_restores_snapshot_and_drops_expired() {
        let clock = clock();
        let store = Arc::new(InMemorySnapshotStore::new());
        {
            let cache = StatsCache::open(store.clone(), clock.clone(), TTL).await;
            cache.save(1, stats(1_000)).await;
            clock.advance(TimeDelta::seconds(500));
            cache.save(2, stats(2_000)).await;
        }

        clock.advance(TimeDelta::seconds(200));
        let reopened = StatsCache::open(store, clock, TTL).await;

        assert_eq!(reopened.get(1).await, None);
        assert_eq!(reopened.get(2).await, Some(stats(2_000)));
    }

    #[tokio::test]
    async fn storage_failures_do_not_break_the_cache() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.set_failing(true);

        let cache = StatsCache::open(store.clone(), clock(), TTL).await;
        assert!(cache.is_empty().await);

        cache.save(1, stats(1_000)).await;
        assert_eq!(cache.get(1).await, Some(stats(1_000)));
        assert_eq!(store.saves(), 0);
    }
}
