//! Process-local `CacheProvider`: a single coarse-grained mutex around a
//! `HashMap`. Grounded on the locking discipline in
//! `enterprise::cache::lock::DistributedMutex`, but without the
//! distributed fencing machinery — a single process needs only a plain
//! mutex to get the same atomicity guarantee.
//!
//! Deliberately not built on `moka`: moka's `Cache` exposes `get`,
//! `insert`, `invalidate`, but no atomic "read current, decide, write
//! result" primitive, which `write_sentinel`/`release_sentinel` both need.
//! A coarse mutex trades per-key concurrency for a compare-and-swap we can
//! actually express. See DESIGN.md.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AuthzResult;
use crate::sentinel::{LockOutcome, SentinelKind, SentinelManager, TOMBSTONE};

use super::provider::CacheProvider;

struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct Store {
    values: HashMap<String, Slot>,
    /// `on_key` -> set of keys that depend on it (spec §4.4).
    dependents: HashMap<String, HashSet<String>>,
}

/// A single-process cache backend suitable for tests and for deployments
/// that run one client instance per cache namespace.
pub struct LocalCacheProvider {
    store: Mutex<Store>,
}

impl LocalCacheProvider {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
        }
    }
}

impl Default for LocalCacheProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheProvider for LocalCacheProvider {
    async fn get_value(&self, key: &str) -> AuthzResult<Option<String>> {
        let now = Instant::now();
        let store = self.store.lock().await;
        Ok(store
            .values
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    async fn get_values(&self, keys: &[String]) -> AuthzResult<Vec<Option<String>>> {
        let now = Instant::now();
        let store = self.store.lock().await;
        Ok(keys
            .iter()
            .map(|k| {
                store
                    .values
                    .get(k)
                    .filter(|slot| slot.is_live(now))
                    .map(|slot| slot.value.clone())
            })
            .collect())
    }

    async fn write_sentinel(
        &self,
        key: &str,
        sentinel: &str,
        candidate: SentinelKind,
        sentinel_mgr: &SentinelManager,
        ttl: Duration,
    ) -> AuthzResult<LockOutcome> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        let previous = store
            .values
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone());

        let outcome = sentinel_mgr.can_set_sentinel(previous.as_deref(), candidate);
        if !matches!(outcome, LockOutcome::Denied) {
            store.values.insert(
                key.to_string(),
                Slot {
                    value: sentinel.to_string(),
                    expires_at: now + ttl,
                },
            );
        }
        Ok(outcome)
    }

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> AuthzResult<()> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        store.values.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> AuthzResult<()> {
        let mut store = self.store.lock().await;
        store.values.remove(key);
        Ok(())
    }

    async fn release_sentinel(&self, key: &str, expected_sentinel: &str) -> AuthzResult<()> {
        let mut store = self.store.lock().await;
        if store
            .values
            .get(key)
            .map(|slot| slot.value == expected_sentinel)
            .unwrap_or(false)
        {
            store.values.remove(key);
        }
        Ok(())
    }

    async fn add_dependency(&self, on_key: &str, dependent_key: &str) -> AuthzResult<bool> {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        let blocked = store
            .values
            .get(on_key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| SentinelManager::is_tombstone(&slot.value))
            .unwrap_or(false);
        if blocked {
            return Ok(false);
        }
        store
            .dependents
            .entry(on_key.to_string())
            .or_default()
            .insert(dependent_key.to_string());
        Ok(true)
    }

    async fn clear_dependencies(&self, on_key: &str) -> AuthzResult<()> {
        let mut store = self.store.lock().await;
        if let Some(dependents) = store.dependents.remove(on_key) {
            for dependent in dependents {
                store.values.remove(&dependent);
            }
        }
        Ok(())
    }

    async fn flush(&self, prefix: &str, flush_tombstones: bool) -> AuthzResult<()> {
        let mut store = self.store.lock().await;
        let doomed: Vec<String> = store
            .values
            .iter()
            .filter(|(key, slot)| {
                key.starts_with(prefix) && (flush_tombstones || !SentinelManager::is_tombstone(&slot.value))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            store.values.remove(key);
        }
        store.dependents.retain(|on_key, _| !doomed.contains(on_key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentinel::{SentinelKind, SentinelManager};

    fn long_ttl() -> Duration {
        Duration::from_secs(60)
    }

    #[tokio::test]
    async fn round_trips_a_value() {
        let provider = LocalCacheProvider::new();
        provider.set_value("k", "v", long_ttl()).await.unwrap();
        assert_eq!(provider.get_value("k").await.unwrap(), Some("v".into()));
    }

    #[tokio::test]
    async fn expired_value_reads_as_absent() {
        let provider = LocalCacheProvider::new();
        provider
            .set_value("k", "v", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(provider.get_value("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_sentinel_is_a_noop_if_superseded() {
        let provider = LocalCacheProvider::new();
        let mgr = SentinelManager::new();
        let s1 = mgr.generate(SentinelKind::Write);
        let s2 = mgr.generate(SentinelKind::Write);
        provider
            .write_sentinel("k", &s1, SentinelKind::Write, &mgr, long_ttl())
            .await
            .unwrap();
        provider
            .write_sentinel("k", &s2, SentinelKind::Write, &mgr, long_ttl())
            .await
            .unwrap();
        provider.release_sentinel("k", &s1).await.unwrap();
        assert_eq!(provider.get_value("k").await.unwrap(), Some(s2));
    }

    #[tokio::test]
    async fn write_sentinel_never_writes_on_denial() {
        let provider = LocalCacheProvider::new();
        let mgr = SentinelManager::new();
        let delete = mgr.generate(SentinelKind::Delete);
        provider
            .write_sentinel("k", &delete, SentinelKind::Delete, &mgr, long_ttl())
            .await
            .unwrap();

        let write = mgr.generate(SentinelKind::Write);
        let outcome = provider
            .write_sentinel("k", &write, SentinelKind::Write, &mgr, long_ttl())
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Denied);
        assert_eq!(provider.get_value("k").await.unwrap(), Some(delete));
    }

    #[tokio::test]
    async fn flush_is_scoped_to_prefix_and_respects_tombstones() {
        let provider = LocalCacheProvider::new();
        provider.set_value("tenant-a:x", "v", long_ttl()).await.unwrap();
        provider.set_value("tenant-b:x", "v", long_ttl()).await.unwrap();
        provider
            .set_value("tenant-a:tomb", TOMBSTONE, long_ttl())
            .await
            .unwrap();

        provider.flush("tenant-a:", false).await.unwrap();
        assert_eq!(provider.get_value("tenant-a:x").await.unwrap(), None);
        assert_eq!(provider.get_value("tenant-a:tomb").await.unwrap(), Some(TOMBSTONE.to_string()));
        assert_eq!(provider.get_value("tenant-b:x").await.unwrap(), Some("v".to_string()));

        provider.flush("tenant-a:", true).await.unwrap();
        assert_eq!(provider.get_value("tenant-a:tomb").await.unwrap(), None);
    }

    #[tokio::test]
    async fn add_dependency_is_blocked_by_tombstone() {
        let provider = LocalCacheProvider::new();
        provider
            .set_value("on", TOMBSTONE, long_ttl())
            .await
            .unwrap();
        let allowed = provider.add_dependency("on", "dep").await.unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn clear_dependencies_invalidates_all_dependents() {
        let provider = LocalCacheProvider::new();
        provider.set_value("dep-a", "va", long_ttl()).await.unwrap();
        provider.set_value("dep-b", "vb", long_ttl()).await.unwrap();
        provider.add_dependency("on", "dep-a").await.unwrap();
        provider.add_dependency("on", "dep-b").await.unwrap();
        provider.clear_dependencies("on").await.unwrap();
        assert_eq!(provider.get_value("dep-a").await.unwrap(), None);
        assert_eq!(provider.get_value("dep-b").await.unwrap(), None);
    }
}
