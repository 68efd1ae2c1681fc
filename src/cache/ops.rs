//! Lock and Save primitives: free functions composing `CacheProvider`'s
//! single-key atomics into the multi-key protocol of spec §4.4, mirroring
//! how the teacher keeps `enterprise::cache` split into small
//! single-purpose modules (`lock.rs`, `invalidation.rs`, `strategy.rs`)
//! rather than one god object. Every function here takes its collaborators
//! by reference, so callers (the `client` layer) own the `CacheProvider`,
//! `KeyNameProvider`, and `SentinelManager` instances.

use std::time::Duration;

use crate::error::{AuthzError, AuthzResult};
use crate::sentinel::{CommitOutcome, LockOutcome, SentinelKind, SentinelManager};

use super::capabilities::CacheCapabilities;
use super::metrics::CacheMetrics;
use super::provider::CacheProvider;

/// A dependency-set bound beyond which a collection is not cached at all
/// (spec §4.4 "Save collection"): the cost of invalidation would outweigh
/// the benefit of caching.
const MAX_DEPENDENCY_FANOUT: usize = 100;

/// Outcome of acquiring an item or collection lock.
#[derive(Debug)]
pub enum LockGrant {
    /// Every targeted key accepted our sentinel. `conflicted` lists keys
    /// where a Write-vs-Write collision was flagged (still granted, but
    /// the caller should expect `save_item`/`save_collection` to find a
    /// `Conflict` outcome on those keys).
    Granted {
        sentinel: String,
        keys: Vec<String>,
        conflicted: Vec<String>,
    },
    /// At least one key's current holder outranked us; no keys were
    /// mutated (any partial sentinel writes are rolled back).
    Denied,
}

/// Attempt to install a fresh sentinel of `kind` across every key in
/// `keys`. On the first denial, any sentinels already installed on
/// earlier keys in this call are released before returning `Denied`, so a
/// losing lock attempt never leaves stray sentinels behind.
async fn lock_keys(
    provider: &dyn CacheProvider,
    sentinel_mgr: &SentinelManager,
    keys: &[String],
    kind: SentinelKind,
    ttl: Duration,
) -> AuthzResult<LockGrant> {
    if keys.is_empty() {
        let sentinel = sentinel_mgr.generate(kind);
        return Ok(LockGrant::Granted {
            sentinel,
            keys: Vec::new(),
            conflicted: Vec::new(),
        });
    }

    let sentinel = sentinel_mgr.generate(kind);
    let mut installed = Vec::with_capacity(keys.len());
    let mut conflicted = Vec::new();

    for key in keys {
        match provider
            .write_sentinel(key, &sentinel, kind, sentinel_mgr, ttl)
            .await?
        {
            LockOutcome::Granted => installed.push(key.clone()),
            LockOutcome::GrantedWithConflict => {
                installed.push(key.clone());
                conflicted.push(key.clone());
            }
            LockOutcome::Denied => {
                tracing::debug!(key = %key, "sentinel lock denied, rolling back {} prior key(s)", installed.len());
                for won in &installed {
                    let _ = provider.release_sentinel(won, &sentinel).await;
                }
                return Ok(LockGrant::Denied);
            }
        }
    }

    Ok(LockGrant::Granted {
        sentinel,
        keys: installed,
        conflicted,
    })
}

/// Item lock (spec §4.4). For Delete, additionally locks the per-item
/// collection key and the secondary keys unconditionally, and tombstones
/// the dependencies key so in-flight reads on derived collections cannot
/// publish stale results once the server confirms the delete.
pub async fn take_item_lock(
    provider: &dyn CacheProvider,
    sentinel_mgr: &SentinelManager,
    caps: &CacheCapabilities,
    kind: SentinelKind,
) -> AuthzResult<LockGrant> {
    let keys = match kind {
        SentinelKind::Delete => caps.delete_lock_keys(),
        _ => caps.item_lock_keys(),
    };

    let grant = lock_keys(provider, sentinel_mgr, &keys, kind, caps.ttl).await?;

    if kind == SentinelKind::Delete {
        if let Some(dep_key) = &caps.dependencies_key {
            clear_dependencies(provider, dep_key).await?;
        }
    }

    Ok(grant)
}

/// Collection lock (spec §4.4): locks the per-item collection key plus
/// any caller-supplied sub-collection keys (pairwise edges, attribute
/// paths). Delete through this path also tombstones the anchor entity's
/// dependencies key.
pub async fn take_collection_lock(
    provider: &dyn CacheProvider,
    sentinel_mgr: &SentinelManager,
    collection_key: &str,
    sub_collection_keys: &[String],
    anchor_dependencies_key: Option<&str>,
    kind: SentinelKind,
    ttl: Duration,
) -> AuthzResult<LockGrant> {
    let mut keys = vec![collection_key.to_string()];
    keys.extend(sub_collection_keys.iter().cloned());

    let grant = lock_keys(provider, sentinel_mgr, &keys, kind, ttl).await?;

    if kind == SentinelKind::Delete {
        if let Some(dep_key) = anchor_dependencies_key {
            clear_dependencies(provider, dep_key).await?;
        }
    }

    Ok(grant)
}

/// Release every key in `keys` that still holds `sentinel`. Safe to call
/// on a partially- or fully-committed lock: keys already overwritten by a
/// commit, or taken over by another operation, are left untouched.
pub async fn release_sentinel(
    provider: &dyn CacheProvider,
    keys: &[String],
    sentinel: &str,
) -> AuthzResult<()> {
    for key in keys {
        // Best-effort: a release failure must never abort the caller's
        // unwind path (spec §5, cancellation semantics).
        let _ = provider.release_sentinel(key, sentinel).await;
    }
    Ok(())
}

/// Save item (spec §4.4). `clear_collections` requests a force-delete of
/// the global collection key and any `extra_collection_keys` once the
/// value commits, since the secondary keys just written may no longer
/// match whatever those collections previously cached.
#[allow(clippy::too_many_arguments)]
pub async fn save_item(
    provider: &dyn CacheProvider,
    sentinel_mgr: &SentinelManager,
    caps: &CacheCapabilities,
    held_sentinel: &str,
    serialized_value: &str,
    clear_collections: bool,
    extra_collection_keys: &[String],
    metrics: &CacheMetrics,
) -> AuthzResult<bool> {
    let Some(primary_key) = &caps.primary_key else {
        return Ok(false);
    };

    let current = provider
        .get_value(primary_key)
        .await?
        .unwrap_or_else(|| held_sentinel.to_string());
    let proposed_value_matches_current = current == serialized_value;

    let outcome = sentinel_mgr.can_set_value(&current, held_sentinel, proposed_value_matches_current);

    match outcome {
        CommitOutcome::Set => {
            let mut all_keys = vec![primary_key.clone()];
            all_keys.extend(caps.secondary_keys.iter().cloned());

            for key in &all_keys {
                provider
                    .set_value(key, serialized_value, caps.ttl)
                    .await?;
            }

            if clear_collections {
                if let Some(global) = &caps.global_collection_key {
                    provider.delete_value(global).await?;
                }
                for extra in extra_collection_keys {
                    provider.delete_value(extra).await?;
                }
            }

            if let Some(dep_key) = &caps.dependencies_key {
                provider.clear_dependencies(dep_key).await?;
            }

            let mut rollback_needed = false;
            for dep_key in &caps.dependency_keys {
                for key in &all_keys {
                    if !provider.add_dependency(dep_key, key).await? {
                        rollback_needed = true;
                    }
                }
            }
            if let Some(my_dep_key) = &caps.dependencies_key {
                for secondary in &caps.secondary_keys {
                    if !provider.add_dependency(my_dep_key, secondary).await? {
                        rollback_needed = true;
                    }
                }
            }

            if rollback_needed {
                tracing::warn!(key = %primary_key, "dependency registration lost a race, rolling back save");
                for key in &all_keys {
                    provider.delete_value(key).await?;
                }
                metrics.record_conflict();
                return Ok(false);
            }

            metrics.record_write();
            Ok(true)
        }
        CommitOutcome::Clear => {
            tracing::debug!(key = %primary_key, "save_item superseded by a concrete value, dropping keys");
            let mut all_keys = vec![primary_key.clone()];
            all_keys.extend(caps.secondary_keys.iter().cloned());
            for key in &all_keys {
                provider.delete_value(key).await?;
            }
            metrics.record_conflict();
            Ok(false)
        }
        CommitOutcome::Conflict { upgraded_sentinel } => {
            tracing::debug!(key = %primary_key, "save_item conflict, upgrading sentinel");
            provider
                .set_value(primary_key, &upgraded_sentinel, caps.ttl)
                .await?;
            metrics.record_conflict();
            Ok(false)
        }
        CommitOutcome::ConflictNoUpgrade => {
            tracing::debug!(key = %primary_key, "save_item conflict, sentinel already at or above this kind");
            metrics.record_conflict();
            Ok(false)
        }
    }
}

/// Save collection (spec §4.4). The set of dependency keys updated is the
/// union of every element's dependency keys plus each element's own
/// dependencies key. If that union is larger than `MAX_DEPENDENCY_FANOUT`,
/// the collection is not cached at all. The collection key is registered
/// as a dependent of every dependency key *before* the value is written,
/// so a concurrent invalidation either tombstones ahead of us (blocking
/// the store) or is guaranteed to find us afterward.
pub async fn save_collection(
    provider: &dyn CacheProvider,
    collection_key: &str,
    element_dependency_keys: &[String],
    serialized_value: &str,
    ttl: Duration,
    metrics: &CacheMetrics,
) -> AuthzResult<bool> {
    let mut dep_keys: Vec<&String> = element_dependency_keys.iter().collect();
    dep_keys.sort();
    dep_keys.dedup();

    if dep_keys.len() > MAX_DEPENDENCY_FANOUT {
        tracing::debug!(
            collection_key = %collection_key,
            fanout = dep_keys.len(),
            "collection exceeds dependency fanout bound, not caching"
        );
        metrics.record_skip_too_large();
        return Ok(false);
    }

    for dep_key in &dep_keys {
        if !provider.add_dependency(dep_key, collection_key).await? {
            // A tombstoned dependency: roll back any registrations we
            // already made and refuse to cache.
            tracing::debug!(collection_key = %collection_key, dep_key = %dep_key, "dependency tombstoned, refusing save_collection");
            metrics.record_conflict();
            return Ok(false);
        }
    }

    provider
        .set_value(collection_key, serialized_value, ttl)
        .await?;
    metrics.record_write();
    Ok(true)
}

/// Outcome of `get_item`.
#[derive(Debug)]
pub enum GetItemOutcome {
    Hit(String),
    Miss,
    /// Miss, with a Read sentinel installed for the caller to commit the
    /// server's reply under (requires `lock_on_miss`).
    MissWithSentinel(String),
}

/// Get item (spec §4.4): reads the primary key, records hit/miss metrics,
/// and on miss with `lock_on_miss` installs a Read sentinel so the caller
/// can commit the server's authoritative reply through `save_item`.
pub async fn get_item(
    provider: &dyn CacheProvider,
    sentinel_mgr: &SentinelManager,
    primary_key: &str,
    lock_on_miss: bool,
    ttl: Duration,
    metrics: &CacheMetrics,
) -> AuthzResult<GetItemOutcome> {
    match provider.get_value(primary_key).await? {
        Some(value) if !SentinelManager::is_sentinel(&value) && !SentinelManager::is_tombstone(&value) => {
            metrics.record_hit();
            Ok(GetItemOutcome::Hit(value))
        }
        _ => {
            metrics.record_miss();
            if !lock_on_miss {
                return Ok(GetItemOutcome::Miss);
            }
            let sentinel = sentinel_mgr.generate(SentinelKind::Read);
            match provider
                .write_sentinel(primary_key, &sentinel, SentinelKind::Read, sentinel_mgr, ttl)
                .await?
            {
                LockOutcome::Granted | LockOutcome::GrantedWithConflict => {
                    Ok(GetItemOutcome::MissWithSentinel(sentinel))
                }
                LockOutcome::Denied => Ok(GetItemOutcome::Miss),
            }
        }
    }
}

async fn clear_dependencies(provider: &dyn CacheProvider, dependencies_key: &str) -> AuthzResult<()> {
    provider.clear_dependencies(dependencies_key).await?;
    provider
        .set_value(
            dependencies_key,
            crate::sentinel::TOMBSTONE,
            Duration::from_secs(5),
        )
        .await
}
