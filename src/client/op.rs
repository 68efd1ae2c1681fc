//! Internal orchestration helpers shared by every CRUD method: (a) lock,
//! (b) cache-check, (c) HTTP call, (d) save or invalidate, (e) release.
//! Kept as free functions operating on a `CacheManager` so the entity
//! method bodies in the sibling modules stay a few lines each, the same
//! way the teacher keeps `WriteThroughCache`/`ReadThroughCache` as thin
//! wrappers around one `get`/`put` shape.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{
    get_item, release_sentinel, save_item, take_item_lock, CacheCapabilities, CacheManager,
    GetItemOutcome, LockGrant,
};
use crate::error::{AuthzError, AuthzResult};
use crate::sentinel::SentinelKind;

/// Run `fut` under `deadline` if one is set; a deadline miss surfaces as
/// `AuthzError::Transport`, since the caller's request did not complete,
/// not because the server rejected it.
async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = AuthzResult<T>>,
) -> AuthzResult<T> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .unwrap_or_else(|_| Err(AuthzError::Transport(format!("deadline of {d:?} exceeded")))),
        None => fut.await,
    }
}

/// Create/Update: lock, run the server call, save the authoritative reply
/// on success, always release.
pub async fn run_write<T, F, Fut>(
    manager: &CacheManager,
    caps: &CacheCapabilities,
    kind: SentinelKind,
    clear_collections: bool,
    deadline: Option<Duration>,
    server_call: F,
) -> AuthzResult<T>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AuthzResult<T>>,
{
    with_deadline(deadline, async move {
        let grant =
            take_item_lock(manager.provider(), manager.sentinel_manager(), caps, kind).await?;
        let LockGrant::Granted { sentinel, keys, .. } = grant else {
            return Err(AuthzError::CacheContention(
                "could not acquire item lock".to_string(),
            ));
        };

        let result = server_call().await;

        if let Ok(value) = &result {
            let serialized = serde_json::to_string(value)?;
            let _ = save_item(
                manager.provider(),
                manager.sentinel_manager(),
                caps,
                &sentinel,
                &serialized,
                clear_collections,
                &[],
                manager.metrics(),
            )
            .await;
        }

        release_sentinel(manager.provider(), &keys, &sentinel).await?;
        result
    })
    .await
}

/// Delete: lock (which also tombstones the dependency set), run the
/// server call, force-delete the cached copies on success regardless of
/// whether invalidation fully succeeds (spec §7: a delete that succeeds
/// server-side but fails to invalidate still returns success), release.
pub async fn run_delete<F, Fut>(
    manager: &CacheManager,
    caps: &CacheCapabilities,
    deadline: Option<Duration>,
    server_call: F,
) -> AuthzResult<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AuthzResult<()>>,
{
    with_deadline(deadline, async move {
        let grant = take_item_lock(
            manager.provider(),
            manager.sentinel_manager(),
            caps,
            SentinelKind::Delete,
        )
        .await?;
        let LockGrant::Granted { sentinel, keys, .. } = grant else {
            return Err(AuthzError::CacheContention(
                "could not acquire delete lock".to_string(),
            ));
        };

        let result = server_call().await;

        if result.is_ok() {
            if let Some(primary) = &caps.primary_key {
                let _ = manager.provider().delete_value(primary).await;
            }
            for key in &caps.secondary_keys {
                let _ = manager.provider().delete_value(key).await;
            }
            if let Some(global) = &caps.global_collection_key {
                let _ = manager.provider().delete_value(global).await;
            }
            if let Some(per_item) = &caps.per_item_collection_key {
                let _ = manager.provider().delete_value(per_item).await;
            }
        }

        release_sentinel(manager.provider(), &keys, &sentinel).await?;
        result
    })
    .await
}

/// Read-through: serve from cache unless `bypass_cache`; on miss, install
/// a Read sentinel, call the server, and commit its reply under that
/// sentinel before releasing it.
pub async fn run_read<T, F, Fut>(
    manager: &CacheManager,
    caps: &CacheCapabilities,
    bypass_cache: bool,
    deadline: Option<Duration>,
    server_call: F,
) -> AuthzResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AuthzResult<T>>,
{
    with_deadline(deadline, async move {
        let Some(primary_key) = caps.primary_key.clone() else {
            return server_call().await;
        };

        if !bypass_cache {
            if let GetItemOutcome::Hit(value) = get_item(
                manager.provider(),
                manager.sentinel_manager(),
                &primary_key,
                false,
                caps.ttl,
                manager.metrics(),
            )
            .await?
            {
                return Ok(serde_json::from_str(&value)?);
            }
        }

        let outcome = if bypass_cache {
            GetItemOutcome::Miss
        } else {
            get_item(
                manager.provider(),
                manager.sentinel_manager(),
                &primary_key,
                true,
                manager.sentinel_ttl(),
                manager.metrics(),
            )
            .await?
        };

        let result = server_call().await;

        if let GetItemOutcome::MissWithSentinel(sentinel) = outcome {
            if let Ok(value) = &result {
                let serialized = serde_json::to_string(value)?;
                let _ = save_item(
                    manager.provider(),
                    manager.sentinel_manager(),
                    caps,
                    &sentinel,
                    &serialized,
                    false,
                    &[],
                    manager.metrics(),
                )
                .await;
            }
            release_sentinel(manager.provider(), &[primary_key], &sentinel).await?;
        }

        result
    })
    .await
}
