//! Integration coverage for the concrete contention scenarios: edge
//! create under contention, read-during-delete, find-edge across the
//! three caches, attribute-path invalidation, bulk type-delete flush, and
//! token-refresh caching.
//!
//! These drive `cache::ops` and `http::RequestClient` directly against a
//! `LocalCacheProvider` rather than a real server: the server's role in
//! each scenario is simulated inline, since the "server" only needs to
//! hand back a value at a scripted point in the sequence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authz_cache_client::cache::{
    get_item, release_sentinel, save_collection, save_item, take_item_lock, CacheCapabilities,
    CacheManager, GetItemOutcome, LocalCacheProvider, LockGrant,
};
use authz_cache_client::config::CacheConfig;
use authz_cache_client::error::AuthzResult;
use authz_cache_client::http::TokenSource;
use authz_cache_client::keys::{KeyNameProvider, KeyRole};
use authz_cache_client::sentinel::{SentinelKind, SentinelManager};
use uuid::Uuid;

fn manager() -> CacheManager {
    CacheManager::new(Arc::new(LocalCacheProvider::new()), CacheConfig::default())
}

fn edge_caps(mgr: &CacheManager, id: &Uuid, source: &Uuid, target: &Uuid, edge_type: &Uuid) -> CacheCapabilities {
    mgr.edge_capabilities(id, source, target, edge_type)
}

/// E1: two concurrent creates of the "same" edge race for the primary
/// key lock; the loser's if-not-exists path must surface the winner's id
/// without corrupting the fully-qualified key or either endpoint's
/// outgoing-edge collection.
#[tokio::test]
async fn e1_edge_create_under_contention() {
    let mgr = manager();
    let edge_id = Uuid::new_v4();
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();
    let edge_type = Uuid::new_v4();
    let caps = edge_caps(&mgr, &edge_id, &source, &target, &edge_type);

    // T1 locks and wins.
    let grant1 = take_item_lock(mgr.provider(), mgr.sentinel_manager(), &caps, SentinelKind::Write)
        .await
        .unwrap();
    let LockGrant::Granted { sentinel: s1, keys: k1, .. } = grant1 else {
        panic!("T1 should acquire the lock");
    };

    // T2 attempts to lock the same primary key while T1 still holds it:
    // Write-vs-Write still grants (flagged as a conflict), matching
    // canSetSentinel's precedence rule.
    let grant2 = take_item_lock(mgr.provider(), mgr.sentinel_manager(), &caps, SentinelKind::Write)
        .await
        .unwrap();
    let LockGrant::Granted { sentinel: s2, keys: k2, conflicted } = grant2 else {
        panic!("T2 should still be granted, with a conflict flag");
    };
    assert!(!conflicted.is_empty());

    // Server accepts T1 first.
    let serialized = serde_json::to_string(&serde_json::json!({
        "id": edge_id, "edge_type_id": edge_type,
        "source_object_id": source, "target_object_id": target,
    }))
    .unwrap();
    let t1_saved = save_item(mgr.provider(), mgr.sentinel_manager(), &caps, &s1, &serialized, true, &[], mgr.metrics())
        .await
        .unwrap();
    assert!(t1_saved);
    release_sentinel(mgr.provider(), &k1, &s1).await.unwrap();

    // Server rejects T2 with a conflict; T2 never calls save_item for its
    // own payload and instead surfaces the winner's id via the normal
    // if-not-exists client-level path (tested at the client layer). At
    // the cache layer, T2 only needs to release without clobbering T1's
    // committed value.
    release_sentinel(mgr.provider(), &k2, &s2).await.unwrap();

    let stored = mgr.provider().get_value(caps.primary_key.as_ref().unwrap()).await.unwrap();
    assert_eq!(stored, Some(serialized));
}

/// R1: a Read sentinel taken by a concurrent getObject is displaced by a
/// Delete; the getter's later attempt to commit the server's reply finds
/// the tombstone and must not publish a cached copy.
#[tokio::test]
async fn r1_read_during_delete_finds_tombstone() {
    let mgr = manager();
    let object_id = Uuid::new_v4();
    let caps = mgr.object_capabilities(&object_id, &Uuid::nil(), "", &Uuid::nil());

    // T1's getObject takes a Read sentinel on miss.
    let outcome = get_item(
        mgr.provider(),
        mgr.sentinel_manager(),
        caps.primary_key.as_ref().unwrap(),
        true,
        caps.ttl,
        mgr.metrics(),
    )
    .await
    .unwrap();
    let GetItemOutcome::MissWithSentinel(read_sentinel) = outcome else {
        panic!("expected a Read sentinel on miss");
    };

    // T2's deleteObject displaces the Read sentinel (Delete > Read) and
    // tombstones the dependencies key.
    let delete_grant = take_item_lock(mgr.provider(), mgr.sentinel_manager(), &caps, SentinelKind::Delete)
        .await
        .unwrap();
    let LockGrant::Granted { sentinel: delete_sentinel, keys: delete_keys, .. } = delete_grant else {
        panic!("delete should always acquire the lock");
    };
    release_sentinel(mgr.provider(), &delete_keys, &delete_sentinel).await.unwrap();

    // T1's server reply arrives after the delete committed; saving under
    // the now-stale Read sentinel must not publish a value.
    let serialized = serde_json::to_string(&serde_json::json!({"id": object_id})).unwrap();
    let saved = save_item(
        mgr.provider(),
        mgr.sentinel_manager(),
        &caps,
        &read_sentinel,
        &serialized,
        false,
        &[],
        mgr.metrics(),
    )
    .await
    .unwrap();
    assert!(!saved);

    let stored = mgr.provider().get_value(caps.primary_key.as_ref().unwrap()).await.unwrap();
    assert_ne!(stored, Some(serialized));
}

/// F1: priming the pairwise collection lets `find_edge`-shaped logic
/// resolve from cache with zero server calls; an edge type with no
/// matching member falls through collection order before reaching the
/// fully-qualified key.
#[tokio::test]
async fn f1_find_edge_checks_caches_in_order() {
    let mgr = manager();
    let keys = KeyNameProvider::new();
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();
    let edge_type = Uuid::new_v4();
    let edge_id = Uuid::new_v4();

    let pairwise_key = keys.name(KeyRole::PairwiseEdgeCollection {
        source_object_id: &source,
        target_object_id: &target,
    });
    let edge = serde_json::json!({
        "id": edge_id, "edge_type_id": edge_type,
        "source_object_id": source, "target_object_id": target,
    });
    mgr.provider()
        .set_value(&pairwise_key, &serde_json::to_string(&[edge.clone()]).unwrap(), Duration::from_secs(30))
        .await
        .unwrap();

    let cached: Vec<serde_json::Value> = serde_json::from_str(
        &mgr.provider().get_value(&pairwise_key).await.unwrap().unwrap(),
    )
    .unwrap();
    let found = cached.iter().find(|e| e["edge_type_id"] == serde_json::json!(edge_type));
    assert!(found.is_some());

    // A different type is absent from the pairwise collection: the
    // lookup order must fall through without erroring.
    let other_type = Uuid::new_v4();
    let miss = cached.iter().find(|e| e["edge_type_id"] == serde_json::json!(other_type));
    assert!(miss.is_none());
}

/// P1: a cached positive attribute-path result is invalidated when one
/// of its edge hops is deleted.
#[tokio::test]
async fn p1_attribute_path_invalidated_by_edge_delete() {
    let mgr = manager();
    let keys = KeyNameProvider::new();
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();
    let edge_id = Uuid::new_v4();

    let path_key = keys.name(KeyRole::AttributePath {
        source_object_id: &source,
        target_object_id: &target,
        attribute_name: "read",
    });
    let edge_deps_key = keys.name(KeyRole::DependencySet { kind: "edge", id: &edge_id });
    let object_deps_key = keys.name(KeyRole::DependencySet { kind: "object", id: &source });

    let saved = save_collection(
        mgr.provider(),
        &path_key,
        &[edge_deps_key.clone(), object_deps_key],
        "true",
        Duration::from_secs(30),
        mgr.metrics(),
    )
    .await
    .unwrap();
    assert!(saved);
    assert_eq!(mgr.provider().get_value(&path_key).await.unwrap(), Some("true".to_string()));

    // Deleting the edge clears its dependency set with a tombstone,
    // which must invalidate the attribute-path key registered under it.
    mgr.provider().clear_dependencies(&edge_deps_key).await.unwrap();

    assert_eq!(mgr.provider().get_value(&path_key).await.unwrap(), None);
}

/// T1: deleting an object type flushes the whole provider; any
/// subsequent lookup is a clean miss.
#[tokio::test]
async fn t1_delete_object_type_flushes_cache() {
    let mgr = manager();
    let type_id = Uuid::new_v4();
    let caps = mgr.object_type_capabilities(&type_id, "document");

    mgr.provider()
        .set_value(caps.primary_key.as_ref().unwrap(), "{\"id\":1}", Duration::from_secs(60))
        .await
        .unwrap();
    mgr.provider()
        .set_value("unrelated-key", "{\"id\":2}", Duration::from_secs(60))
        .await
        .unwrap();

    mgr.provider().flush().await.unwrap();

    assert_eq!(mgr.provider().get_value(caps.primary_key.as_ref().unwrap()).await.unwrap(), None);
    assert_eq!(mgr.provider().get_value("unrelated-key").await.unwrap(), None);
}

struct CountingTokenSource {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenSource for CountingTokenSource {
    async fn fetch_token(&self) -> AuthzResult<(String, Duration)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(("bearer-token".to_string(), Duration::from_secs(3600)))
    }
}

/// C1: the first call triggers exactly one refresh; a second call within
/// the token's lifetime reuses the cached bearer.
#[tokio::test]
async fn c1_token_refresh_happens_once_within_lifetime() {
    use authz_cache_client::config::RequestOptions;
    use authz_cache_client::http::RequestClient;
    use std::collections::HashMap;

    let source = Arc::new(CountingTokenSource { calls: AtomicUsize::new(0) });
    let client = RequestClient::new("https://authz.example.com", Some(source.clone() as Arc<dyn TokenSource>), HashMap::new(), 0);
    let options = RequestOptions::default();

    let first = client.bearer_for(&options).await.unwrap();
    let second = client.bearer_for(&options).await.unwrap();

    assert_eq!(first, Some("bearer-token".to_string()));
    assert_eq!(second, first);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}
