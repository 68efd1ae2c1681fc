//! `CacheManager`: glues a `CacheProvider`, the `KeyNameProvider`, the
//! `SentinelManager`, and per-kind TTLs together, and builds the
//! `CacheCapabilities` record for each entity kind per spec §4.5. The
//! `client` layer drives `cache::ops` functions through this rather than
//! touching `CacheProvider` directly.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::keys::{KeyNameProvider, KeyRole};
use crate::sentinel::SentinelManager;

use super::capabilities::CacheCapabilities;
use super::metrics::{CacheMetrics, CacheStatsSnapshot};
use super::provider::CacheProvider;

pub struct CacheManager {
    provider: Arc<dyn CacheProvider>,
    keys: KeyNameProvider,
    sentinel_mgr: SentinelManager,
    metrics: CacheMetrics,
    config: CacheConfig,
}

impl CacheManager {
    pub fn new(provider: Arc<dyn CacheProvider>, config: CacheConfig) -> Self {
        let keys = KeyNameProvider::new(&config.tenant);
        Self {
            provider,
            keys,
            sentinel_mgr: SentinelManager::new(),
            metrics: CacheMetrics::default(),
            config,
        }
    }

    /// Prefix covering every key this tenant could have written, suitable
    /// for a scoped `CacheProvider::flush`.
    pub fn tenant_prefix(&self) -> String {
        self.keys.tenant_prefix()
    }

    pub fn provider(&self) -> &dyn CacheProvider {
        self.provider.as_ref()
    }

    pub fn key_names(&self) -> &KeyNameProvider {
        &self.keys
    }

    pub fn sentinel_manager(&self) -> &SentinelManager {
        &self.sentinel_mgr
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.metrics.snapshot()
    }

    /// ObjectType and EdgeType declare no dependency keys: deleting a type
    /// flushes the whole tenant cache instead of tracking a blast radius
    /// that large (spec §4.5).
    pub fn object_type_capabilities(&self, id: &Uuid, type_name: &str) -> CacheCapabilities {
        CacheCapabilities {
            primary_key: Some(self.keys.name(KeyRole::Primary {
                kind: "object_type",
                id,
            })),
            secondary_keys: vec![self.keys.name(KeyRole::SecondaryByName {
                kind: "object_type",
                name: type_name,
            })],
            global_collection_key: Some(
                self.keys.name(KeyRole::GlobalCollection { kind: "object_type" }),
            ),
            per_item_collection_key: None,
            dependencies_key: Some(self.keys.name(KeyRole::DependencySet {
                kind: "object_type",
                id,
            })),
            dependency_keys: Vec::new(),
            is_modified_key: Some(self.keys.name(KeyRole::IsModified {
                kind: "object_type",
                id,
            })),
            ttl: self.config.object_type_ttl,
        }
    }

    pub fn edge_type_capabilities(
        &self,
        id: &Uuid,
        type_name: &str,
        organization_id: &Uuid,
    ) -> CacheCapabilities {
        CacheCapabilities {
            primary_key: Some(self.keys.name(KeyRole::Primary {
                kind: "edge_type",
                id,
            })),
            secondary_keys: vec![self.keys.name(KeyRole::SecondaryByNameInOrg {
                kind: "edge_type",
                name: type_name,
                organization_id,
            })],
            global_collection_key: Some(
                self.keys.name(KeyRole::GlobalCollection { kind: "edge_type" }),
            ),
            per_item_collection_key: None,
            dependencies_key: Some(self.keys.name(KeyRole::DependencySet {
                kind: "edge_type",
                id,
            })),
            dependency_keys: Vec::new(),
            is_modified_key: Some(self.keys.name(KeyRole::IsModified {
                kind: "edge_type",
                id,
            })),
            ttl: self.config.edge_type_ttl,
        }
    }

    pub fn organization_capabilities(&self, id: &Uuid) -> CacheCapabilities {
        CacheCapabilities {
            primary_key: Some(self.keys.name(KeyRole::Primary {
                kind: "organization",
                id,
            })),
            secondary_keys: Vec::new(),
            global_collection_key: Some(
                self.keys.name(KeyRole::GlobalCollection { kind: "organization" }),
            ),
            per_item_collection_key: None,
            dependencies_key: Some(self.keys.name(KeyRole::DependencySet {
                kind: "organization",
                id,
            })),
            dependency_keys: Vec::new(),
            is_modified_key: None,
            ttl: self.config.organization_ttl,
        }
    }

    /// Objects have no dependency keys of their own (nothing they depend
    /// on), but other entities (edges, path nodes) depend on them, so
    /// they still carry a `dependencies_key`.
    pub fn object_capabilities(
        &self,
        id: &Uuid,
        type_id: &Uuid,
        alias: &str,
        organization_id: &Uuid,
    ) -> CacheCapabilities {
        let mut secondary_keys = Vec::new();
        if !alias.is_empty() {
            secondary_keys.push(self.keys.name(KeyRole::SecondaryByAlias {
                type_id,
                alias,
                organization_id,
            }));
        }

        CacheCapabilities {
            primary_key: Some(self.keys.name(KeyRole::Primary { kind: "object", id })),
            secondary_keys,
            global_collection_key: Some(self.keys.name(KeyRole::GlobalCollection { kind: "object" })),
            per_item_collection_key: Some(self.keys.name(KeyRole::ObjectEdgeCollection { object_id: id })),
            dependencies_key: Some(self.keys.name(KeyRole::DependencySet { kind: "object", id })),
            dependency_keys: Vec::new(),
            is_modified_key: Some(self.keys.name(KeyRole::IsModified { kind: "object", id })),
            ttl: self.config.object_ttl,
        }
    }

    /// An edge depends on its source and target objects' dependency keys
    /// plus its own (spec §4.5), so that invalidating either endpoint, or
    /// the edge itself, clears any derived collection the edge was
    /// registered under.
    pub fn edge_capabilities(
        &self,
        id: &Uuid,
        source_object_id: &Uuid,
        target_object_id: &Uuid,
        edge_type_id: &Uuid,
    ) -> CacheCapabilities {
        let dependencies_key = self.keys.name(KeyRole::DependencySet { kind: "edge", id });
        let dependency_keys = vec![
            self.keys.name(KeyRole::DependencySet {
                kind: "object",
                id: source_object_id,
            }),
            self.keys.name(KeyRole::DependencySet {
                kind: "object",
                id: target_object_id,
            }),
            dependencies_key.clone(),
        ];

        CacheCapabilities {
            primary_key: Some(self.keys.name(KeyRole::Primary { kind: "edge", id })),
            secondary_keys: vec![self.keys.name(KeyRole::EdgeByEndpoints {
                source_object_id,
                target_object_id,
                edge_type_id,
            })],
            global_collection_key: Some(self.keys.name(KeyRole::GlobalCollection { kind: "edge" })),
            per_item_collection_key: Some(self.keys.name(KeyRole::PairwiseEdgeCollection {
                source_object_id,
                target_object_id,
            })),
            dependencies_key: Some(dependencies_key),
            dependency_keys,
            is_modified_key: Some(self.keys.name(KeyRole::IsModified { kind: "edge", id })),
            ttl: self.config.edge_ttl,
        }
    }

    /// An attribute-path result depends on every object and edge hop in
    /// the path (spec §4.5); it is never cached under its own primary
    /// key, only these dependency keys plus the attribute-path key
    /// itself participate.
    pub fn attribute_path_dependency_keys(&self, hops: &[crate::model::AttributePathNode]) -> Vec<String> {
        let mut keys = Vec::with_capacity(hops.len() * 2);
        for hop in hops {
            keys.push(self.keys.name(KeyRole::DependencySet {
                kind: "object",
                id: &hop.object_id,
            }));
            keys.push(self.keys.name(KeyRole::DependencySet {
                kind: "edge",
                id: &hop.edge_id,
            }));
        }
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn sentinel_ttl(&self) -> Duration {
        self.config.sentinel_ttl
    }

    pub fn tombstone_ttl(&self) -> Duration {
        self.config.tombstone_ttl
    }

    pub fn edge_ttl(&self) -> Duration {
        self.config.edge_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::local::LocalCacheProvider;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(LocalCacheProvider::new()), CacheConfig::default())
    }

    #[test]
    fn object_type_has_no_dependency_keys() {
        let mgr = manager();
        let caps = mgr.object_type_capabilities(&Uuid::new_v4(), "document");
        assert!(caps.dependency_keys.is_empty());
    }

    #[test]
    fn edge_depends_on_both_endpoints_and_itself() {
        let mgr = manager();
        let id = Uuid::new_v4();
        let caps = mgr.edge_capabilities(&id, &Uuid::new_v4(), &Uuid::new_v4(), &Uuid::new_v4());
        assert_eq!(caps.dependency_keys.len(), 3);
    }

    #[test]
    fn aliasless_object_has_no_secondary_key() {
        let mgr = manager();
        let caps = mgr.object_capabilities(&Uuid::new_v4(), &Uuid::new_v4(), "", &Uuid::new_v4());
        assert!(caps.secondary_keys.is_empty());
    }

    #[test]
    fn edge_type_secondary_key_is_scoped_by_organization() {
        let mgr = manager();
        let id = Uuid::new_v4();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let caps_a = mgr.edge_type_capabilities(&id, "owns", &org_a);
        let caps_b = mgr.edge_type_capabilities(&id, "owns", &org_b);
        assert_ne!(caps_a.secondary_keys, caps_b.secondary_keys);
    }
}
