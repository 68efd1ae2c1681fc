//! The per-entity "polymorphism record": everything `cache::ops` needs to
//! know about one entity kind's key shape, without `cache::ops` itself
//! knowing anything about objects, edges, or organizations. Grounded in
//! the teacher's preference for small config structs with `Default` impls
//! over trait-object dispatch (`LockConfig`, `StrategyConfig` in
//! `enterprise/cache`).

use std::time::Duration;

/// Absent roles are `None` / empty and are simply skipped by every
/// `cache::ops` function — an entity kind that has no secondary keys
/// passes an empty `Vec`, one with no per-item collection passes `None`.
#[derive(Debug, Clone, Default)]
pub struct CacheCapabilities {
    pub primary_key: Option<String>,
    pub secondary_keys: Vec<String>,
    pub global_collection_key: Option<String>,
    pub per_item_collection_key: Option<String>,
    pub dependencies_key: Option<String>,
    pub dependency_keys: Vec<String>,
    pub is_modified_key: Option<String>,
    pub ttl: Duration,
}

impl CacheCapabilities {
    /// Every key this capability record would lock for a Create/Update,
    /// in lock-acquisition order: primary, global collection, secondaries.
    pub fn item_lock_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        keys.extend(self.primary_key.clone());
        keys.extend(self.global_collection_key.clone());
        keys.extend(self.secondary_keys.iter().cloned());
        keys
    }

    /// Additional keys a Delete locks beyond `item_lock_keys`: the
    /// per-item collection and, unconditionally, the secondary keys
    /// (spec §4.4: "regardless of state").
    pub fn delete_lock_keys(&self) -> Vec<String> {
        let mut keys = self.item_lock_keys();
        keys.extend(self.per_item_collection_key.clone());
        keys
    }
}
