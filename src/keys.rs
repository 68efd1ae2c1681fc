//! Key Name Provider: a pure, deterministic mapping from a typed role plus
//! its components to an opaque cache key string. No module outside this
//! one is allowed to hand-build a key; every other component goes through
//! `KeyNameProvider::name`. See spec §4.2.

use uuid::Uuid;

const NAMESPACE: &str = "authz";

/// The role a key plays, carrying exactly the components that role needs.
/// Variants intentionally mirror the cardinality of their cache key, so a
/// caller cannot accidentally transpose arguments across roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole<'a> {
    /// Primary record key, keyed by the entity's own id.
    Primary { kind: &'a str, id: &'a Uuid },
    /// Secondary key for lookup by name (object types), unique tenant-wide.
    SecondaryByName { kind: &'a str, name: &'a str },
    /// Secondary key for lookup by name, scoped to one organization (edge
    /// types: spec §3's "unique within org" invariant).
    SecondaryByNameInOrg {
        kind: &'a str,
        name: &'a str,
        organization_id: &'a Uuid,
    },
    /// Secondary key for object lookup by (type id, alias, org id).
    SecondaryByAlias {
        type_id: &'a Uuid,
        alias: &'a str,
        organization_id: &'a Uuid,
    },
    /// Global "list all of this kind" collection key.
    GlobalCollection { kind: &'a str },
    /// Edges sourced from or targeting a single object.
    ObjectEdgeCollection { object_id: &'a Uuid },
    /// Edges between an ordered pair of objects.
    PairwiseEdgeCollection {
        source_object_id: &'a Uuid,
        target_object_id: &'a Uuid,
    },
    /// A single edge identified by (source, target, edge type) rather than
    /// its own id — the shape callers usually have on hand.
    EdgeByEndpoints {
        source_object_id: &'a Uuid,
        target_object_id: &'a Uuid,
        edge_type_id: &'a Uuid,
    },
    /// Cached result of an attribute evaluation along one path.
    AttributePath {
        source_object_id: &'a Uuid,
        target_object_id: &'a Uuid,
        attribute_name: &'a str,
    },
    /// The dependency set attached to a given id (spec §4.4): the set of
    /// keys that must be invalidated when that id's entity changes.
    DependencySet { kind: &'a str, id: &'a Uuid },
    /// Marks a collection key as modified since some reader's snapshot.
    IsModified { kind: &'a str, id: &'a Uuid },
}

/// Builds cache keys from roles, scoped to one tenant. Cheap to construct
/// and share across threads; holds only the tenant's encoded namespace
/// segment.
#[derive(Debug, Clone)]
pub struct KeyNameProvider {
    namespace: String,
}

impl Default for KeyNameProvider {
    fn default() -> Self {
        Self::new("default")
    }
}

impl KeyNameProvider {
    /// `tenant` is percent-encoded and becomes the second namespace
    /// segment of every key this provider builds (spec §4.2: "base prefix
    /// encodes tenant"), so two tenants sharing one backend never collide
    /// and `flush(prefix, ...)` can scope to exactly one of them via
    /// `tenant_prefix()`.
    pub fn new(tenant: impl AsRef<str>) -> Self {
        Self {
            namespace: format!("{NAMESPACE}:{}", encode(tenant.as_ref())),
        }
    }

    /// Prefix covering every key this provider could ever build; pass to
    /// `CacheProvider::flush` to scope a bulk invalidation to this tenant.
    pub fn tenant_prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    pub fn name(&self, role: KeyRole<'_>) -> String {
        let ns = &self.namespace;
        match role {
            KeyRole::Primary { kind, id } => format!("{ns}:{kind}:id:{id}"),
            KeyRole::SecondaryByName { kind, name } => {
                format!("{ns}:{kind}:name:{}", encode(name))
            }
            KeyRole::SecondaryByNameInOrg {
                kind,
                name,
                organization_id,
            } => format!(
                "{ns}:{kind}:name:{}:{organization_id}",
                encode(name)
            ),
            KeyRole::SecondaryByAlias {
                type_id,
                alias,
                organization_id,
            } => format!(
                "{ns}:object:alias:{type_id}:{}:{organization_id}",
                encode(alias)
            ),
            KeyRole::GlobalCollection { kind } => format!("{ns}:{kind}:all"),
            KeyRole::ObjectEdgeCollection { object_id } => {
                format!("{ns}:edge:by-object:{object_id}")
            }
            KeyRole::PairwiseEdgeCollection {
                source_object_id,
                target_object_id,
            } => format!(
                "{ns}:edge:pair:{source_object_id}:{target_object_id}"
            ),
            KeyRole::EdgeByEndpoints {
                source_object_id,
                target_object_id,
                edge_type_id,
            } => format!(
                "{ns}:edge:endpoints:{source_object_id}:{target_object_id}:{edge_type_id}"
            ),
            KeyRole::AttributePath {
                source_object_id,
                target_object_id,
                attribute_name,
            } => format!(
                "{ns}:attr:{source_object_id}:{target_object_id}:{}",
                encode(attribute_name)
            ),
            KeyRole::DependencySet { kind, id } => format!("{ns}:{kind}:deps:{id}"),
            KeyRole::IsModified { kind, id } => format!("{ns}:{kind}:modified:{id}"),
        }
    }
}

/// Cache keys are structured on `:`; any component value that might itself
/// contain the separator (names, aliases, attribute names are
/// user-supplied) gets percent-encoded so the key stays unambiguous.
fn encode(component: &str) -> String {
    urlencoding::encode(component).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_is_stable_for_same_id() {
        let id = Uuid::new_v4();
        let kp = KeyNameProvider::new("tenant-a");
        let a = kp.name(KeyRole::Primary {
            kind: "object",
            id: &id,
        });
        let b = kp.name(KeyRole::Primary {
            kind: "object",
            id: &id,
        });
        assert_eq!(a, b);
    }

    #[test]
    fn different_kinds_never_collide_on_same_id() {
        let id = Uuid::new_v4();
        let kp = KeyNameProvider::new("tenant-a");
        let object_key = kp.name(KeyRole::Primary {
            kind: "object",
            id: &id,
        });
        let edge_key = kp.name(KeyRole::Primary {
            kind: "edge",
            id: &id,
        });
        assert_ne!(object_key, edge_key);
    }

    #[test]
    fn alias_component_with_separator_is_encoded() {
        let kp = KeyNameProvider::new("tenant-a");
        let key = kp.name(KeyRole::SecondaryByAlias {
            type_id: &Uuid::new_v4(),
            alias: "weird:alias",
            organization_id: &Uuid::new_v4(),
        });
        assert!(!key.replacen("authz:tenant-a:object:alias:", "", 1).contains("weird:alias"));
    }

    #[test]
    fn edge_type_name_is_scoped_by_organization() {
        let kp = KeyNameProvider::new("tenant-a");
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let a = kp.name(KeyRole::SecondaryByNameInOrg {
            kind: "edge_type",
            name: "owns",
            organization_id: &org_a,
        });
        let b = kp.name(KeyRole::SecondaryByNameInOrg {
            kind: "edge_type",
            name: "owns",
            organization_id: &org_b,
        });
        assert_ne!(a, b);
    }

    #[test]
    fn tenant_prefix_separates_two_tenants() {
        let id = Uuid::new_v4();
        let a = KeyNameProvider::new("tenant-a");
        let b = KeyNameProvider::new("tenant-b");
        let key_a = a.name(KeyRole::Primary { kind: "object", id: &id });
        assert!(key_a.starts_with(&a.tenant_prefix()));
        assert!(!key_a.starts_with(&b.tenant_prefix()));
    }

    #[test]
    fn pairwise_edge_collection_is_order_sensitive() {
        let kp = KeyNameProvider::new("tenant-a");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let forward = kp.name(KeyRole::PairwiseEdgeCollection {
            source_object_id: &a,
            target_object_id: &b,
        });
        let backward = kp.name(KeyRole::PairwiseEdgeCollection {
            source_object_id: &b,
            target_object_id: &a,
        });
        assert_ne!(forward, backward);
    }

    #[test]
    fn dependency_set_and_primary_key_never_collide() {
        let id = Uuid::new_v4();
        let kp = KeyNameProvider::new("tenant-a");
        let primary = kp.name(KeyRole::Primary {
            kind: "object",
            id: &id,
        });
        let deps = kp.name(KeyRole::DependencySet {
            kind: "object",
            id: &id,
        });
        assert_ne!(primary, deps);
    }
}
