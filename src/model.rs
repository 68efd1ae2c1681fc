//! Entity types stored and cached by the coordinator.
//!
//! The core only stores and invalidates these; it never evaluates edge or
//! attribute semantics (`EdgeAttribute` is passed through opaquely).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AuthzError;

/// How an edge type's attribute is evaluated. The core never interprets
/// this; it is stored and handed back to the server as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSemantic {
    Direct,
    Inherit,
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttribute {
    pub name: String,
    pub semantic: AttributeSemantic,
}

/// Region an organization lives in. Validation is local (spec §7): an
/// unrecognized region string is a `Validation` error before any cache or
/// network action is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    Us,
    Eu,
    Apac,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Region::Us => "us",
            Region::Eu => "eu",
            Region::Apac => "apac",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Region {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "us" => Ok(Region::Us),
            "eu" => Ok(Region::Eu),
            "apac" => Ok(Region::Apac),
            other => Err(AuthzError::Validation(format!("invalid region: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub id: Uuid,
    pub type_name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeType {
    pub id: Uuid,
    pub type_name: String,
    pub source_object_type_id: Uuid,
    pub target_object_type_id: Uuid,
    pub attributes: Vec<EdgeAttribute>,
    pub organization_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub id: Uuid,
    /// Empty string is stored, not `None`, as "no alias" so that multiple
    /// objects without an alias can coexist under the same
    /// (type_id, org_id) secondary-key space. See DESIGN.md.
    pub alias: Option<String>,
    pub type_id: Uuid,
    pub organization_id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Object {
    /// The alias as stored at the secondary key: empty string for "no
    /// alias", never `None`, so the key namespace for aliasless objects is
    /// addressable and distinct from a literal empty-string alias.
    pub fn alias_key_component(&self) -> &str {
        self.alias.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub edge_type_id: Uuid,
    pub source_object_id: Uuid,
    pub target_object_id: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub region: Region,
}

/// Element of a computed permission path. Never stored under its own
/// primary key; only used to compute dependency keys for a cached
/// `check_attribute` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePathNode {
    pub object_id: Uuid,
    pub edge_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_round_trips() {
        for r in [Region::Us, Region::Eu, Region::Apac] {
            assert_eq!(r.to_string().parse::<Region>().unwrap(), r);
        }
    }

    #[test]
    fn invalid_region_is_validation_error() {
        let err = "mars".parse::<Region>().unwrap_err();
        assert!(matches!(err, AuthzError::Validation(_)));
    }

    #[test]
    fn aliasless_object_uses_empty_string_component() {
        let obj = Object {
            id: Uuid::new_v4(),
            alias: None,
            type_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            created: Utc::now(),
            updated: Utc::now(),
        };
        assert_eq!(obj.alias_key_component(), "");
    }
}
