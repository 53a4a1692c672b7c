//! Entity mapping declarations.
//!
//! Each entity lists its properties and, optionally, the access it grants
//! through role declarations and permit expressions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::access::AccessType;
use crate::mapping::{AccessMode, CascadeType, FetchType};

/// One mapped entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name used in queries and rules.
    pub name: String,

    /// Host type name; defaults to the entity name.
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,

    #[serde(default)]
    pub superclass: Option<String>,

    #[serde(default)]
    pub access: AccessMode,

    /// Identifier property names.
    #[serde(default)]
    pub id: Vec<String>,

    /// Properties in declaration order.
    #[serde(default)]
    pub properties: IndexMap<String, PropertyConfig>,

    /// Role-based grants.
    #[serde(default)]
    pub roles_allowed: Vec<RolesAllowedConfig>,

    /// Predicate-based grants.
    #[serde(default)]
    pub permit: Vec<PermitConfig>,
}

/// How a configured property relates to other types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKindConfig {
    #[default]
    Basic,
    One,
    Many,
    Map,
}

/// One property of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConfig {
    /// Basic type name or target entity name.
    #[serde(rename = "type")]
    pub property_type: String,

    #[serde(default)]
    pub kind: PropertyKindConfig,

    /// Key type for map-valued properties.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub fetch: Option<FetchType>,

    #[serde(default)]
    pub cascade: Vec<CascadeType>,

    #[serde(default)]
    pub version: bool,

    #[serde(default)]
    pub generated: bool,
}

/// Grants `access` to every principal holding one of `roles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesAllowedConfig {
    pub roles: Vec<String>,

    #[serde(default = "default_access")]
    pub access: Vec<AccessType>,
}

/// Grants `access` where the expression holds.
///
/// The expression is written against the entity without an alias
/// (`owner = CURRENT_PRINCIPAL`), or as a complete GRANT statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermitConfig {
    #[serde(rename = "where")]
    pub rule: String,

    #[serde(default = "default_access")]
    pub access: Vec<AccessType>,
}

fn default_access() -> Vec<AccessType> {
    AccessType::ALL.to_vec()
}
