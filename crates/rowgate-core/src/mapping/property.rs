//! Property mapping information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::access_strategy::{FieldAccessStrategy, PropertyAccessStrategy};
use crate::value::{EntityRef, Value};

/// How a property relates to other mapped types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// A basic value (string, number, date, ...).
    Basic,
    /// A to-one relationship.
    SingleValued,
    /// A to-many relationship or element collection.
    CollectionValued,
    /// A map keyed by `key_type`.
    MapValued { key_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchType {
    #[default]
    Lazy,
    Eager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CascadeType {
    Persist,
    Merge,
    Remove,
    Refresh,
    Detach,
    All,
}

/// Describes one mapped property.
#[derive(Debug, Clone)]
pub struct PropertyMappingInformation {
    name: String,
    property_type: String,
    kind: PropertyKind,
    fetch_type: FetchType,
    cascade: BTreeSet<CascadeType>,
    id: bool,
    version: bool,
    generated: bool,
    access: Arc<dyn PropertyAccessStrategy>,
}

impl PropertyMappingInformation {
    fn new(name: impl Into<String>, property_type: impl Into<String>, kind: PropertyKind) -> Self {
        let name = name.into();
        let fetch_type = match kind {
            PropertyKind::Basic | PropertyKind::SingleValued => FetchType::Eager,
            PropertyKind::CollectionValued | PropertyKind::MapValued { .. } => FetchType::Lazy,
        };
        Self {
            access: Arc::new(FieldAccessStrategy::new(name.clone())),
            name,
            property_type: property_type.into(),
            kind,
            fetch_type,
            cascade: BTreeSet::new(),
            id: false,
            version: false,
            generated: false,
        }
    }

    /// A basic property of the given type name.
    pub fn basic(name: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self::new(name, property_type, PropertyKind::Basic)
    }

    /// A to-one relationship to `target`.
    pub fn single_valued(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, PropertyKind::SingleValued)
    }

    /// A collection of `element` (an entity name or basic type name).
    pub fn collection(name: impl Into<String>, element: impl Into<String>) -> Self {
        Self::new(name, element, PropertyKind::CollectionValued)
    }

    /// A map from `key_type` to `value_type`.
    pub fn map(
        name: impl Into<String>,
        key_type: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            value_type,
            PropertyKind::MapValued {
                key_type: key_type.into(),
            },
        )
    }

    pub fn with_fetch_type(mut self, fetch_type: FetchType) -> Self {
        self.fetch_type = fetch_type;
        self
    }

    pub fn with_cascade(mut self, cascade: impl IntoIterator<Item = CascadeType>) -> Self {
        self.cascade.extend(cascade);
        self
    }

    pub fn with_access_strategy(mut self, access: Arc<dyn PropertyAccessStrategy>) -> Self {
        self.access = access;
        self
    }

    pub fn as_id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn as_version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn as_generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub(crate) fn mark_id(&mut self) {
        self.id = true;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Basic type name, or target entity name for relationships. For
    /// collections and maps this is the element type.
    pub fn property_type(&self) -> &str {
        &self.property_type
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn is_relationship(&self) -> bool {
        !matches!(self.kind, PropertyKind::Basic)
    }

    pub fn is_single_valued(&self) -> bool {
        matches!(self.kind, PropertyKind::Basic | PropertyKind::SingleValued)
    }

    pub fn is_collection_valued(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::CollectionValued | PropertyKind::MapValued { .. }
        )
    }

    /// Key type of a map-valued property.
    pub fn key_type(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::MapValued { key_type } => Some(key_type),
            _ => None,
        }
    }

    pub fn fetch_type(&self) -> FetchType {
        self.fetch_type
    }

    pub fn cascade(&self) -> &BTreeSet<CascadeType> {
        &self.cascade
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_version(&self) -> bool {
        self.version
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn access_strategy(&self) -> &Arc<dyn PropertyAccessStrategy> {
        &self.access
    }

    /// Read this property from `target` through its access strategy.
    pub fn get_value(&self, target: &EntityRef) -> Value {
        self.access.get_value(target)
    }

    /// Write this property on `target` through its access strategy.
    pub fn set_value(&self, target: &EntityRef, value: Value) {
        self.access.set_value(target, value)
    }
}
