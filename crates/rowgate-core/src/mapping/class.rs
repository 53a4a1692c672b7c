//! Class mapping information.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::property::PropertyMappingInformation;

/// Whether the persistence provider accesses state through fields or accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Field,
    Property,
}

/// Mapping of one entity type.
///
/// Inheritance is an explicit parent pointer: property lookup falls back
/// through the superclass chain.
#[derive(Debug)]
pub struct ClassMappingInformation {
    pub(crate) entity_name: String,
    pub(crate) type_name: String,
    pub(crate) superclass: Option<Arc<ClassMappingInformation>>,
    pub(crate) id_properties: Vec<String>,
    pub(crate) access_mode: AccessMode,
    pub(crate) properties: IndexMap<String, PropertyMappingInformation>,
}

impl ClassMappingInformation {
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Host type name, e.g. `org.example.Contact`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Host type name without package or module path.
    pub fn simple_type_name(&self) -> &str {
        let after_dot = self.type_name.rsplit('.').next().unwrap_or(&self.type_name);
        after_dot.rsplit("::").next().unwrap_or(after_dot)
    }

    /// The decapitalized simple type name, used as default alias.
    pub fn default_alias(&self) -> String {
        let simple = self.simple_type_name();
        let mut chars = simple.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn superclass(&self) -> Option<&Arc<ClassMappingInformation>> {
        self.superclass.as_ref()
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Identifier property names; inherited when the class declares none.
    pub fn id_property_names(&self) -> &[String] {
        if self.id_properties.is_empty() {
            if let Some(superclass) = &self.superclass {
                return superclass.id_property_names();
            }
        }
        &self.id_properties
    }

    /// Properties declared on this class only.
    pub fn declared_properties(&self) -> impl Iterator<Item = &PropertyMappingInformation> {
        self.properties.values()
    }

    /// Look up a property on this class or its ancestors.
    pub fn property(&self, name: &str) -> Option<&PropertyMappingInformation> {
        match self.properties.get(name) {
            Some(property) => Some(property),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.property(name)),
        }
    }

    /// All property names, ancestors first.
    pub fn property_names(&self) -> Vec<&str> {
        let mut names = match &self.superclass {
            Some(superclass) => superclass.property_names(),
            None => Vec::new(),
        };
        for name in self.properties.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Whether this class is `entity_name` or inherits from it.
    pub fn is_assignable_to(&self, entity_name: &str) -> bool {
        if self.entity_name == entity_name {
            return true;
        }
        self.superclass
            .as_ref()
            .is_some_and(|superclass| superclass.is_assignable_to(entity_name))
    }

    /// The topmost ancestor (or this class).
    pub fn root_entity_name(&self) -> &str {
        match &self.superclass {
            Some(superclass) => superclass.root_entity_name(),
            None => &self.entity_name,
        }
    }
}
