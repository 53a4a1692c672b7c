//! The mapping model.
//!
//! [`MappingInformation`] describes every mapped entity: its name, host type,
//! superclass, identifier and properties. It is built once, either through
//! [`MappingInformationBuilder`] or from [`crate::config::EntityConfig`]
//! declarations, and is immutable afterwards.

mod access_strategy;
mod class;
mod property;

pub use access_strategy::{AccessorAccessStrategy, FieldAccessStrategy, PropertyAccessStrategy};
pub use class::{AccessMode, ClassMappingInformation};
pub use property::{CascadeType, FetchType, PropertyKind, PropertyMappingInformation};

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{EntityConfig, PropertyKindConfig};
use crate::error::MappingError;
use crate::value::{EntityRef, Value};

/// Process-wide mapping of entity names and host types to class mappings.
#[derive(Debug, Default)]
pub struct MappingInformation {
    classes: IndexMap<String, Arc<ClassMappingInformation>>,
    types: HashMap<String, String>,
}

impl MappingInformation {
    pub fn builder() -> MappingInformationBuilder {
        MappingInformationBuilder::new()
    }

    /// Build the mapping from configuration declarations.
    pub fn from_config(entities: &[EntityConfig]) -> Result<Self, MappingError> {
        let mut builder = MappingInformationBuilder::new();
        for entity in entities {
            builder = builder.class(ClassDeclaration::from_config(entity));
        }
        builder.build()
    }

    /// Look up a class by entity name (case-sensitive).
    pub fn class_mapping(&self, entity_name: &str) -> Option<&Arc<ClassMappingInformation>> {
        self.classes.get(entity_name)
    }

    /// Look up a class by host type name.
    pub fn class_mapping_for_type(&self, type_name: &str) -> Option<&Arc<ClassMappingInformation>> {
        self.types
            .get(type_name)
            .and_then(|entity_name| self.classes.get(entity_name))
    }

    /// Look up the class of a runtime entity.
    pub fn class_mapping_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Option<&Arc<ClassMappingInformation>> {
        self.class_mapping(entity.entity_name())
    }

    /// All class mappings, in declaration order.
    pub fn class_mappings(&self) -> impl Iterator<Item = &Arc<ClassMappingInformation>> {
        self.classes.values()
    }

    /// The class and all of its descendants, in declaration order.
    pub fn subtree(&self, entity_name: &str) -> Vec<Arc<ClassMappingInformation>> {
        self.classes
            .values()
            .filter(|class| class.is_assignable_to(entity_name))
            .cloned()
            .collect()
    }

    /// Whether `sub` is `sup` or one of its subclasses.
    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        self.class_mapping(sub)
            .is_some_and(|class| class.is_assignable_to(sup))
    }

    /// Identifier values of an entity, if it is mapped and all are set.
    pub fn identifier(&self, entity: &EntityRef) -> Option<Vec<Value>> {
        let class = self.class_mapping_for_entity(entity)?;
        let id_names = class.id_property_names();
        if id_names.is_empty() {
            return None;
        }
        let mut values = Vec::with_capacity(id_names.len());
        for name in id_names {
            let value = class.property(name)?.get_value(entity);
            if value.is_null() {
                return None;
            }
            values.push(value);
        }
        Some(values)
    }

    /// Persistence identity: the same instance, or instances of the same
    /// inheritance root with equal, non-null identifiers.
    pub fn same_entity(&self, a: &EntityRef, b: &EntityRef) -> bool {
        if a.same_instance(b) {
            return true;
        }
        let (Some(class_a), Some(class_b)) = (
            self.class_mapping_for_entity(a),
            self.class_mapping_for_entity(b),
        ) else {
            return false;
        };
        if class_a.root_entity_name() != class_b.root_entity_name() {
            return false;
        }
        match (self.identifier(a), self.identifier(b)) {
            (Some(id_a), Some(id_b)) => id_a == id_b,
            _ => false,
        }
    }
}

/// Declaration of one class, consumed by [`MappingInformationBuilder`].
#[derive(Debug, Clone)]
pub struct ClassDeclaration {
    entity_name: String,
    type_name: Option<String>,
    superclass: Option<String>,
    id_properties: Vec<String>,
    access_mode: AccessMode,
    properties: Vec<PropertyMappingInformation>,
}

impl ClassDeclaration {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            type_name: None,
            superclass: None,
            id_properties: Vec::new(),
            access_mode: AccessMode::default(),
            properties: Vec::new(),
        }
    }

    /// Host type name; defaults to the entity name.
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn superclass(mut self, entity_name: impl Into<String>) -> Self {
        self.superclass = Some(entity_name.into());
        self
    }

    pub fn access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    /// Declare an identifier property (must be declared or inherited).
    pub fn id(mut self, property: impl Into<String>) -> Self {
        self.id_properties.push(property.into());
        self
    }

    pub fn property(mut self, property: PropertyMappingInformation) -> Self {
        self.properties.push(property);
        self
    }

    pub fn basic(self, name: impl Into<String>, property_type: impl Into<String>) -> Self {
        self.property(PropertyMappingInformation::basic(name, property_type))
    }

    pub fn single_valued(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.property(PropertyMappingInformation::single_valued(name, target))
    }

    pub fn collection(self, name: impl Into<String>, element: impl Into<String>) -> Self {
        self.property(PropertyMappingInformation::collection(name, element))
    }

    pub fn map(
        self,
        name: impl Into<String>,
        key_type: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        self.property(PropertyMappingInformation::map(name, key_type, value_type))
    }

    fn from_config(config: &EntityConfig) -> Self {
        let mut declaration = ClassDeclaration::new(&config.name).access_mode(config.access);
        if let Some(type_name) = &config.type_name {
            declaration = declaration.type_name(type_name);
        }
        if let Some(superclass) = &config.superclass {
            declaration = declaration.superclass(superclass);
        }
        for id in &config.id {
            declaration = declaration.id(id);
        }
        for (name, property) in &config.properties {
            let mut mapping = match property.kind {
                PropertyKindConfig::Basic => {
                    PropertyMappingInformation::basic(name, &property.property_type)
                }
                PropertyKindConfig::One => {
                    PropertyMappingInformation::single_valued(name, &property.property_type)
                }
                PropertyKindConfig::Many => {
                    PropertyMappingInformation::collection(name, &property.property_type)
                }
                PropertyKindConfig::Map => PropertyMappingInformation::map(
                    name,
                    property.key.as_deref().unwrap_or("String"),
                    &property.property_type,
                ),
            };
            if let Some(fetch) = property.fetch {
                mapping = mapping.with_fetch_type(fetch);
            }
            mapping = mapping.with_cascade(property.cascade.iter().copied());
            if property.version {
                mapping = mapping.as_version();
            }
            if property.generated {
                mapping = mapping.as_generated();
            }
            declaration = declaration.property(mapping);
        }
        declaration
    }
}

/// Builds an immutable [`MappingInformation`].
#[derive(Debug, Default)]
pub struct MappingInformationBuilder {
    declarations: Vec<ClassDeclaration>,
}

impl MappingInformationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, declaration: ClassDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Resolve superclasses and validate the declarations.
    pub fn build(self) -> Result<MappingInformation, MappingError> {
        let mut declared: HashMap<&str, &ClassDeclaration> = HashMap::new();
        for declaration in &self.declarations {
            if declared
                .insert(declaration.entity_name.as_str(), declaration)
                .is_some()
            {
                return Err(MappingError::DuplicateEntity {
                    entity: declaration.entity_name.clone(),
                });
            }
        }

        let mut built: HashMap<String, Arc<ClassMappingInformation>> = HashMap::new();
        for declaration in &self.declarations {
            let mut visiting = HashSet::new();
            build_class(&declaration.entity_name, &declared, &mut built, &mut visiting)?;
        }

        let mut mapping = MappingInformation::default();
        for declaration in &self.declarations {
            if let Some(class) = built.remove(&declaration.entity_name) {
                mapping
                    .types
                    .insert(class.type_name.clone(), class.entity_name.clone());
                mapping.classes.insert(class.entity_name.clone(), class);
            }
        }

        for class in mapping.classes.values() {
            for property in class.declared_properties() {
                if matches!(property.kind(), PropertyKind::SingleValued)
                    && !mapping.classes.contains_key(property.property_type())
                {
                    return Err(MappingError::UnknownTargetEntity {
                        entity: class.entity_name.clone(),
                        property: property.name().to_string(),
                        target: property.property_type().to_string(),
                    });
                }
            }
        }

        tracing::debug!(entities = mapping.classes.len(), "built mapping information");
        Ok(mapping)
    }
}

fn build_class(
    entity_name: &str,
    declared: &HashMap<&str, &ClassDeclaration>,
    built: &mut HashMap<String, Arc<ClassMappingInformation>>,
    visiting: &mut HashSet<String>,
) -> Result<Arc<ClassMappingInformation>, MappingError> {
    if let Some(class) = built.get(entity_name) {
        return Ok(class.clone());
    }
    if !visiting.insert(entity_name.to_string()) {
        return Err(MappingError::CyclicInheritance {
            entity: entity_name.to_string(),
        });
    }
    let declaration = declared[entity_name];

    let superclass = match &declaration.superclass {
        Some(superclass_name) => {
            if !declared.contains_key(superclass_name.as_str()) {
                return Err(MappingError::UnknownSuperclass {
                    entity: entity_name.to_string(),
                    superclass: superclass_name.clone(),
                });
            }
            Some(build_class(superclass_name, declared, built, visiting)?)
        }
        None => None,
    };

    let mut properties = IndexMap::new();
    for property in &declaration.properties {
        properties.insert(property.name().to_string(), property.clone());
    }
    for id in &declaration.id_properties {
        match properties.get_mut(id) {
            Some(property) => property.mark_id(),
            None => {
                let inherited = superclass
                    .as_ref()
                    .is_some_and(|superclass| superclass.property(id).is_some());
                if !inherited {
                    return Err(MappingError::UnknownIdProperty {
                        entity: entity_name.to_string(),
                        property: id.clone(),
                    });
                }
            }
        }
    }

    let class = Arc::new(ClassMappingInformation {
        entity_name: entity_name.to_string(),
        type_name: declaration
            .type_name
            .clone()
            .unwrap_or_else(|| entity_name.to_string()),
        superclass,
        id_properties: declaration.id_properties.clone(),
        access_mode: declaration.access_mode,
        properties,
    });
    built.insert(entity_name.to_string(), class.clone());
    Ok(class)
}
