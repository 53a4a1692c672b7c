//! Type definitions bound to identification variables.

use rowgate_core::ClassMappingInformation;
use rowgate_query::{Alias, Path};
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;

/// The type a path or alias resolves to.
#[derive(Clone)]
pub enum ResolvedType {
    /// A mapped entity.
    Entity(Arc<ClassMappingInformation>),
    /// A basic value of the named type.
    Basic(String),
    /// An entity type literal, as in `TYPE(x) = Dog`.
    EntityType(String),
    /// Not known statically (untyped external values, result variables).
    Unknown,
}

impl ResolvedType {
    pub fn class(&self) -> Option<&Arc<ClassMappingInformation>> {
        match self {
            ResolvedType::Entity(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, ResolvedType::Entity(_))
    }
}

impl fmt::Debug for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Entity(class) => write!(f, "Entity({})", class.entity_name()),
            ResolvedType::Basic(name) => write!(f, "Basic({})", name),
            ResolvedType::EntityType(name) => write!(f, "EntityType({})", name),
            ResolvedType::Unknown => f.write_str("Unknown"),
        }
    }
}

impl PartialEq for ResolvedType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResolvedType::Entity(a), ResolvedType::Entity(b)) => {
                a.entity_name() == b.entity_name()
            }
            (ResolvedType::Basic(a), ResolvedType::Basic(b)) => a == b,
            (ResolvedType::EntityType(a), ResolvedType::EntityType(b)) => a == b,
            (ResolvedType::Unknown, ResolvedType::Unknown) => true,
            _ => false,
        }
    }
}

/// The type bound to one alias.
///
/// A definition whose join root is not resolved yet is preliminary; it
/// becomes final exactly once.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    alias: Alias,
    resolved: Option<ResolvedType>,
    key_type: Option<String>,
    join_path: Option<Path>,
    outer: bool,
    fetch: bool,
}

impl TypeDefinition {
    /// A final definition of a range variable.
    pub fn range(alias: Alias, resolved: ResolvedType) -> Self {
        Self {
            alias,
            resolved: Some(resolved),
            key_type: None,
            join_path: None,
            outer: false,
            fetch: false,
        }
    }

    /// A preliminary definition of a join or derived range over `path`.
    pub fn join(alias: Alias, path: Path, outer: bool, fetch: bool) -> Self {
        Self {
            alias,
            resolved: None,
            key_type: None,
            join_path: Some(path),
            outer,
            fetch,
        }
    }

    /// A preliminary definition without join path (result variables).
    pub fn preliminary(alias: Alias) -> Self {
        Self {
            alias,
            resolved: None,
            key_type: None,
            join_path: None,
            outer: false,
            fetch: false,
        }
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    pub fn is_preliminary(&self) -> bool {
        self.resolved.is_none()
    }

    pub fn resolved_type(&self) -> Option<&ResolvedType> {
        self.resolved.as_ref()
    }

    pub fn class(&self) -> Option<&Arc<ClassMappingInformation>> {
        self.resolved.as_ref().and_then(ResolvedType::class)
    }

    /// Key type of a join over a map-valued property.
    pub fn key_type(&self) -> Option<&str> {
        self.key_type.as_deref()
    }

    pub fn join_path(&self) -> Option<&Path> {
        self.join_path.as_ref()
    }

    pub fn is_outer(&self) -> bool {
        self.outer
    }

    pub fn is_fetch(&self) -> bool {
        self.fetch
    }

    /// Fix the resolved type.
    pub fn finalize(
        &mut self,
        resolved: ResolvedType,
        key_type: Option<String>,
    ) -> Result<(), ResolveError> {
        if self.resolved.is_some() {
            return Err(ResolveError::TypeAlreadyFinal {
                alias: self.alias.to_string(),
            });
        }
        self.resolved = Some(resolved);
        self.key_type = key_type;
        Ok(())
    }
}

/// The aliases visible in one statement scope.
///
/// A subquery scope starts as a copy of the enclosing scope; aliases declared
/// in it shadow enclosing ones and do not leak outward.
#[derive(Debug, Clone, Default)]
pub struct TypeDefinitions {
    definitions: Vec<TypeDefinition>,
    local_start: usize,
}

impl TypeDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope seeded with this scope's aliases.
    pub fn nested(&self) -> Self {
        Self {
            definitions: self.definitions.clone(),
            local_start: self.definitions.len(),
        }
    }

    /// Add a definition; the alias must be new to this scope.
    pub fn declare(&mut self, definition: TypeDefinition) -> Result<(), ResolveError> {
        if self.definitions[self.local_start..]
            .iter()
            .any(|existing| existing.alias == definition.alias)
        {
            return Err(ResolveError::DuplicateAlias {
                alias: definition.alias.to_string(),
            });
        }
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, alias: &Alias) -> Option<&TypeDefinition> {
        self.definitions.iter().rev().find(|d| &d.alias == alias)
    }

    pub fn get_mut(&mut self, alias: &Alias) -> Option<&mut TypeDefinition> {
        self.definitions.iter_mut().rev().find(|d| &d.alias == alias)
    }

    pub fn get_by_name(&self, alias: &str) -> Option<&TypeDefinition> {
        self.definitions.iter().rev().find(|d| d.alias.matches(alias))
    }

    pub fn contains(&self, alias: &Alias) -> bool {
        self.get(alias).is_some()
    }

    /// All visible definitions, enclosing scopes first.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.definitions.iter()
    }

    /// Definitions declared in this scope only.
    pub fn local(&self) -> &[TypeDefinition] {
        &self.definitions[self.local_start..]
    }

    /// Whether `alias` is declared by an outer join.
    pub fn is_outer(&self, alias: &Alias) -> bool {
        self.get(alias).is_some_and(TypeDefinition::is_outer)
    }
}
