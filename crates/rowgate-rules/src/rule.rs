//! Compiled access rules.

use rowgate_core::{AccessType, ClassMappingInformation};
use rowgate_query::{AccessRuleStatement, Alias, Expr};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::types::TypeDefinitions;

/// A resolved, type-checked access rule.
///
/// The WHERE clause is always present (`TRUE` when the rule had none) and the
/// access type set is never empty.
#[derive(Debug, Clone)]
pub struct CompiledAccessRule {
    target: Arc<ClassMappingInformation>,
    access_types: BTreeSet<AccessType>,
    alias: Alias,
    where_clause: Expr,
    source: String,
    type_definitions: TypeDefinitions,
}

impl CompiledAccessRule {
    pub(crate) fn new(
        target: Arc<ClassMappingInformation>,
        access_types: BTreeSet<AccessType>,
        alias: Alias,
        where_clause: Expr,
        source: String,
        type_definitions: TypeDefinitions,
    ) -> Self {
        Self {
            target,
            access_types,
            alias,
            where_clause,
            source,
            type_definitions,
        }
    }

    pub fn target(&self) -> &Arc<ClassMappingInformation> {
        &self.target
    }

    pub fn entity_name(&self) -> &str {
        self.target.entity_name()
    }

    pub fn access_types(&self) -> &BTreeSet<AccessType> {
        &self.access_types
    }

    pub fn grants(&self, access_type: AccessType) -> bool {
        self.access_types.contains(&access_type)
    }

    /// The alias standing for the checked entity.
    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    pub fn where_clause(&self) -> &Expr {
        &self.where_clause
    }

    /// The rule text as declared.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Aliases of the rule scope, including those of its subqueries' parents.
    pub fn type_definitions(&self) -> &TypeDefinitions {
        &self.type_definitions
    }

    /// Whether the rule restricts instances of `class` (its target or a
    /// subclass).
    pub fn applies_to(&self, class: &ClassMappingInformation) -> bool {
        class.is_assignable_to(self.target.entity_name())
    }

    pub fn is_unconditional(&self) -> bool {
        self.where_clause.is_literal_true()
    }

    /// The rule in normalized GRANT form.
    pub fn statement(&self) -> AccessRuleStatement {
        AccessRuleStatement {
            access_types: self.access_types.iter().copied().collect(),
            entity: self.target.entity_name().to_string(),
            alias: self.alias.clone(),
            where_clause: Some(self.where_clause.clone()),
        }
    }

    /// Identity used to collapse rules compiled from different sources.
    pub(crate) fn dedup_key(&self) -> (String, BTreeSet<AccessType>, String) {
        (
            self.target.entity_name().to_string(),
            self.access_types.clone(),
            self.where_clause.to_string(),
        )
    }
}

impl fmt::Display for CompiledAccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.statement().fmt(f)
    }
}
