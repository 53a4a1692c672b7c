//! Alias and path type resolution.
//!
//! Resolution order within one SELECT scope:
//! 1. FROM ranges (entity names are looked up in the mapping)
//! 2. joins and derived ranges, through a worklist: each starts preliminary
//!    and is finalized as soon as its root alias is final
//! 3. WHERE, GROUP BY, HAVING and ORDER BY
//! 4. SELECT, which finalizes the result variables
//!
//! Subqueries are resolved in a nested scope when they are reached.

use rowgate_core::{
    CURRENT_PRINCIPAL, CURRENT_ROLES, ClassMappingInformation, MappingInformation, PropertyKind,
    PropertyMappingInformation,
};
use rowgate_query::visit::Visitor;
use rowgate_query::{
    AccessRuleStatement, Alias, Expr, Path, RangeSource, SelectStatement, Statement,
};
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::types::{ResolvedType, TypeDefinition, TypeDefinitions};

/// Types of aliases defined outside any statement.
pub trait ExternalAliasTypes: Send + Sync + fmt::Debug {
    fn alias_type(&self, alias: &str) -> Option<ResolvedType>;
}

/// Types `CURRENT_PRINCIPAL` and `CURRENT_ROLES`.
#[derive(Debug, Clone)]
pub struct SecurityContextAliasTypes {
    principal: ResolvedType,
}

impl SecurityContextAliasTypes {
    /// The principal is a plain value whose type is not checked.
    pub fn untyped() -> Self {
        Self {
            principal: ResolvedType::Unknown,
        }
    }

    /// The principal is an instance of `class`.
    pub fn with_principal_entity(class: Arc<ClassMappingInformation>) -> Self {
        Self {
            principal: ResolvedType::Entity(class),
        }
    }
}

impl ExternalAliasTypes for SecurityContextAliasTypes {
    fn alias_type(&self, alias: &str) -> Option<ResolvedType> {
        if alias.eq_ignore_ascii_case(CURRENT_PRINCIPAL) {
            Some(self.principal.clone())
        } else if alias.eq_ignore_ascii_case(CURRENT_ROLES) {
            Some(ResolvedType::Basic("String".to_string()))
        } else {
            None
        }
    }
}

/// Binds aliases to mapped types and checks every path of a statement.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    mapping: Arc<MappingInformation>,
    external: Arc<dyn ExternalAliasTypes>,
}

impl AliasResolver {
    pub fn new(mapping: Arc<MappingInformation>) -> Self {
        Self {
            mapping,
            external: Arc::new(SecurityContextAliasTypes::untyped()),
        }
    }

    pub fn with_external_alias_types(mut self, external: Arc<dyn ExternalAliasTypes>) -> Self {
        self.external = external;
        self
    }

    pub fn mapping(&self) -> &Arc<MappingInformation> {
        &self.mapping
    }

    pub fn is_external_alias(&self, alias: &str) -> bool {
        self.external.alias_type(alias).is_some()
    }

    /// Resolve a complete statement; returns the top-level scope.
    pub fn resolve(&self, statement: &Statement) -> Result<TypeDefinitions, ResolveError> {
        match statement {
            Statement::Select(select) => self.resolve_select(select, &TypeDefinitions::new()),
            Statement::Update(update) => {
                let mut scope = TypeDefinitions::new();
                let class = self.entity(&update.entity)?;
                scope.declare(TypeDefinition::range(
                    update.alias.clone(),
                    ResolvedType::Entity(class),
                ))?;
                for item in &update.set {
                    self.path_type(&scope, &item.path)?;
                    self.resolve_expr(&item.value, &scope)?;
                }
                if let Some(where_clause) = &update.where_clause {
                    self.resolve_expr(where_clause, &scope)?;
                }
                Ok(scope)
            }
            Statement::Delete(delete) => {
                let mut scope = TypeDefinitions::new();
                let class = self.entity(&delete.entity)?;
                scope.declare(TypeDefinition::range(
                    delete.alias.clone(),
                    ResolvedType::Entity(class),
                ))?;
                if let Some(where_clause) = &delete.where_clause {
                    self.resolve_expr(where_clause, &scope)?;
                }
                Ok(scope)
            }
        }
    }

    /// Resolve an access rule; the scope holds the rule alias.
    pub fn resolve_rule(&self, rule: &AccessRuleStatement) -> Result<TypeDefinitions, ResolveError> {
        let mut scope = TypeDefinitions::new();
        let class = self.entity(&rule.entity)?;
        scope.declare(TypeDefinition::range(
            rule.alias.clone(),
            ResolvedType::Entity(class),
        ))?;
        if let Some(where_clause) = &rule.where_clause {
            self.resolve_expr(where_clause, &scope)?;
        }
        Ok(scope)
    }

    /// Resolve a SELECT in a scope nested in `enclosing`.
    pub fn resolve_select(
        &self,
        select: &SelectStatement,
        enclosing: &TypeDefinitions,
    ) -> Result<TypeDefinitions, ResolveError> {
        let mut scope = enclosing.nested();

        for item in &select.from {
            let alias = item.range.alias.clone();
            match &item.range.source {
                RangeSource::Entity(name) => {
                    let class = self.entity(name)?;
                    scope.declare(TypeDefinition::range(alias, ResolvedType::Entity(class)))?;
                }
                RangeSource::Path(path) | RangeSource::CollectionMember(path) => {
                    scope.declare(TypeDefinition::join(alias, path.clone(), false, false))?;
                }
            }
            for join in &item.joins {
                if let Some(alias) = &join.alias {
                    scope.declare(TypeDefinition::join(
                        alias.clone(),
                        join.path.clone(),
                        join.kind.is_outer(),
                        join.fetch,
                    ))?;
                }
            }
        }
        self.finalize_joins(&mut scope)?;

        for item in &select.from {
            for join in &item.joins {
                if join.alias.is_none() {
                    self.path_type(&scope, &join.path)?;
                }
                if let Some(condition) = &join.condition {
                    self.resolve_expr(&condition.expr, &scope)?;
                }
            }
        }

        if let Some(where_clause) = &select.where_clause {
            self.resolve_expr(where_clause, &scope)?;
        }
        for expr in &select.group_by {
            self.resolve_expr(expr, &scope)?;
        }
        if let Some(having) = &select.having {
            self.resolve_expr(having, &scope)?;
        }

        for item in &select.items {
            if let Some(variable) = &item.result_variable {
                scope.declare(TypeDefinition::preliminary(variable.clone()))?;
            }
        }
        for item in &select.order_by {
            self.resolve_expr(&item.expr, &scope)?;
        }

        for item in &select.items {
            self.resolve_expr(&item.expr, &scope)?;
            if let Some(variable) = &item.result_variable {
                let resolved = match &item.expr {
                    Expr::Path(path) => self.path_type(&scope, path)?,
                    _ => ResolvedType::Unknown,
                };
                if let Some(definition) = scope.get_mut(variable) {
                    definition.finalize(resolved, None)?;
                }
            }
        }

        Ok(scope)
    }

    fn finalize_joins(&self, scope: &mut TypeDefinitions) -> Result<(), ResolveError> {
        loop {
            let pending: Vec<(Alias, Path)> = scope
                .local()
                .iter()
                .filter(|d| d.is_preliminary())
                .filter_map(|d| d.join_path().map(|path| (d.alias().clone(), path.clone())))
                .collect();
            let Some((_, first)) = pending.first() else {
                return Ok(());
            };
            let stuck_root = first.root_alias().to_string();

            let mut progressed = false;
            for (alias, path) in &pending {
                let root = path.root_alias();
                let root_final = match scope.get(root) {
                    Some(definition) => !definition.is_preliminary(),
                    None if self.is_external_alias(root.as_str()) => true,
                    None => {
                        return Err(ResolveError::UnknownAlias {
                            alias: root.to_string(),
                        });
                    }
                };
                if !root_final {
                    continue;
                }
                let start = self.alias_type(scope, root)?;
                let (resolved, key_type) = self.walk(start, path)?;
                if let Some(definition) = scope.get_mut(alias) {
                    definition.finalize(resolved, key_type)?;
                }
                tracing::trace!(alias = %alias, path = %path, "finalized join type");
                progressed = true;
            }
            if !progressed {
                return Err(ResolveError::UnknownAlias { alias: stuck_root });
            }
        }
    }

    /// Check every path and subquery of `expr` against `scope`.
    pub fn resolve_expr(&self, expr: &Expr, scope: &TypeDefinitions) -> Result<(), ResolveError> {
        let mut checker = PathChecker {
            resolver: self,
            scope,
            error: None,
        };
        checker.visit_expr(expr);
        match checker.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// The type `path` resolves to in `scope`.
    pub fn path_type(
        &self,
        scope: &TypeDefinitions,
        path: &Path,
    ) -> Result<ResolvedType, ResolveError> {
        let root = path.root_alias();
        if scope.get(root).is_none()
            && !self.is_external_alias(root.as_str())
            && !path.has_subpath()
        {
            if let Some(class) = self.mapping.class_mapping(root.as_str()) {
                return Ok(ResolvedType::EntityType(class.entity_name().to_string()));
            }
        }
        let start = self.alias_type(scope, root)?;
        Ok(self.walk(start, path)?.0)
    }

    fn alias_type(
        &self,
        scope: &TypeDefinitions,
        alias: &Alias,
    ) -> Result<ResolvedType, ResolveError> {
        if let Some(definition) = scope.get(alias) {
            return Ok(definition
                .resolved_type()
                .cloned()
                .unwrap_or(ResolvedType::Unknown));
        }
        self.external
            .alias_type(alias.as_str())
            .ok_or_else(|| ResolveError::UnknownAlias {
                alias: alias.to_string(),
            })
    }

    /// Follow the segments of `path` from `start`. Returns the element type
    /// and, for map-valued properties, the key type.
    fn walk(
        &self,
        start: ResolvedType,
        path: &Path,
    ) -> Result<(ResolvedType, Option<String>), ResolveError> {
        let mut current = start;
        let mut key_type = None;
        let segments = path.segments();
        for (i, segment) in segments.iter().enumerate() {
            let class = match &current {
                ResolvedType::Entity(class) => class.clone(),
                ResolvedType::Unknown => return Ok((ResolvedType::Unknown, None)),
                ResolvedType::Basic(_) | ResolvedType::EntityType(_) => {
                    return Err(ResolveError::NotNavigable {
                        path: path.to_string(),
                        segment: segment.clone(),
                    });
                }
            };
            let property = self.find_property(&class, segment)?;
            let last = i + 1 == segments.len();
            if !last && !matches!(property.kind(), PropertyKind::SingleValued) {
                return Err(ResolveError::NotNavigable {
                    path: path.to_string(),
                    segment: segment.clone(),
                });
            }
            key_type = property.key_type().map(str::to_string);
            current = match self.mapping.class_mapping(property.property_type()) {
                Some(target) if property.is_relationship() => ResolvedType::Entity(target.clone()),
                _ => ResolvedType::Basic(property.property_type().to_string()),
            };
        }
        Ok((current, key_type))
    }

    /// Look the property up on the class and its ancestors, then on its
    /// subclasses.
    fn find_property(
        &self,
        class: &Arc<ClassMappingInformation>,
        name: &str,
    ) -> Result<PropertyMappingInformation, ResolveError> {
        if let Some(property) = class.property(name) {
            return Ok(property.clone());
        }
        self.mapping
            .subtree(class.entity_name())
            .iter()
            .find_map(|subclass| subclass.property(name).cloned())
            .ok_or_else(|| ResolveError::UnknownProperty {
                entity: class.entity_name().to_string(),
                property: name.to_string(),
            })
    }

    fn entity(&self, name: &str) -> Result<Arc<ClassMappingInformation>, ResolveError> {
        self.mapping
            .class_mapping(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownEntity {
                entity: name.to_string(),
            })
    }
}

struct PathChecker<'r> {
    resolver: &'r AliasResolver,
    scope: &'r TypeDefinitions,
    error: Option<ResolveError>,
}

impl Visitor for PathChecker<'_> {
    fn visit_path(&mut self, path: &Path) {
        if self.error.is_none() {
            if let Err(error) = self.resolver.path_type(self.scope, path) {
                self.error = Some(error);
            }
        }
    }

    fn visit_select(&mut self, select: &SelectStatement) {
        if self.error.is_none() {
            if let Err(error) = self.resolver.resolve_select(select, self.scope) {
                self.error = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgate_core::{ClassDeclaration, MappingInformation};
    use rowgate_query::{parse_query, parse_rule};

    fn mapping() -> Arc<MappingInformation> {
        Arc::new(
            MappingInformation::builder()
                .class(
                    ClassDeclaration::new("User")
                        .id("id")
                        .basic("id", "Long")
                        .basic("name", "String")
                        .map("addresses", "String", "Address"),
                )
                .class(
                    ClassDeclaration::new("Address")
                        .id("id")
                        .basic("id", "Long")
                        .basic("city", "String"),
                )
                .class(
                    ClassDeclaration::new("Contact")
                        .id("id")
                        .basic("id", "Long")
                        .single_valued("owner", "User")
                        .collection("phones", "Phone"),
                )
                .class(
                    ClassDeclaration::new("Customer")
                        .superclass("Contact")
                        .basic("discount", "Integer"),
                )
                .class(
                    ClassDeclaration::new("Phone")
                        .id("id")
                        .basic("id", "Long")
                        .basic("number", "String"),
                )
                .build()
                .unwrap(),
        )
    }

    fn resolve(query: &str) -> Result<TypeDefinitions, ResolveError> {
        AliasResolver::new(mapping()).resolve(&parse_query(query).unwrap())
    }

    fn entity_of(definitions: &TypeDefinitions, alias: &str) -> String {
        definitions
            .get_by_name(alias)
            .and_then(|d| d.class())
            .map(|class| class.entity_name().to_string())
            .unwrap()
    }

    #[test]
    fn test_joins_resolve_in_any_order() {
        let definitions = resolve(
            "SELECT a FROM Contact c JOIN o.addresses a JOIN c.owner o, IN (c.phones) p",
        )
        .unwrap();
        assert_eq!(entity_of(&definitions, "o"), "User");
        assert_eq!(entity_of(&definitions, "a"), "Address");
        assert_eq!(entity_of(&definitions, "p"), "Phone");
        assert_eq!(
            definitions.get_by_name("a").and_then(|d| d.key_type()),
            Some("String")
        );
    }

    #[test]
    fn test_outer_join_flag() {
        let definitions = resolve("SELECT c FROM Contact c LEFT JOIN c.owner o").unwrap();
        assert!(definitions.is_outer(&Alias::new("o")));
        assert!(!definitions.is_outer(&Alias::new("c")));
    }

    #[test]
    fn test_unknown_entity() {
        assert_eq!(
            resolve("SELECT v FROM Vet v").unwrap_err(),
            ResolveError::UnknownEntity {
                entity: "Vet".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_property() {
        assert!(matches!(
            resolve("SELECT c FROM Contact c WHERE c.nickname = 'x'"),
            Err(ResolveError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_subclass_property_accepted() {
        assert!(resolve("SELECT c FROM Contact c WHERE c.discount > 10").is_ok());
    }

    #[test]
    fn test_unknown_alias() {
        assert!(matches!(
            resolve("SELECT c FROM Contact c JOIN x.owner o"),
            Err(ResolveError::UnknownAlias { .. })
        ));
        assert!(matches!(
            resolve("SELECT c FROM Contact c WHERE d.id = 1"),
            Err(ResolveError::UnknownAlias { .. })
        ));
    }

    #[test]
    fn test_not_navigable() {
        assert!(matches!(
            resolve("SELECT c FROM Contact c WHERE c.phones.number = '1'"),
            Err(ResolveError::NotNavigable { .. })
        ));
        assert!(matches!(
            resolve("SELECT c FROM Contact c WHERE c.id.value = 1"),
            Err(ResolveError::NotNavigable { .. })
        ));
    }

    #[test]
    fn test_duplicate_alias() {
        assert!(matches!(
            resolve("SELECT c FROM Contact c, User c"),
            Err(ResolveError::DuplicateAlias { .. })
        ));
    }

    #[test]
    fn test_subquery_scope() {
        assert!(
            resolve(
                "SELECT c FROM Contact c WHERE EXISTS (SELECT p FROM c.phones p WHERE p.number = '1')"
            )
            .is_ok()
        );
        // The subquery alias is not visible outside.
        assert!(matches!(
            resolve(
                "SELECT c FROM Contact c WHERE EXISTS (SELECT p FROM c.phones p) AND p.number = '1'"
            ),
            Err(ResolveError::UnknownAlias { .. })
        ));
    }

    #[test]
    fn test_entity_type_literals_and_result_variables() {
        let definitions = resolve(
            "SELECT c.owner o FROM Contact c WHERE TYPE(c) IN (Customer) ORDER BY o",
        )
        .unwrap();
        assert_eq!(entity_of(&definitions, "o"), "User");
    }

    #[test]
    fn test_external_aliases() {
        let mapping = mapping();
        let user = mapping.class_mapping("User").unwrap().clone();
        let resolver = AliasResolver::new(mapping).with_external_alias_types(Arc::new(
            SecurityContextAliasTypes::with_principal_entity(user),
        ));
        let rule = parse_rule(
            "GRANT READ ACCESS TO Contact c WHERE c.owner = CURRENT_PRINCIPAL \
             OR c.owner.name = CURRENT_PRINCIPAL.name OR 'admin' IN (CURRENT_ROLES)",
        )
        .unwrap();
        assert!(resolver.resolve_rule(&rule).is_ok());

        let rule =
            parse_rule("GRANT READ ACCESS TO Contact c WHERE CURRENT_PRINCIPAL.email = 'x'")
                .unwrap();
        assert!(matches!(
            resolver.resolve_rule(&rule),
            Err(ResolveError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_path_type() {
        let resolver = AliasResolver::new(mapping());
        let statement = parse_query("SELECT c FROM Contact c").unwrap();
        let scope = resolver.resolve(&statement).unwrap();
        assert_eq!(
            resolver
                .path_type(&scope, &"c.owner.name".parse().unwrap())
                .unwrap(),
            ResolvedType::Basic("String".to_string())
        );
        assert!(
            resolver
                .path_type(&scope, &"c.owner".parse().unwrap())
                .unwrap()
                .is_entity()
        );
    }
}
