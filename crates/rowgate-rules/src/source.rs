//! GRANT statements derived from entity declarations.
//!
//! Besides textual GRANT rules, an entity can declare
//! - `roles_allowed`: access granted to principals holding one of a set of roles
//! - `permit`: access granted where an expression written against the entity
//!   holds, e.g. `owner = CURRENT_PRINCIPAL`
//!
//! Both are turned into ordinary [`AccessRuleStatement`]s here.

use indexmap::IndexMap;
use rowgate_core::{
    AccessType, CURRENT_ROLES, ClassMappingInformation, PermitConfig, RolesAllowedConfig,
};
use rowgate_query::visit::{VisitorMut, declared_aliases};
use rowgate_query::{
    AccessRuleStatement, Alias, Expr, InList, Path, is_reserved, parse_expression, parse_rule,
};
use std::collections::{BTreeSet, HashSet};

use crate::error::CompileError;
use crate::resolver::AliasResolver;

/// Pseudo-path standing for the entity a permit expression is declared on.
const THIS: &str = "this";

/// One GRANT per distinct access type set, OR-ing
/// `'<role>' IN (CURRENT_ROLES)` for every role declared with that set.
pub fn roles_allowed_rules(
    class: &ClassMappingInformation,
    declarations: &[RolesAllowedConfig],
) -> Vec<AccessRuleStatement> {
    let mut groups: IndexMap<BTreeSet<AccessType>, Vec<&str>> = IndexMap::new();
    for declaration in declarations {
        let access_types: BTreeSet<AccessType> = declaration.access.iter().copied().collect();
        let roles = groups.entry(access_types).or_default();
        for role in &declaration.roles {
            if !roles.contains(&role.as_str()) {
                roles.push(role);
            }
        }
    }

    let alias = rule_alias(class, &HashSet::new());
    groups
        .into_iter()
        .filter(|(_, roles)| !roles.is_empty())
        .map(|(access_types, roles)| {
            let grants = roles
                .into_iter()
                .map(|role| Expr::In {
                    expr: Box::new(Expr::string(role)),
                    negated: false,
                    list: InList::Values(vec![Expr::path(Path::new(CURRENT_ROLES))]),
                })
                .collect();
            AccessRuleStatement {
                access_types: access_types.into_iter().collect(),
                entity: class.entity_name().to_string(),
                alias: alias.clone(),
                where_clause: Some(Expr::or(grants)),
            }
        })
        .collect()
}

/// The GRANT statement of a permit declaration.
///
/// A declaration that already is a GRANT statement is used as is. Otherwise
/// the expression gets the class's default alias (suffixed when the
/// expression declares that name itself), every path rooted at something
/// other than a declared or external alias is prefixed with it, and `this`
/// is replaced by it.
pub fn permit_rule(
    class: &ClassMappingInformation,
    permit: &PermitConfig,
    resolver: &AliasResolver,
) -> Result<AccessRuleStatement, CompileError> {
    let text = permit.rule.trim();
    if starts_with_keyword(text, "GRANT") {
        return parse_rule(text).map_err(|source| CompileError::Parse {
            rule: text.to_string(),
            source,
        });
    }

    let mut expr = parse_expression(text).map_err(|source| CompileError::Parse {
        rule: text.to_string(),
        source,
    })?;

    let declared = declared_aliases(&expr);
    let alias = rule_alias(class, &declared);

    let mut qualifier = Qualifier {
        alias: &alias,
        declared: &declared,
        class,
        resolver,
    };
    qualifier.visit_expr_mut(&mut expr);

    Ok(AccessRuleStatement {
        access_types: permit.access.clone(),
        entity: class.entity_name().to_string(),
        alias,
        where_clause: Some(expr),
    })
}

/// The default alias of `class`, with a numeric suffix if that name is taken
/// or reserved.
fn rule_alias(class: &ClassMappingInformation, taken: &HashSet<Alias>) -> Alias {
    let base = class.default_alias();
    let free = |name: &str| !is_reserved(name) && !taken.contains(&Alias::new(name));
    if free(&base) {
        return Alias::new(base);
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{base}{suffix}");
        if free(&candidate) {
            return Alias::new(candidate);
        }
        suffix += 1;
    }
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
        && text[keyword.len()..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
}

struct Qualifier<'a> {
    alias: &'a Alias,
    declared: &'a HashSet<Alias>,
    class: &'a ClassMappingInformation,
    resolver: &'a AliasResolver,
}

impl Qualifier<'_> {
    fn keeps_root(&self, path: &Path) -> bool {
        let root = path.root_alias().as_str();
        if self.declared.contains(path.root_alias())
            || self.resolver.is_external_alias(root)
        {
            return true;
        }
        // A bare entity name is a type literal unless the class has a
        // property of that name.
        !path.has_subpath()
            && self.resolver.mapping().class_mapping(root).is_some()
            && self.class.property(root).is_none()
    }
}

impl VisitorMut for Qualifier<'_> {
    fn visit_path_mut(&mut self, path: &mut Path) {
        if path.root_alias().matches(THIS) {
            path.set_root(self.alias.clone());
        } else if !self.keeps_root(path) {
            let segments = std::iter::once(path.root_alias().as_str().to_string())
                .chain(path.segments().iter().cloned())
                .collect::<Vec<_>>();
            *path = Path::from_parts(self.alias.clone(), segments);
        }
    }
}
