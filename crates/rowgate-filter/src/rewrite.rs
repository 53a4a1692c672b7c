//! Turning compiled rules into query predicates.

use indexmap::IndexMap;
use rowgate_core::{CURRENT_PRINCIPAL, CURRENT_ROLES, Value};
use rowgate_query::visit::{VisitorMut, declared_aliases, walk_expr_mut};
use rowgate_query::{Alias, Expr, InList, Path};
use rowgate_rules::CompiledAccessRule;
use std::collections::HashSet;

use crate::error::FilterError;
use crate::path_eval::PathEvaluator;

/// The predicate of `rule` applied to `target`.
///
/// Aliases declared by the rule's subqueries that collide with `taken` are
/// renamed with a numeric suffix and added to `taken`; the rule's root alias
/// is replaced by `target`.
pub(crate) fn instantiate(
    rule: &CompiledAccessRule,
    target: &Path,
    taken: &mut HashSet<Alias>,
) -> Expr {
    let mut predicate = rule.where_clause().clone();

    let local = declared_aliases(&predicate);
    let mut renames = Vec::new();
    for alias in &local {
        if taken.contains(alias) {
            let renamed = unique_alias(alias, |candidate| {
                taken.contains(candidate) || local.contains(candidate)
            });
            renames.push((alias.clone(), renamed));
        }
    }
    taken.extend(local.iter().cloned());
    for (_, renamed) in &renames {
        taken.insert(renamed.clone());
    }

    let mut substitution = Substitution {
        root: rule.alias(),
        target,
        renames: &renames,
    };
    substitution.visit_expr_mut(&mut predicate);
    predicate
}

fn unique_alias(alias: &Alias, is_taken: impl Fn(&Alias) -> bool) -> Alias {
    let mut index = 1;
    loop {
        let candidate = Alias::new(format!("{}{}", alias, index));
        if !is_taken(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

struct Substitution<'a> {
    root: &'a Alias,
    target: &'a Path,
    renames: &'a [(Alias, Alias)],
}

impl Substitution<'_> {
    fn renamed(&self, alias: &Alias) -> Option<&Alias> {
        self.renames
            .iter()
            .find(|(from, _)| from == alias)
            .map(|(_, to)| to)
    }
}

impl VisitorMut for Substitution<'_> {
    fn visit_path_mut(&mut self, path: &mut Path) {
        if path.root_alias() == self.root {
            *path = path.replace_root(self.target);
        } else if let Some(renamed) = self.renamed(path.root_alias()) {
            path.set_root(renamed.clone());
        }
    }

    fn visit_alias_declaration_mut(&mut self, alias: &mut Alias) {
        if let Some(renamed) = self.renamed(alias) {
            *alias = renamed.clone();
        }
    }
}

/// Replaces `CURRENT_PRINCIPAL`, `CURRENT_ROLES` and paths rooted at them
/// with named parameters.
pub(crate) struct SecurityParameters<'a> {
    paths: &'a PathEvaluator,
    principal: Value,
    roles: Vec<Value>,
    taken: HashSet<String>,
    next: usize,
    /// Generated parameters by the path they stand for.
    by_path: IndexMap<String, String>,
    pub parameters: IndexMap<String, Value>,
    pub user_parameter_name: Option<String>,
    pub role_parameter_names: Vec<String>,
    error: Option<FilterError>,
}

impl<'a> SecurityParameters<'a> {
    pub fn new(
        paths: &'a PathEvaluator,
        principal: Value,
        roles: Vec<Value>,
        taken: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            paths,
            principal,
            roles,
            taken: taken.into_iter().collect(),
            next: 0,
            by_path: IndexMap::new(),
            parameters: IndexMap::new(),
            user_parameter_name: None,
            role_parameter_names: Vec::new(),
            error: None,
        }
    }

    pub fn replace(&mut self, expr: &mut Expr) -> Result<(), FilterError> {
        self.visit_expr_mut(expr);
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Drop parameters the final predicate no longer mentions.
    pub fn retain_used(&mut self, used: &[String]) {
        self.parameters.retain(|name, _| used.contains(name));
        self.role_parameter_names.retain(|name| used.contains(name));
        if self
            .user_parameter_name
            .as_ref()
            .is_some_and(|name| !used.contains(name))
        {
            self.user_parameter_name = None;
        }
    }

    fn fresh(&mut self) -> String {
        loop {
            let name = format!("param{}", self.next);
            self.next += 1;
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    fn role_parameters(&mut self) -> Vec<String> {
        if self.role_parameter_names.is_empty() {
            for role in self.roles.clone() {
                let name = self.fresh();
                self.parameters.insert(name.clone(), role);
                self.role_parameter_names.push(name);
            }
        }
        self.role_parameter_names.clone()
    }

    fn path_parameter(&mut self, path: &Path) -> Option<String> {
        let key = path.to_string();
        if let Some(name) = self.by_path.get(&key) {
            return Some(name.clone());
        }
        let root = path.root_alias();
        let value = if root.matches(CURRENT_PRINCIPAL) {
            match self.paths.evaluate_segments(&self.principal, path.segments()) {
                Ok(value) => value,
                Err(error) => {
                    self.error = Some(error.into());
                    return None;
                }
            }
        } else if root.matches(CURRENT_ROLES) && !path.has_subpath() {
            Value::Collection(self.roles.clone())
        } else if root.matches(CURRENT_ROLES) {
            Value::Collection(self.paths.evaluate_all_segments(&self.roles, path.segments()))
        } else {
            return None;
        };
        let name = self.fresh();
        if root.matches(CURRENT_PRINCIPAL) && !path.has_subpath() {
            self.user_parameter_name = Some(name.clone());
        }
        self.by_path.insert(key, name.clone());
        self.parameters.insert(name.clone(), value);
        Some(name)
    }

    /// Role parameters for an IN list mentioning `CURRENT_ROLES`, or `None`
    /// when the list does not.
    fn expand_roles(&mut self, items: &[Expr]) -> Option<Vec<Expr>> {
        if !items.iter().any(is_roles) {
            return None;
        }
        let mut expanded = Vec::with_capacity(items.len());
        for item in items {
            if is_roles(item) {
                expanded.extend(self.role_parameters().into_iter().map(Expr::NamedParameter));
            } else {
                expanded.push(item.clone());
            }
        }
        Some(expanded)
    }
}

fn is_roles(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(path) if !path.has_subpath() && path.root_alias().matches(CURRENT_ROLES))
}

impl VisitorMut for SecurityParameters<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.error.is_some() {
            return;
        }
        let replacement = match expr {
            Expr::In {
                expr: operand,
                negated,
                list: InList::Values(items),
            } => self.expand_roles(items).map(|items| {
                if items.is_empty() {
                    Expr::boolean(*negated)
                } else {
                    Expr::In {
                        expr: operand.clone(),
                        negated: *negated,
                        list: InList::Values(items),
                    }
                }
            }),
            Expr::MemberOf {
                expr: operand,
                negated,
                collection,
                ..
            } if !collection.has_subpath() && collection.root_alias().matches(CURRENT_ROLES) => {
                let items: Vec<Expr> = self
                    .role_parameters()
                    .into_iter()
                    .map(Expr::NamedParameter)
                    .collect();
                Some(if items.is_empty() {
                    Expr::boolean(*negated)
                } else {
                    Expr::In {
                        expr: operand.clone(),
                        negated: *negated,
                        list: InList::Values(items),
                    }
                })
            }
            Expr::Path(path) => self.path_parameter(path).map(Expr::NamedParameter),
            _ => None,
        };
        match replacement {
            Some(replacement) => {
                *expr = replacement;
                // The operand of an expanded IN may itself mention the principal.
                if let Expr::In { expr: operand, .. } = expr {
                    self.visit_expr_mut(operand);
                }
            }
            None => walk_expr_mut(self, expr),
        }
    }
}
