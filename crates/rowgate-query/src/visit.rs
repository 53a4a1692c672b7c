//! Tree traversal.
//!
//! Implement the hooks you need and call the matching `walk_*` function from
//! an overridden hook to keep descending. Subqueries are visited through
//! [`Visitor::visit_select`], so a visitor can stop at a scope boundary.

use crate::ast::{
    Expr, FromItem, InList, RangeSource, SelectStatement, Statement,
};
use crate::path::{Alias, Path};
use std::collections::HashSet;

pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_select(&mut self, select: &SelectStatement) {
        walk_select(self, select);
    }

    fn visit_path(&mut self, _path: &Path) {}

    /// Called for alias declarations (ranges, joins, result variables).
    fn visit_alias_declaration(&mut self, _alias: &Alias) {}
}

pub trait VisitorMut {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }

    fn visit_select_mut(&mut self, select: &mut SelectStatement) {
        walk_select_mut(self, select);
    }

    fn visit_path_mut(&mut self, _path: &mut Path) {}

    fn visit_alias_declaration_mut(&mut self, _alias: &mut Alias) {}
}

pub fn walk_statement<V: Visitor + ?Sized>(visitor: &mut V, statement: &Statement) {
    match statement {
        Statement::Select(select) => visitor.visit_select(select),
        Statement::Update(update) => {
            visitor.visit_alias_declaration(&update.alias);
            for item in &update.set {
                visitor.visit_path(&item.path);
                visitor.visit_expr(&item.value);
            }
            if let Some(where_clause) = &update.where_clause {
                visitor.visit_expr(where_clause);
            }
        }
        Statement::Delete(delete) => {
            visitor.visit_alias_declaration(&delete.alias);
            if let Some(where_clause) = &delete.where_clause {
                visitor.visit_expr(where_clause);
            }
        }
    }
}

fn walk_from_item<V: Visitor + ?Sized>(visitor: &mut V, item: &FromItem) {
    match &item.range.source {
        RangeSource::Entity(_) => {}
        RangeSource::Path(path) | RangeSource::CollectionMember(path) => visitor.visit_path(path),
    }
    visitor.visit_alias_declaration(&item.range.alias);
    for join in &item.joins {
        visitor.visit_path(&join.path);
        if let Some(alias) = &join.alias {
            visitor.visit_alias_declaration(alias);
        }
        if let Some(condition) = &join.condition {
            visitor.visit_expr(&condition.expr);
        }
    }
}

pub fn walk_select<V: Visitor + ?Sized>(visitor: &mut V, select: &SelectStatement) {
    for item in &select.from {
        walk_from_item(visitor, item);
    }
    if let Some(where_clause) = &select.where_clause {
        visitor.visit_expr(where_clause);
    }
    for expr in &select.group_by {
        visitor.visit_expr(expr);
    }
    if let Some(having) = &select.having {
        visitor.visit_expr(having);
    }
    for item in &select.items {
        visitor.visit_expr(&item.expr);
        if let Some(variable) = &item.result_variable {
            visitor.visit_alias_declaration(variable);
        }
    }
    for item in &select.order_by {
        visitor.visit_expr(&item.expr);
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Path(path)
        | Expr::Key(path)
        | Expr::Value(path)
        | Expr::Entry(path)
        | Expr::Object(path) => visitor.visit_path(path),
        Expr::Literal(_)
        | Expr::NamedParameter(_)
        | Expr::PositionalParameter(_)
        | Expr::CurrentDate
        | Expr::CurrentTime
        | Expr::CurrentTimestamp => {}
        Expr::Nested(inner)
        | Expr::Unary { expr: inner, .. }
        | Expr::Not(inner)
        | Expr::IsNull { expr: inner, .. }
        | Expr::IsEmpty { expr: inner, .. }
        | Expr::Type(inner)
        | Expr::Aggregate { arg: inner, .. } => visitor.visit_expr(inner),
        Expr::Binary { left, right, .. } | Expr::Comparison { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::NullIf(a, b) => {
            visitor.visit_expr(a);
            visitor.visit_expr(b);
        }
        Expr::And(items)
        | Expr::Or(items)
        | Expr::Coalesce(items)
        | Expr::Function { args: items, .. }
        | Expr::Constructor { args: items, .. } => {
            for item in items {
                visitor.visit_expr(item);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            visitor.visit_expr(expr);
            visitor.visit_expr(low);
            visitor.visit_expr(high);
        }
        Expr::Like {
            expr,
            pattern,
            escape,
            ..
        } => {
            visitor.visit_expr(expr);
            visitor.visit_expr(pattern);
            if let Some(escape) = escape {
                visitor.visit_expr(escape);
            }
        }
        Expr::In { expr, list, .. } => {
            visitor.visit_expr(expr);
            match list {
                InList::Values(values) => {
                    for value in values {
                        visitor.visit_expr(value);
                    }
                }
                InList::Subquery(subquery) => visitor.visit_select(subquery),
                InList::Parameter(parameter) => visitor.visit_expr(parameter),
            }
        }
        Expr::MemberOf {
            expr, collection, ..
        } => {
            visitor.visit_expr(expr);
            visitor.visit_path(collection);
        }
        Expr::Exists(subquery)
        | Expr::Quantified { subquery, .. }
        | Expr::Subquery(subquery) => visitor.visit_select(subquery),
        Expr::Case(case) => {
            if let Some(operand) = &case.operand {
                visitor.visit_expr(operand);
            }
            for (condition, result) in &case.whens {
                visitor.visit_expr(condition);
                visitor.visit_expr(result);
            }
            if let Some(else_expr) = &case.else_expr {
                visitor.visit_expr(else_expr);
            }
        }
        Expr::Trim {
            character, expr, ..
        } => {
            if let Some(character) = character {
                visitor.visit_expr(character);
            }
            visitor.visit_expr(expr);
        }
    }
}

pub fn walk_statement_mut<V: VisitorMut + ?Sized>(visitor: &mut V, statement: &mut Statement) {
    match statement {
        Statement::Select(select) => visitor.visit_select_mut(select),
        Statement::Update(update) => {
            visitor.visit_alias_declaration_mut(&mut update.alias);
            for item in &mut update.set {
                visitor.visit_path_mut(&mut item.path);
                visitor.visit_expr_mut(&mut item.value);
            }
            if let Some(where_clause) = &mut update.where_clause {
                visitor.visit_expr_mut(where_clause);
            }
        }
        Statement::Delete(delete) => {
            visitor.visit_alias_declaration_mut(&mut delete.alias);
            if let Some(where_clause) = &mut delete.where_clause {
                visitor.visit_expr_mut(where_clause);
            }
        }
    }
}

fn walk_from_item_mut<V: VisitorMut + ?Sized>(visitor: &mut V, item: &mut FromItem) {
    match &mut item.range.source {
        RangeSource::Entity(_) => {}
        RangeSource::Path(path) | RangeSource::CollectionMember(path) => {
            visitor.visit_path_mut(path)
        }
    }
    visitor.visit_alias_declaration_mut(&mut item.range.alias);
    for join in &mut item.joins {
        visitor.visit_path_mut(&mut join.path);
        if let Some(alias) = &mut join.alias {
            visitor.visit_alias_declaration_mut(alias);
        }
        if let Some(condition) = &mut join.condition {
            visitor.visit_expr_mut(&mut condition.expr);
        }
    }
}

pub fn walk_select_mut<V: VisitorMut + ?Sized>(visitor: &mut V, select: &mut SelectStatement) {
    for item in &mut select.from {
        walk_from_item_mut(visitor, item);
    }
    if let Some(where_clause) = &mut select.where_clause {
        visitor.visit_expr_mut(where_clause);
    }
    for expr in &mut select.group_by {
        visitor.visit_expr_mut(expr);
    }
    if let Some(having) = &mut select.having {
        visitor.visit_expr_mut(having);
    }
    for item in &mut select.items {
        visitor.visit_expr_mut(&mut item.expr);
        if let Some(variable) = &mut item.result_variable {
            visitor.visit_alias_declaration_mut(variable);
        }
    }
    for item in &mut select.order_by {
        visitor.visit_expr_mut(&mut item.expr);
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Path(path)
        | Expr::Key(path)
        | Expr::Value(path)
        | Expr::Entry(path)
        | Expr::Object(path) => visitor.visit_path_mut(path),
        Expr::Literal(_)
        | Expr::NamedParameter(_)
        | Expr::PositionalParameter(_)
        | Expr::CurrentDate
        | Expr::CurrentTime
        | Expr::CurrentTimestamp => {}
        Expr::Nested(inner)
        | Expr::Unary { expr: inner, .. }
        | Expr::Not(inner)
        | Expr::IsNull { expr: inner, .. }
        | Expr::IsEmpty { expr: inner, .. }
        | Expr::Type(inner)
        | Expr::Aggregate { arg: inner, .. } => visitor.visit_expr_mut(inner),
        Expr::Binary { left, right, .. } | Expr::Comparison { left, right, .. } => {
            visitor.visit_expr_mut(left);
            visitor.visit_expr_mut(right);
        }
        Expr::NullIf(a, b) => {
            visitor.visit_expr_mut(a);
            visitor.visit_expr_mut(b);
        }
        Expr::And(items)
        | Expr::Or(items)
        | Expr::Coalesce(items)
        | Expr::Function { args: items, .. }
        | Expr::Constructor { args: items, .. } => {
            for item in items {
                visitor.visit_expr_mut(item);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            visitor.visit_expr_mut(expr);
            visitor.visit_expr_mut(low);
            visitor.visit_expr_mut(high);
        }
        Expr::Like {
            expr,
            pattern,
            escape,
            ..
        } => {
            visitor.visit_expr_mut(expr);
            visitor.visit_expr_mut(pattern);
            if let Some(escape) = escape {
                visitor.visit_expr_mut(escape);
            }
        }
        Expr::In { expr, list, .. } => {
            visitor.visit_expr_mut(expr);
            match list {
                InList::Values(values) => {
                    for value in values {
                        visitor.visit_expr_mut(value);
                    }
                }
                InList::Subquery(subquery) => visitor.visit_select_mut(subquery),
                InList::Parameter(parameter) => visitor.visit_expr_mut(parameter),
            }
        }
        Expr::MemberOf {
            expr, collection, ..
        } => {
            visitor.visit_expr_mut(expr);
            visitor.visit_path_mut(collection);
        }
        Expr::Exists(subquery)
        | Expr::Quantified { subquery, .. }
        | Expr::Subquery(subquery) => visitor.visit_select_mut(subquery),
        Expr::Case(case) => {
            if let Some(operand) = &mut case.operand {
                visitor.visit_expr_mut(operand);
            }
            for (condition, result) in &mut case.whens {
                visitor.visit_expr_mut(condition);
                visitor.visit_expr_mut(result);
            }
            if let Some(else_expr) = &mut case.else_expr {
                visitor.visit_expr_mut(else_expr);
            }
        }
        Expr::Trim {
            character, expr, ..
        } => {
            if let Some(character) = character {
                visitor.visit_expr_mut(character);
            }
            visitor.visit_expr_mut(expr);
        }
    }
}

/// Every path in `expr`, subqueries included.
pub fn collect_paths(expr: &Expr) -> Vec<Path> {
    struct Paths(Vec<Path>);
    impl Visitor for Paths {
        fn visit_path(&mut self, path: &Path) {
            self.0.push(path.clone());
        }
    }
    let mut paths = Paths(Vec::new());
    paths.visit_expr(expr);
    paths.0
}

/// Collects alias declarations: ranges, joins and result variables.
#[derive(Debug, Default)]
pub struct DeclaredAliases(pub HashSet<Alias>);

impl Visitor for DeclaredAliases {
    fn visit_alias_declaration(&mut self, alias: &Alias) {
        self.0.insert(alias.clone());
    }
}

/// Aliases declared by the subqueries of `expr`.
pub fn declared_aliases(expr: &Expr) -> HashSet<Alias> {
    let mut declared = DeclaredAliases::default();
    declared.visit_expr(expr);
    declared.0
}

/// Aliases declared anywhere in `select`, nested subqueries included.
pub fn declared_aliases_in_select(select: &SelectStatement) -> HashSet<Alias> {
    let mut declared = DeclaredAliases::default();
    walk_select(&mut declared, select);
    declared.0
}

/// Aliases declared anywhere in `statement`, nested subqueries included.
pub fn declared_aliases_in_statement(statement: &Statement) -> HashSet<Alias> {
    let mut declared = DeclaredAliases::default();
    walk_statement(&mut declared, statement);
    declared.0
}

/// Whether `expr` contains a subquery.
pub fn contains_subquery(expr: &Expr) -> bool {
    struct Finder(bool);
    impl Visitor for Finder {
        fn visit_select(&mut self, _select: &SelectStatement) {
            self.0 = true;
        }
    }
    let mut finder = Finder(false);
    finder.visit_expr(expr);
    finder.0
}

/// Names of the named parameters used anywhere in `statement`.
pub fn named_parameters(statement: &Statement) -> Vec<String> {
    struct Names(Vec<String>);
    impl Visitor for Names {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::NamedParameter(name) = expr {
                if !self.0.contains(name) {
                    self.0.push(name.clone());
                }
            }
            walk_expr(self, expr);
        }
    }
    let mut names = Names(Vec::new());
    walk_statement(&mut names, statement);
    names.0
}
