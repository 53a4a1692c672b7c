//! Query rewriting and entity accessibility checks.

use indexmap::IndexMap;
use rowgate_core::{
    AccessType, ClassMappingInformation, EntityRef, EvaluationConfig, SecurityContext, Value,
};
use rowgate_query::visit::{
    Visitor, contains_subquery, declared_aliases_in_statement, named_parameters, walk_expr,
};
use rowgate_query::{Alias, Expr, InList, Path, SelectStatement, Statement, parse_query};
use rowgate_rules::{CompiledAccessRule, CompiledRules, ResolvedType, TypeDefinitions};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::FilterError;
use crate::evaluator::{Outcome, QueryEvaluator};
use crate::executor::{EntitySource, QueryExecutor};
use crate::optimizer::{fold, is_false, literal, simplify};
use crate::params::QueryEvaluationParameters;
use crate::rewrite::{SecurityParameters, instantiate};
use crate::subselect::DelegatingSubselectEvaluator;

/// What filtering did to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// No restriction applies; the query is returned as given.
    Unchanged,
    /// Access predicates were added to the WHERE clause.
    Rewritten,
    /// No row can be accessible; callers return an empty result without
    /// running the query.
    AlwaysEmpty,
}

/// Result of [`EntityFilter::filter_query`].
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub outcome: FilterOutcome,
    /// The query to run; the original text when unchanged.
    pub query: String,
    pub statement: Statement,
    /// Values of the parameters the rewrite introduced.
    pub parameters: IndexMap<String, Value>,
    /// Parameter standing for `CURRENT_PRINCIPAL`, if used.
    pub user_parameter_name: Option<String>,
    /// Parameters standing for the elements of `CURRENT_ROLES`.
    pub role_parameter_names: Vec<String>,
    /// Entity-typed paths the access predicates were applied to.
    pub selected_paths: Vec<Path>,
    pub type_definitions: TypeDefinitions,
}

impl FilterResult {
    pub fn is_always_empty(&self) -> bool {
        self.outcome == FilterOutcome::AlwaysEmpty
    }

    pub fn is_rewritten(&self) -> bool {
        self.outcome == FilterOutcome::Rewritten
    }
}

/// Progress of one filter call, reported at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterStage {
    Unstarted,
    TypesResolved,
    RulesSelected,
    Rewritten,
    EvaluatedInMemory,
    AlwaysEmpty,
    AlwaysTrueNoop,
    Done,
    Failed,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterStage::Unstarted => "unstarted",
            FilterStage::TypesResolved => "types_resolved",
            FilterStage::RulesSelected => "rules_selected",
            FilterStage::Rewritten => "rewritten",
            FilterStage::EvaluatedInMemory => "evaluated_in_memory",
            FilterStage::AlwaysEmpty => "always_empty",
            FilterStage::AlwaysTrueNoop => "always_true_noop",
            FilterStage::Done => "done",
            FilterStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct StageTracker {
    stage: FilterStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: FilterStage::Unstarted,
        }
    }

    fn advance(&mut self, next: FilterStage) {
        tracing::trace!(from = %self.stage, to = %next, "filter stage");
        self.stage = next;
    }

    fn fail<E: fmt::Display>(&mut self, error: E) -> E {
        tracing::trace!(from = %self.stage, error = %error, "filter failed");
        self.stage = FilterStage::Failed;
        error
    }
}

/// A selected entity path and the class it resolves to.
#[derive(Debug, Clone)]
struct SelectedPath {
    path: Path,
    class: Arc<ClassMappingInformation>,
    outer: bool,
}

/// Applies compiled access rules to queries and entities.
#[derive(Clone)]
pub struct EntityFilter {
    rules: Arc<CompiledRules>,
    evaluator: QueryEvaluator,
    executor: Option<Arc<dyn QueryExecutor>>,
    entity_source: Option<Arc<dyn EntitySource>>,
    evaluation: EvaluationConfig,
}

impl fmt::Debug for EntityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFilter")
            .field("rules", &self.rules.len())
            .field("executor", &self.executor.is_some())
            .field("evaluation", &self.evaluation)
            .finish()
    }
}

impl EntityFilter {
    pub fn new(rules: Arc<CompiledRules>) -> Self {
        let evaluation = EvaluationConfig::default();
        Self {
            evaluator: QueryEvaluator::new(rules.mapping().clone()),
            rules,
            executor: None,
            entity_source: None,
            evaluation,
        }
    }

    /// Run rewritten queries' subselects through `executor` when they cannot
    /// be decided in memory, and pass entity parameters as its references.
    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self.rebuild_evaluator();
        self
    }

    pub fn with_entity_source(mut self, source: Arc<dyn EntitySource>) -> Self {
        self.entity_source = Some(source);
        self.rebuild_evaluator();
        self
    }

    pub fn with_evaluation_config(mut self, evaluation: EvaluationConfig) -> Self {
        self.evaluation = evaluation;
        self.rebuild_evaluator();
        self
    }

    fn rebuild_evaluator(&mut self) {
        let mut evaluator = QueryEvaluator::new(self.rules.mapping().clone())
            .with_like_escape(self.evaluation.like_escape);
        if let Some(source) = &self.entity_source {
            evaluator = evaluator.with_entity_source(source.clone());
        }
        if let Some(executor) = &self.executor {
            if self.evaluation.delegate_subselects {
                evaluator = evaluator.with_subselect_evaluator(Arc::new(
                    DelegatingSubselectEvaluator::new(executor.clone()),
                ));
            }
        }
        self.evaluator = evaluator;
    }

    pub fn rules(&self) -> &Arc<CompiledRules> {
        &self.rules
    }

    pub fn evaluator(&self) -> &QueryEvaluator {
        &self.evaluator
    }

    /// Restrict `query` to the instances the current principal may access.
    pub fn filter_query(
        &self,
        query: &str,
        access_type: AccessType,
        context: &dyn SecurityContext,
    ) -> Result<FilterResult, FilterError> {
        let statement = parse_query(query)?;
        self.filter(query.to_string(), statement, access_type, context)
    }

    /// Like [`filter_query`](Self::filter_query), for a statement built in
    /// code; the unchanged query text is the statement as printed.
    pub fn filter_statement(
        &self,
        statement: &Statement,
        access_type: AccessType,
        context: &dyn SecurityContext,
    ) -> Result<FilterResult, FilterError> {
        self.filter(statement.to_string(), statement.clone(), access_type, context)
    }

    fn filter(
        &self,
        original: String,
        mut statement: Statement,
        access_type: AccessType,
        context: &dyn SecurityContext,
    ) -> Result<FilterResult, FilterError> {
        let mut stage = StageTracker::new();
        let resolver = self.rules.resolver();
        let types = resolver
            .resolve(&statement)
            .map_err(|error| stage.fail(FilterError::from(error)))?;
        stage.advance(FilterStage::TypesResolved);

        let selected = self.selected_paths(&statement, &types);
        let selected_paths: Vec<Path> = selected.iter().map(|s| s.path.clone()).collect();
        let mut result = FilterResult {
            outcome: FilterOutcome::Unchanged,
            query: original,
            statement: statement.clone(),
            parameters: IndexMap::new(),
            user_parameter_name: None,
            role_parameter_names: Vec::new(),
            selected_paths,
            type_definitions: types,
        };
        if selected.is_empty() {
            stage.advance(FilterStage::AlwaysTrueNoop);
            stage.advance(FilterStage::Done);
            return Ok(result);
        }

        let params = QueryEvaluationParameters::for_context(context).in_memory_only();
        let mut taken = declared_aliases_in_statement(&statement);
        let mut clauses = Vec::new();
        let mut folded_any = false;
        for selected in &selected {
            let Some((clause, folded)) =
                self.path_clause(selected, access_type, &mut taken, &params)
            else {
                continue;
            };
            folded_any |= folded;
            let clause = if selected.outer {
                // Rows without a joined instance stay visible.
                let missing = Expr::IsNull {
                    expr: Box::new(Expr::Path(selected.path.clone())),
                    negated: false,
                };
                if is_false(&clause) {
                    tracing::debug!(
                        path = %selected.path,
                        access_type = %access_type,
                        "no joined instance accessible"
                    );
                    missing
                } else {
                    Expr::nested(Expr::Or(vec![missing, clause]))
                }
            } else if is_false(&clause) {
                tracing::debug!(
                    path = %selected.path,
                    access_type = %access_type,
                    "no instance accessible, query yields no rows"
                );
                stage.advance(FilterStage::AlwaysEmpty);
                stage.advance(FilterStage::Done);
                result.outcome = FilterOutcome::AlwaysEmpty;
                return Ok(result);
            } else {
                clause
            };
            clauses.push(clause);
        }
        stage.advance(FilterStage::RulesSelected);

        if clauses.is_empty() {
            stage.advance(if folded_any {
                FilterStage::EvaluatedInMemory
            } else {
                FilterStage::AlwaysTrueNoop
            });
            stage.advance(FilterStage::Done);
            return Ok(result);
        }

        let mut combined = if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Expr::And(clauses.into_iter().map(parenthesize).collect())
        };

        let mut security = SecurityParameters::new(
            self.evaluator.path_evaluator(),
            context.principal(),
            context.roles(),
            named_parameters(&statement),
        );
        security
            .replace(&mut combined)
            .map_err(|error| stage.fail(error))?;
        let combined = match literal(simplify(combined)) {
            Ok(true) => {
                stage.advance(FilterStage::EvaluatedInMemory);
                stage.advance(FilterStage::Done);
                return Ok(result);
            }
            Ok(false) => {
                stage.advance(FilterStage::AlwaysEmpty);
                stage.advance(FilterStage::Done);
                result.outcome = FilterOutcome::AlwaysEmpty;
                return Ok(result);
            }
            Err(combined) => combined,
        };

        if !merge(&mut statement, combined) {
            tracing::debug!("access predicates already present");
            stage.advance(FilterStage::AlwaysTrueNoop);
            stage.advance(FilterStage::Done);
            return Ok(result);
        }

        let used = named_parameters(&statement);
        security.retain_used(&used);
        for (name, value) in &mut security.parameters {
            if let Some(executor) = &self.executor {
                if matches!(value, Value::Entity(_)) {
                    *value = executor
                        .entity_reference(&*value)
                        .map_err(|error| stage.fail(FilterError::Executor(error)))?;
                }
            }
            tracing::trace!(parameter = %name, value = %value, "bound access parameter");
        }

        result.query = statement.to_string();
        result.statement = statement;
        result.outcome = FilterOutcome::Rewritten;
        result.parameters = security.parameters;
        result.user_parameter_name = security.user_parameter_name;
        result.role_parameter_names = security.role_parameter_names;
        tracing::debug!(
            access_type = %access_type,
            query = %result.query,
            parameters = result.parameters.len(),
            "rewrote query"
        );
        stage.advance(FilterStage::Rewritten);
        stage.advance(FilterStage::Done);
        Ok(result)
    }

    /// Entity-typed paths of the SELECT clause (each trimmed to its longest
    /// entity-typed prefix), or the range alias of UPDATE and DELETE.
    fn selected_paths(&self, statement: &Statement, types: &TypeDefinitions) -> Vec<SelectedPath> {
        let resolver = self.rules.resolver();
        let candidates: Vec<Path> = match statement {
            Statement::Select(select) => {
                let mut collector = SelectedPathCollector::default();
                for item in &select.items {
                    collector.visit_expr(&item.expr);
                }
                collector.0
            }
            Statement::Update(update) => vec![Path::new(update.alias.as_str())],
            Statement::Delete(delete) => vec![Path::new(delete.alias.as_str())],
        };

        let mut selected: Vec<SelectedPath> = Vec::new();
        for path in candidates {
            if resolver.is_external_alias(path.root_alias().as_str())
                || !types.contains(path.root_alias())
            {
                continue;
            }
            let entity_prefix = (0..=path.segments().len()).rev().find_map(|len| {
                let prefix = path.prefix(len);
                match resolver.path_type(types, &prefix) {
                    Ok(ResolvedType::Entity(class)) => Some((prefix, class)),
                    _ => None,
                }
            });
            let Some((path, class)) = entity_prefix else {
                continue;
            };
            if selected.iter().any(|s| s.path == path) {
                continue;
            }
            selected.push(SelectedPath {
                outer: types.is_outer(path.root_alias()),
                path,
                class,
            });
        }
        selected
    }

    /// The access clause for one selected path; `None` when unrestricted.
    /// The flag tells whether in-memory evaluation decided a predicate.
    fn path_clause(
        &self,
        selected: &SelectedPath,
        access_type: AccessType,
        taken: &mut HashSet<Alias>,
        params: &QueryEvaluationParameters,
    ) -> Option<(Expr, bool)> {
        let mapping = self.rules.mapping();
        let all_rules = self.rules.rules();

        // Classes of the subtree grouped by the rules that apply to them.
        let mut groups: IndexMap<Vec<usize>, Vec<Arc<ClassMappingInformation>>> = IndexMap::new();
        for class in mapping.subtree(selected.class.entity_name()) {
            let applicable: Vec<usize> = all_rules
                .iter()
                .enumerate()
                .filter(|(_, rule)| rule.grants(access_type) && rule.applies_to(&class))
                .map(|(index, _)| index)
                .collect();
            groups.entry(applicable).or_default().push(class);
        }

        let mut folded = false;
        let mut disjunction = |indices: &[usize]| -> Expr {
            let predicates: Vec<Expr> = indices
                .iter()
                .map(|&index| {
                    let (predicate, decided) =
                        self.predicate(&all_rules[index], &selected.path, taken, params);
                    folded |= decided;
                    predicate
                })
                .collect();
            simplify(match predicates.len() {
                1 => predicates.into_iter().next().unwrap_or_else(|| Expr::boolean(true)),
                _ => Expr::nested(Expr::Or(predicates)),
            })
        };

        let clause = if groups.len() == 1 {
            let (indices, _) = groups.first()?;
            if indices.is_empty() {
                return None;
            }
            disjunction(indices)
        } else {
            let mut branches = Vec::new();
            let mut restricted = false;
            for (indices, classes) in &groups {
                let condition = if indices.is_empty() {
                    Expr::boolean(true)
                } else {
                    disjunction(indices)
                };
                match literal(condition) {
                    Ok(false) => {
                        restricted = true;
                        continue;
                    }
                    Ok(true) => branches.push(type_in(&selected.path, classes)),
                    Err(condition) => {
                        restricted = true;
                        branches.push(Expr::And(vec![type_in(&selected.path, classes), condition]));
                    }
                }
            }
            if !restricted {
                return None;
            }
            match branches.len() {
                0 => Expr::boolean(false),
                1 => branches.remove(0),
                _ => Expr::nested(Expr::Or(branches)),
            }
        };

        if clause.is_literal_true() {
            tracing::debug!(
                path = %selected.path,
                access_type = %access_type,
                "access rules always hold, path unrestricted"
            );
            return None;
        }
        Some((clause, folded))
    }

    /// One rule applied to `target`, with the leaves that do not depend on
    /// the query decided in memory.
    fn predicate(
        &self,
        rule: &CompiledAccessRule,
        target: &Path,
        taken: &mut HashSet<Alias>,
        params: &QueryEvaluationParameters,
    ) -> (Expr, bool) {
        let predicate = instantiate(rule, target, taken);
        let mut decided = false;
        let predicate = fold(predicate, &mut |leaf: &Expr| {
            if !self.is_query_independent(leaf, taken) {
                return None;
            }
            match self.evaluator.evaluate(leaf, params) {
                Ok(Value::Boolean(value)) => {
                    decided = true;
                    Some(value)
                }
                _ => None,
            }
        });
        let predicate = simplify(predicate);
        if decided {
            tracing::debug!(
                rule = %rule.source(),
                predicate = %predicate,
                "evaluated rule predicate in memory"
            );
        }
        (predicate, decided)
    }

    /// Whether `leaf` mentions only the security context and constants.
    fn is_query_independent(&self, leaf: &Expr, query_aliases: &HashSet<Alias>) -> bool {
        if contains_subquery(leaf) {
            return false;
        }
        let mut scan = DependencyScan::default();
        scan.visit_expr(leaf);
        if scan.parameters {
            return false;
        }
        let resolver = self.rules.resolver();
        scan.paths.iter().all(|path| {
            let root = path.root_alias();
            if query_aliases.contains(root) {
                return false;
            }
            resolver.is_external_alias(root.as_str())
                || (!path.has_subpath() && self.rules.mapping().class_mapping(root.as_str()).is_some())
        })
    }

    /// Whether `entity` satisfies a rule granting `access_type`.
    ///
    /// Entities without rules are accessible. A rule that evaluates to
    /// `FALSE`, `NULL` or cannot be decided does not grant access.
    pub fn is_accessible(
        &self,
        access_type: AccessType,
        entity: &EntityRef,
        context: &dyn SecurityContext,
    ) -> Result<bool, FilterError> {
        let params = QueryEvaluationParameters::for_context(context);
        self.is_accessible_with(access_type, entity, &params)
    }

    /// Like [`is_accessible`](Self::is_accessible), with the bindings of the
    /// caller. A check nested in a running check, through parameters the
    /// running check handed down, grants without evaluating.
    pub fn is_accessible_with(
        &self,
        access_type: AccessType,
        entity: &EntityRef,
        params: &QueryEvaluationParameters,
    ) -> Result<bool, FilterError> {
        if params.is_checking_access() {
            tracing::trace!(
                entity = %entity.entity_name(),
                access_type = %access_type,
                "nested access check skipped"
            );
            return Ok(true);
        }
        let Some(class) = self.rules.mapping().class_mapping_for_entity(entity) else {
            return Ok(true);
        };
        let rules = self.rules.rules_for(class, access_type);
        if rules.is_empty() {
            return Ok(true);
        }
        for rule in rules {
            let params = params
                .clone()
                .access_check()
                .with_alias(rule.alias().as_str(), entity.clone());
            match self.evaluator.evaluate_condition(rule.where_clause(), &params)? {
                Outcome::True => {
                    tracing::trace!(
                        entity = %entity.entity_name(),
                        rule = %rule.source(),
                        "access granted"
                    );
                    return Ok(true);
                }
                Outcome::False => {}
                Outcome::Undetermined => {
                    tracing::debug!(
                        entity = %entity.entity_name(),
                        rule = %rule.source(),
                        "rule undetermined in memory, not granting"
                    );
                }
            }
        }
        Ok(false)
    }

    /// Fail with [`FilterError::AccessDenied`] unless `entity` is accessible.
    pub fn check_access(
        &self,
        access_type: AccessType,
        entity: &EntityRef,
        context: &dyn SecurityContext,
    ) -> Result<(), FilterError> {
        if self.is_accessible(access_type, entity, context)? {
            Ok(())
        } else {
            Err(FilterError::AccessDenied {
                entity: entity.entity_name().to_string(),
                access_type,
            })
        }
    }
}

fn parenthesize(clause: Expr) -> Expr {
    match clause {
        Expr::Nested(_) => clause,
        other => Expr::nested(other),
    }
}

/// `TYPE(path) IN (A, B)`
fn type_in(path: &Path, classes: &[Arc<ClassMappingInformation>]) -> Expr {
    Expr::In {
        expr: Box::new(Expr::Type(Box::new(Expr::Path(path.clone())))),
        negated: false,
        list: InList::Values(
            classes
                .iter()
                .map(|class| Expr::Path(Path::new(class.entity_name())))
                .collect(),
        ),
    }
}

/// Conjoin `clause` with the WHERE clause of `statement`, skipping
/// conjuncts already present. Returns whether anything was added.
fn merge(statement: &mut Statement, clause: Expr) -> bool {
    let where_clause = statement.where_clause_mut();
    let existing: HashSet<String> = where_clause
        .as_ref()
        .map(|existing| existing.conjuncts().iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();
    let additions: Vec<Expr> = match clause {
        Expr::And(items) => items,
        other => vec![other],
    }
    .into_iter()
    .filter(|conjunct| !existing.contains(&conjunct.unnested().to_string()))
    .collect();
    if additions.is_empty() {
        return false;
    }

    let merged = match where_clause.take() {
        None => Expr::and(additions),
        Some(Expr::And(mut items)) => {
            items.extend(additions);
            Expr::And(items)
        }
        Some(existing @ Expr::Or(_)) => {
            let mut items = vec![Expr::nested(existing)];
            items.extend(additions);
            Expr::And(items)
        }
        Some(existing) => {
            let mut items = vec![existing];
            items.extend(additions);
            Expr::And(items)
        }
    };
    *where_clause = Some(merged);
    true
}

/// Collects the paths of SELECT items, without entering subqueries.
#[derive(Default)]
struct SelectedPathCollector(Vec<Path>);

impl Visitor for SelectedPathCollector {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            // The key of a map join is not the joined entity.
            Expr::Key(_) => {}
            Expr::Path(path) | Expr::Object(path) | Expr::Value(path) | Expr::Entry(path) => {
                self.0.push(path.clone());
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_select(&mut self, _select: &SelectStatement) {}
}

#[derive(Default)]
struct DependencyScan {
    paths: Vec<Path>,
    parameters: bool,
}

impl Visitor for DependencyScan {
    fn visit_expr(&mut self, expr: &Expr) {
        if matches!(
            expr,
            Expr::NamedParameter(_) | Expr::PositionalParameter(_)
        ) {
            self.parameters = true;
        }
        walk_expr(self, expr);
    }

    fn visit_path(&mut self, path: &Path) {
        self.paths.push(path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowgate_core::{ClassDeclaration, MappingInformation, StaticSecurityContext};
    use rowgate_rules::{AccessRulesCompiler, AliasResolver};

    fn filter() -> EntityFilter {
        let mapping = Arc::new(
            MappingInformation::builder()
                .class(
                    ClassDeclaration::new("Document")
                        .id("id")
                        .basic("id", "Long")
                        .basic("owner", "String")
                        .basic("status", "String"),
                )
                .build()
                .unwrap(),
        );
        let resolver = AliasResolver::new(mapping);
        let rules = AccessRulesCompiler::new(resolver.clone())
            .compile_text([
                "GRANT READ ACCESS TO Document d WHERE d.owner = CURRENT_PRINCIPAL OR d.status = 'public'",
                "GRANT UPDATE ACCESS TO Document d WHERE d.owner = CURRENT_PRINCIPAL AND d.status <> 'locked'",
            ])
            .unwrap();
        EntityFilter::new(Arc::new(CompiledRules::new(resolver, rules)))
    }

    fn contact_filter() -> EntityFilter {
        let mapping = Arc::new(
            MappingInformation::builder()
                .class(
                    ClassDeclaration::new("User")
                        .id("id")
                        .basic("id", "Long")
                        .basic("name", "String"),
                )
                .class(
                    ClassDeclaration::new("Contact")
                        .id("id")
                        .basic("id", "Long")
                        .single_valued("owner", "User"),
                )
                .build()
                .unwrap(),
        );
        let resolver = AliasResolver::new(mapping);
        let rules = AccessRulesCompiler::new(resolver.clone())
            .compile_text(["GRANT READ ACCESS TO User u WHERE 'admin' IN (CURRENT_ROLES)"])
            .unwrap();
        EntityFilter::new(Arc::new(CompiledRules::new(resolver, rules)))
    }

    #[test]
    fn test_select_rewrite() {
        let context = StaticSecurityContext::new("alice");
        let result = filter()
            .filter_query(
                "SELECT d FROM Document d WHERE d.id > 10",
                AccessType::Read,
                &context,
            )
            .unwrap();
        assert_eq!(
            result.query,
            "SELECT d FROM Document d WHERE d.id > 10 AND (d.owner = :param0 OR d.status = 'public')"
        );
        assert_eq!(result.user_parameter_name.as_deref(), Some("param0"));
        assert_eq!(
            result.parameters.get("param0"),
            Some(&Value::String("alice".into()))
        );
    }

    #[test]
    fn test_update_uses_range_alias() {
        let context = StaticSecurityContext::new("alice");
        let result = filter()
            .filter_query(
                "UPDATE Document doc SET doc.status = 'draft'",
                AccessType::Update,
                &context,
            )
            .unwrap();
        assert_eq!(
            result.query,
            "UPDATE Document doc SET doc.status = 'draft' WHERE doc.owner = :param0 AND doc.status <> 'locked'"
        );
        assert_eq!(result.selected_paths, vec![Path::new("doc")]);
    }

    #[test]
    fn test_selected_paths_are_deduplicated() {
        let context = StaticSecurityContext::new("alice");
        let result = filter()
            .filter_query("SELECT d.status, d FROM Document d", AccessType::Read, &context)
            .unwrap();
        assert_eq!(result.selected_paths, vec![Path::new("d")]);
        assert!(result.is_rewritten());
    }

    #[test]
    fn test_no_rules_for_access_type() {
        let context = StaticSecurityContext::new("alice");
        let query = "DELETE FROM Document d";
        let result = filter()
            .filter_query(query, AccessType::Delete, &context)
            .unwrap();
        assert_eq!(result.outcome, FilterOutcome::Unchanged);
        assert_eq!(result.query, query);
    }

    #[test]
    fn test_merge_skips_present_conjuncts() {
        let mut statement =
            parse_query("SELECT d FROM Document d WHERE d.id = 1 AND d.owner = :p").unwrap();
        let clause =
            rowgate_query::parse_expression("d.owner = :p AND (d.status = 'a' OR d.status = 'b')")
                .unwrap();
        assert!(merge(&mut statement, clause.clone()));
        assert_eq!(
            statement.to_string(),
            "SELECT d FROM Document d WHERE d.id = 1 AND d.owner = :p AND (d.status = 'a' OR d.status = 'b')"
        );
        assert!(!merge(&mut statement, clause));
    }

    #[test]
    fn test_accessibility() {
        let filter = filter();
        let document = EntityRef::new("Document")
            .with("id", 1)
            .with("owner", "alice")
            .with("status", "locked");
        let alice = StaticSecurityContext::new("alice");
        let bob = StaticSecurityContext::new("bob");
        assert!(filter.is_accessible(AccessType::Read, &document, &alice).unwrap());
        assert!(!filter.is_accessible(AccessType::Read, &document, &bob).unwrap());
        assert!(!filter.is_accessible(AccessType::Update, &document, &alice).unwrap());
        assert!(matches!(
            filter.check_access(AccessType::Update, &document, &alice),
            Err(FilterError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_outer_joined_path_denied_in_memory() {
        let context = StaticSecurityContext::new("alice");
        let result = contact_filter()
            .filter_query(
                "SELECT c, o FROM Contact c LEFT JOIN c.owner o",
                AccessType::Read,
                &context,
            )
            .unwrap();
        assert_eq!(result.outcome, FilterOutcome::Rewritten);
        assert_eq!(
            result.query,
            "SELECT c, o FROM Contact c LEFT JOIN c.owner o WHERE o IS NULL"
        );
        assert!(result.parameters.is_empty());
    }

    #[test]
    fn test_outer_joined_path_granted_in_memory() {
        let context = StaticSecurityContext::new("alice").with_role("admin");
        let query = "SELECT c, o FROM Contact c LEFT JOIN c.owner o";
        let result = contact_filter()
            .filter_query(query, AccessType::Read, &context)
            .unwrap();
        assert_eq!(result.outcome, FilterOutcome::Unchanged);
        assert_eq!(result.query, query);
    }

    #[test]
    fn test_inner_joined_path_denied_in_memory() {
        let context = StaticSecurityContext::new("alice");
        let result = contact_filter()
            .filter_query(
                "SELECT c, o FROM Contact c JOIN c.owner o",
                AccessType::Read,
                &context,
            )
            .unwrap();
        assert_eq!(result.outcome, FilterOutcome::AlwaysEmpty);
    }

    /// Checks the accessibility of `entity` from inside a subselect of the
    /// running check, as a secured loader would.
    struct NestedCheck {
        filter: EntityFilter,
        entity: EntityRef,
        results: std::sync::Mutex<Vec<bool>>,
    }

    impl crate::subselect::SubselectEvaluator for NestedCheck {
        fn evaluate(
            &self,
            _evaluator: &QueryEvaluator,
            _select: &SelectStatement,
            params: &QueryEvaluationParameters,
        ) -> Result<Vec<Value>, crate::error::EvaluationError> {
            let nested = self
                .filter
                .is_accessible_with(AccessType::Read, &self.entity, params)
                .map_err(|_| crate::error::EvaluationError::NotEvaluatable)?;
            self.results.lock().unwrap().push(nested);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_nested_check_is_not_repeated() {
        let mapping = Arc::new(
            MappingInformation::builder()
                .class(
                    ClassDeclaration::new("Document")
                        .id("id")
                        .basic("id", "Long")
                        .basic("owner", "String")
                        .basic("status", "String"),
                )
                .build()
                .unwrap(),
        );
        let resolver = AliasResolver::new(mapping.clone());
        let rules = AccessRulesCompiler::new(resolver.clone())
            .compile_text([
                "GRANT READ ACCESS TO Document d WHERE d.owner = CURRENT_PRINCIPAL \
                 OR EXISTS (SELECT s FROM Document s WHERE s.status = 'shared')",
            ])
            .unwrap();
        let base = EntityFilter::new(Arc::new(CompiledRules::new(resolver, rules)));
        let document = EntityRef::new("Document")
            .with("id", 1)
            .with("owner", "bob")
            .with("status", "draft");
        let nested = Arc::new(NestedCheck {
            filter: base.clone(),
            entity: document.clone(),
            results: std::sync::Mutex::new(Vec::new()),
        });
        let mut filter = base.clone();
        filter.evaluator = QueryEvaluator::new(mapping).with_subselect_evaluator(nested.clone());

        let alice = StaticSecurityContext::new("alice");
        assert!(!filter.is_accessible(AccessType::Read, &document, &alice).unwrap());
        assert_eq!(*nested.results.lock().unwrap(), vec![true]);

        // Outside a running check the same document is evaluated.
        let params = QueryEvaluationParameters::for_context(&alice);
        assert!(!params.is_checking_access());
        assert!(!base.is_accessible_with(AccessType::Read, &document, &params).unwrap());
        assert!(base
            .is_accessible_with(AccessType::Read, &document, &params.access_check())
            .unwrap());
    }
}
