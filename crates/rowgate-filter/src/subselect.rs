//! Subselect evaluation chain.
//!
//! Evaluators are tried in order; an evaluator that cannot decide a
//! subselect returns [`EvaluationError::NotEvaluatable`] and the next one is
//! asked. The in-memory evaluator comes first, delegation to the query
//! executor last.

use rowgate_core::Value;
use rowgate_query::visit::{
    VisitorMut, declared_aliases_in_select, named_parameters, walk_expr_mut,
};
use rowgate_query::{
    Alias, ComparisonOp, Expr, FromItem, Path, RangeDeclaration, RangeSource, SelectStatement,
    Statement,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::EvaluationError;
use crate::evaluator::QueryEvaluator;
use crate::executor::{ExecutorSession, QueryExecutor};
use crate::params::QueryEvaluationParameters;

pub trait SubselectEvaluator: Send + Sync {
    fn evaluate(
        &self,
        evaluator: &QueryEvaluator,
        select: &SelectStatement,
        params: &QueryEvaluationParameters,
    ) -> Result<Vec<Value>, EvaluationError>;
}

/// Evaluates subselects in memory: path ranges below bound aliases, and
/// entity ranges when the evaluator has an entity source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleSubselectEvaluator;

impl SubselectEvaluator for SimpleSubselectEvaluator {
    fn evaluate(
        &self,
        evaluator: &QueryEvaluator,
        select: &SelectStatement,
        params: &QueryEvaluationParameters,
    ) -> Result<Vec<Value>, EvaluationError> {
        evaluator.evaluate_select(select, params)
    }
}

/// Runs subselects as standalone queries on a secondary executor session.
///
/// References to the enclosing query become parameters. Outer aliases used
/// as range roots are re-declared as entity ranges restricted to the bound
/// instance (`alias = :outerN`). The session is rolled back and closed
/// whatever the outcome.
#[derive(Clone)]
pub struct DelegatingSubselectEvaluator {
    executor: Arc<dyn QueryExecutor>,
}

impl std::fmt::Debug for DelegatingSubselectEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatingSubselectEvaluator").finish_non_exhaustive()
    }
}

impl DelegatingSubselectEvaluator {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }
}

impl SubselectEvaluator for DelegatingSubselectEvaluator {
    fn evaluate(
        &self,
        evaluator: &QueryEvaluator,
        select: &SelectStatement,
        params: &QueryEvaluationParameters,
    ) -> Result<Vec<Value>, EvaluationError> {
        if params.is_in_memory_only() {
            return Err(EvaluationError::NotEvaluatable);
        }
        let derived = derive_query(evaluator, select, params)?;
        tracing::debug!(
            query = %derived.query,
            parameters = derived.parameters.len(),
            "delegating subselect to query executor"
        );

        let mut session = SessionGuard::new(self.executor.open_session()?);
        session.get().begin()?;
        let results = {
            let mut query = session.get().create_query(&derived.query.to_string())?;
            for (name, value) in derived.parameters {
                let value = match value {
                    Value::Entity(_) => self.executor.entity_reference(&value)?,
                    other => other,
                };
                query.set_parameter(&name, value)?;
            }
            query.get_result_list()?
        };
        session.release()?;
        Ok(results)
    }
}

/// Rolls back and closes the session when dropped, unless released first.
struct SessionGuard {
    session: Box<dyn ExecutorSession>,
    released: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn ExecutorSession>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    fn get(&mut self) -> &mut dyn ExecutorSession {
        &mut *self.session
    }

    fn release(&mut self) -> anyhow::Result<()> {
        self.released = true;
        let rollback = self.session.rollback();
        let close = self.session.close();
        rollback.and(close)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(error) = self.release() {
                tracing::warn!(error = %error, "failed to release delegation session");
            }
        }
    }
}

/// A subselect rewritten to run on its own.
#[derive(Debug)]
pub(crate) struct DerivedQuery {
    pub query: SelectStatement,
    pub parameters: Vec<(String, Value)>,
}

/// Replace references to the enclosing scope by parameters.
pub(crate) fn derive_query(
    evaluator: &QueryEvaluator,
    select: &SelectStatement,
    params: &QueryEvaluationParameters,
) -> Result<DerivedQuery, EvaluationError> {
    let statement = Statement::Select(select.clone());
    let names = named_parameters(&statement);
    let mut parameters = Vec::with_capacity(names.len());
    for name in &names {
        let value = params
            .parameter(name)
            .cloned()
            .ok_or(EvaluationError::NotEvaluatable)?;
        parameters.push((name.clone(), value));
    }
    let mut taken: HashSet<String> = names.into_iter().collect();
    let Statement::Select(mut query) = statement else {
        return Err(EvaluationError::NotEvaluatable);
    };

    let mut declared = declared_aliases_in_select(&query);

    // Range roots from the enclosing query: `FROM c.phones p` becomes
    // `FROM Contact c, IN (c.phones) p ... AND c = :outer0`.
    let mut outer_roots: Vec<Alias> = Vec::new();
    for item in &query.from {
        let roots = range_root(&item.range)
            .into_iter()
            .chain(item.joins.iter().map(|join| join.path.root_alias()));
        for root in roots {
            if !declared.contains(root) && !outer_roots.contains(root) {
                outer_roots.push(root.clone());
            }
        }
    }
    let mut conditions = Vec::new();
    for (position, root) in outer_roots.iter().enumerate() {
        let value = params
            .alias_value(root.as_str())
            .cloned()
            .ok_or(EvaluationError::NotEvaluatable)?;
        let entity_name = value
            .as_entity()
            .map(|entity| entity.entity_name().to_string())
            .ok_or(EvaluationError::NotEvaluatable)?;
        let name = fresh_name(&mut taken);
        query.from.insert(
            position,
            FromItem {
                range: RangeDeclaration {
                    source: RangeSource::Entity(entity_name),
                    alias: root.clone(),
                    explicit_as: false,
                },
                joins: Vec::new(),
            },
        );
        conditions.push(Expr::comparison(
            Expr::Path(Path::new(root.as_str())),
            ComparisonOp::Equal,
            Expr::named_parameter(name.clone()),
        ));
        parameters.push((name, value));
        declared.insert(root.clone());
    }
    for item in &mut query.from {
        if let RangeSource::Path(path) = &item.range.source {
            if outer_roots.contains(path.root_alias()) {
                item.range.source = RangeSource::CollectionMember(path.clone());
            }
        }
    }

    let mut outer = OuterReferences {
        evaluator,
        params,
        declared: &declared,
        taken: &mut taken,
        parameters: &mut parameters,
        error: None,
    };
    for item in &mut query.items {
        outer.visit_expr_mut(&mut item.expr);
    }
    for item in &mut query.from {
        for join in &mut item.joins {
            if let Some(condition) = &mut join.condition {
                outer.visit_expr_mut(&mut condition.expr);
            }
        }
    }
    if let Some(condition) = &mut query.where_clause {
        outer.visit_expr_mut(condition);
    }
    for expr in &mut query.group_by {
        outer.visit_expr_mut(expr);
    }
    if let Some(having) = &mut query.having {
        outer.visit_expr_mut(having);
    }
    for item in &mut query.order_by {
        outer.visit_expr_mut(&mut item.expr);
    }
    if let Some(error) = outer.error {
        return Err(error);
    }

    if !conditions.is_empty() {
        if let Some(existing) = query.where_clause.take() {
            let existing = match existing {
                Expr::Or(_) => Expr::nested(existing),
                other => other,
            };
            conditions.insert(0, existing);
        }
        query.where_clause = Some(Expr::and(conditions));
    }

    Ok(DerivedQuery {
        query,
        parameters,
    })
}

fn range_root(range: &RangeDeclaration) -> Option<&Alias> {
    match &range.source {
        RangeSource::Entity(_) => None,
        RangeSource::Path(path) | RangeSource::CollectionMember(path) => Some(path.root_alias()),
    }
}

fn fresh_name(taken: &mut HashSet<String>) -> String {
    let mut index = 0;
    loop {
        let name = format!("outer{index}");
        if taken.insert(name.clone()) {
            return name;
        }
        index += 1;
    }
}

/// Replaces paths into the enclosing scope with parameters bound to their
/// current values.
struct OuterReferences<'a> {
    evaluator: &'a QueryEvaluator,
    params: &'a QueryEvaluationParameters,
    declared: &'a HashSet<Alias>,
    taken: &'a mut HashSet<String>,
    parameters: &'a mut Vec<(String, Value)>,
    error: Option<EvaluationError>,
}

impl OuterReferences<'_> {
    fn is_outer(&self, path: &Path) -> bool {
        !self.declared.contains(path.root_alias())
            && self.params.alias_value(path.root_alias().as_str()).is_some()
    }
}

impl VisitorMut for OuterReferences<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.error.is_some() {
            return;
        }
        if let Expr::Path(path) = expr {
            if self.is_outer(path) {
                match self.evaluator.evaluate_path(path, self.params) {
                    Ok(value) => {
                        let name = fresh_name(self.taken);
                        self.parameters.push((name.clone(), value));
                        *expr = Expr::named_parameter(name);
                    }
                    Err(error) => self.error = Some(error),
                }
            }
            return;
        }
        walk_expr_mut(self, expr);
    }

    // Remaining paths sit where a parameter cannot stand (ranges, KEY(),
    // MEMBER OF collections); an outer root there cannot be delegated.
    fn visit_path_mut(&mut self, path: &mut Path) {
        if self.error.is_none() && self.is_outer(path) {
            self.error = Some(EvaluationError::NotEvaluatable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowgate_core::{ClassDeclaration, EntityRef, MappingInformation};
    use rowgate_query::parse_select;

    fn evaluator() -> QueryEvaluator {
        let mapping = MappingInformation::builder()
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
                    .single_valued("owner", "User")
                    .collection("phones", "Phone"),
            )
            .class(
                ClassDeclaration::new("Phone")
                    .id("id")
                    .basic("id", "Long")
                    .basic("number", "String"),
            )
            .build()
            .unwrap();
        QueryEvaluator::new(Arc::new(mapping))
    }

    #[test]
    fn test_outer_paths_become_parameters() {
        let john = EntityRef::new("User").with("id", 1).with("name", "John");
        let contact = EntityRef::new("Contact").with("id", 7).with("owner", john.clone());
        let params = QueryEvaluationParameters::new()
            .with_alias("c", contact)
            .with_parameter("limit", 3);
        let select =
            parse_select("SELECT u FROM User u WHERE u = c.owner AND u.id < :limit").unwrap();
        let derived = derive_query(&evaluator(), &select, &params).unwrap();
        assert_eq!(
            derived.query.to_string(),
            "SELECT u FROM User u WHERE u = :outer0 AND u.id < :limit"
        );
        assert_eq!(
            derived.parameters,
            vec![
                ("limit".to_string(), Value::Integer(3)),
                ("outer0".to_string(), Value::Entity(john)),
            ]
        );
    }

    #[test]
    fn test_outer_range_roots_are_redeclared() {
        let contact = EntityRef::new("Contact").with("id", 7);
        let params = QueryEvaluationParameters::new().with_alias("c", contact.clone());
        let select =
            parse_select("SELECT p FROM c.phones p WHERE p.number LIKE '+49%' OR p.id = 1")
                .unwrap();
        let derived = derive_query(&evaluator(), &select, &params).unwrap();
        assert_eq!(
            derived.query.to_string(),
            "SELECT p FROM Contact c, IN (c.phones) p WHERE (p.number LIKE '+49%' OR p.id = 1) AND c = :outer0"
        );
        assert_eq!(
            derived.parameters,
            vec![("outer0".to_string(), Value::Entity(contact))]
        );
    }

    #[test]
    fn test_unbound_parameter_is_not_evaluatable() {
        let select = parse_select("SELECT u FROM User u WHERE u.id = :id").unwrap();
        assert!(matches!(
            derive_query(&evaluator(), &select, &QueryEvaluationParameters::new()),
            Err(EvaluationError::NotEvaluatable)
        ));
    }
}
