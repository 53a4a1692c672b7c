//! In-memory evaluation of query expressions.
//!
//! Conditions follow SQL three-valued logic extended by a fourth state,
//! undetermined, for expressions that cannot be decided in memory
//! (`Err(EvaluationError::NotEvaluatable)`). AND and OR combine the states
//! the Kleene way: a determined `FALSE` decides an AND, a determined `TRUE`
//! decides an OR, otherwise undetermined wins over `NULL`.

use regex::Regex;
use rowgate_core::{MappingInformation, Value};
use rowgate_query::{
    AggregateFunction, BinaryOp, CaseExpr, ComparisonOp, Expr, Function, InList, Join, Literal,
    OrderItem, Path, Quantifier, RangeDeclaration, RangeSource, SelectStatement, SortDirection,
    TrimSpec, UnaryOp,
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::EvaluationError;
use crate::executor::EntitySource;
use crate::params::QueryEvaluationParameters;
use crate::path_eval::{PathEvaluator, flatten};
use crate::subselect::{SimpleSubselectEvaluator, SubselectEvaluator};

/// Truth of a condition as seen by access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    True,
    /// `FALSE` or `NULL`.
    False,
    Undetermined,
}

impl Outcome {
    pub fn is_true(self) -> bool {
        self == Outcome::True
    }
}

/// Evaluates expressions against bound aliases and parameters.
#[derive(Clone)]
pub struct QueryEvaluator {
    mapping: Arc<MappingInformation>,
    paths: PathEvaluator,
    subselects: Vec<Arc<dyn SubselectEvaluator>>,
    entity_source: Option<Arc<dyn EntitySource>>,
    like_escape: Option<char>,
}

impl fmt::Debug for QueryEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEvaluator")
            .field("subselect_evaluators", &self.subselects.len())
            .field("entity_source", &self.entity_source.is_some())
            .field("like_escape", &self.like_escape)
            .finish()
    }
}

impl QueryEvaluator {
    /// An evaluator whose subselect chain holds the in-memory evaluator only.
    pub fn new(mapping: Arc<MappingInformation>) -> Self {
        Self {
            paths: PathEvaluator::new(mapping.clone()),
            mapping,
            subselects: vec![Arc::new(SimpleSubselectEvaluator)],
            entity_source: None,
            like_escape: None,
        }
    }

    /// Append an evaluator to the subselect chain.
    pub fn with_subselect_evaluator(mut self, evaluator: Arc<dyn SubselectEvaluator>) -> Self {
        self.subselects.push(evaluator);
        self
    }

    pub fn with_entity_source(mut self, source: Arc<dyn EntitySource>) -> Self {
        self.entity_source = Some(source);
        self
    }

    /// Escape character for LIKE patterns without an ESCAPE clause.
    pub fn with_like_escape(mut self, escape: Option<char>) -> Self {
        self.like_escape = escape;
        self
    }

    pub fn mapping(&self) -> &Arc<MappingInformation> {
        &self.mapping
    }

    pub fn path_evaluator(&self) -> &PathEvaluator {
        &self.paths
    }

    /// Evaluate a condition; `NULL` and non-boolean results are `False`.
    pub fn evaluate_condition(
        &self,
        expr: &Expr,
        params: &QueryEvaluationParameters,
    ) -> Result<Outcome, EvaluationError> {
        match self.evaluate(expr, params) {
            Ok(Value::Boolean(true)) => Ok(Outcome::True),
            Ok(_) => Ok(Outcome::False),
            Err(EvaluationError::NotEvaluatable) => Ok(Outcome::Undetermined),
            Err(error) => Err(error),
        }
    }

    pub fn evaluate(
        &self,
        expr: &Expr,
        params: &QueryEvaluationParameters,
    ) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Path(path) | Expr::Object(path) => self.evaluate_path(path, params),
            Expr::Literal(literal) => literal_value(literal),
            Expr::NamedParameter(name) => params
                .parameter(name)
                .cloned()
                .ok_or(EvaluationError::NotEvaluatable),
            Expr::PositionalParameter(position) => params
                .positional_parameter(*position)
                .cloned()
                .ok_or(EvaluationError::NotEvaluatable),
            Expr::Nested(inner) => self.evaluate(inner, params),
            Expr::Unary { op, expr } => {
                let value = self.evaluate(expr, params)?;
                match (op, value) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Plus, value @ (Value::Integer(_) | Value::Decimal(_))) => Ok(value),
                    (UnaryOp::Minus, Value::Integer(i)) => Ok(match i.checked_neg() {
                        Some(negated) => Value::Integer(negated),
                        None => Value::Decimal(-(i as f64)),
                    }),
                    (UnaryOp::Minus, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
                    _ => Err(EvaluationError::NotEvaluatable),
                }
            }
            Expr::Binary { left, op, right } => {
                let left = self.evaluate(left, params)?;
                let right = self.evaluate(right, params)?;
                arithmetic(&left, *op, &right)
            }
            Expr::Comparison { left, op, right } => match right.as_ref() {
                Expr::Quantified {
                    quantifier,
                    subquery,
                } => self.quantified(left, *op, *quantifier, subquery, params),
                _ => {
                    let left = self.evaluate(left, params)?;
                    let right = self.evaluate(right, params)?;
                    self.compare(&left, *op, &right)
                }
            },
            Expr::And(items) => self.and(items.iter().map(|item| self.evaluate(item, params))),
            Expr::Or(items) => self.or(items.iter().map(|item| self.evaluate(item, params))),
            Expr::Not(inner) => match self.evaluate(inner, params)? {
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                Value::Null => Ok(Value::Null),
                _ => Err(EvaluationError::NotEvaluatable),
            },
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let value = self.evaluate(expr, params)?;
                let low = self.evaluate(low, params)?;
                let high = self.evaluate(high, params)?;
                let within = self.and([
                    self.compare(&value, ComparisonOp::GreaterEqual, &low),
                    self.compare(&value, ComparisonOp::LessEqual, &high),
                ])?;
                Ok(negate_if(within, *negated))
            }
            Expr::Like {
                expr,
                negated,
                pattern,
                escape,
            } => {
                let value = self.evaluate(expr, params)?;
                let pattern = self.evaluate(pattern, params)?;
                let escape = match escape {
                    Some(escape) => match self.evaluate(escape, params)? {
                        Value::Null => return Ok(Value::Null),
                        Value::String(s) if s.chars().count() == 1 => s.chars().next(),
                        _ => return Err(EvaluationError::NotEvaluatable),
                    },
                    None => self.like_escape,
                };
                match (value, pattern) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::String(value), Value::String(pattern)) => Ok(negate_if(
                        Value::Boolean(like(&value, &pattern, escape)?),
                        *negated,
                    )),
                    _ => Err(EvaluationError::NotEvaluatable),
                }
            }
            Expr::In {
                expr,
                negated,
                list,
            } => {
                let value = self.evaluate(expr, params)?;
                let candidates = match list {
                    InList::Values(items) => {
                        let mut candidates = Vec::new();
                        for item in items {
                            candidates.extend(elements(self.evaluate(item, params)?));
                        }
                        candidates
                    }
                    InList::Subquery(select) => self.evaluate_subselect(select, params)?,
                    InList::Parameter(parameter) => elements(self.evaluate(parameter, params)?),
                };
                Ok(negate_if(self.member(&value, &candidates), *negated))
            }
            Expr::IsNull { expr, negated } => {
                let value = self.evaluate(expr, params)?;
                Ok(Value::Boolean(value.is_null() != *negated))
            }
            Expr::IsEmpty { expr, negated } => {
                let empty = match self.evaluate(expr, params)? {
                    Value::Null => true,
                    Value::Collection(items) => items.is_empty(),
                    Value::Map(entries) => entries.is_empty(),
                    _ => return Err(EvaluationError::NotEvaluatable),
                };
                Ok(Value::Boolean(empty != *negated))
            }
            Expr::MemberOf {
                expr,
                negated,
                collection,
                ..
            } => {
                let value = self.evaluate(expr, params)?;
                let collection = flatten(self.evaluate_path(collection, params)?);
                Ok(negate_if(self.member(&value, &collection), *negated))
            }
            Expr::Exists(select) => Ok(Value::Boolean(
                !self.evaluate_subselect(select, params)?.is_empty(),
            )),
            // Only meaningful as the right operand of a comparison.
            Expr::Quantified { .. } => Err(EvaluationError::NotEvaluatable),
            Expr::Subquery(select) => {
                let mut rows = self.evaluate_subselect(select, params)?;
                match rows.len() {
                    0 => Ok(Value::Null),
                    1 => Ok(rows.remove(0)),
                    _ => Err(EvaluationError::NotSingleValued {
                        path: select.to_string(),
                    }),
                }
            }
            Expr::Case(case) => self.case(case, params),
            Expr::Coalesce(items) => {
                for item in items {
                    let value = self.evaluate(item, params)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            Expr::NullIf(left, right) => {
                let left = self.evaluate(left, params)?;
                let right = self.evaluate(right, params)?;
                if self.equals(&left, &right) == Some(true) {
                    Ok(Value::Null)
                } else {
                    Ok(left)
                }
            }
            Expr::Function { function, args } => self.function(*function, args, params),
            Expr::Trim {
                spec,
                character,
                expr,
                ..
            } => {
                let character = match character {
                    Some(character) => match self.evaluate(character, params)? {
                        Value::Null => return Ok(Value::Null),
                        Value::String(s) if s.chars().count() == 1 => s.chars().next(),
                        _ => return Err(EvaluationError::NotEvaluatable),
                    },
                    None => Some(' '),
                };
                match self.evaluate(expr, params)? {
                    Value::Null => Ok(Value::Null),
                    Value::String(s) => {
                        let c = character.unwrap_or(' ');
                        let trimmed = match spec.unwrap_or(TrimSpec::Both) {
                            TrimSpec::Leading => s.trim_start_matches(c),
                            TrimSpec::Trailing => s.trim_end_matches(c),
                            TrimSpec::Both => s.trim_matches(c),
                        };
                        Ok(Value::String(trimmed.to_string()))
                    }
                    _ => Err(EvaluationError::NotEvaluatable),
                }
            }
            // Aggregates only appear in subselect projections.
            Expr::Aggregate { .. } | Expr::Constructor { .. } => {
                Err(EvaluationError::NotEvaluatable)
            }
            Expr::CurrentDate => Ok(Value::Date(params.now().date())),
            Expr::CurrentTime => Ok(Value::Time(params.now().time())),
            Expr::CurrentTimestamp => Ok(Value::Timestamp(params.now())),
            Expr::Type(inner) => match self.evaluate(inner, params)? {
                Value::Null => Ok(Value::Null),
                value => match value.as_entity() {
                    Some(entity) => Ok(Value::EntityType(entity.entity_name().to_string())),
                    None => Err(EvaluationError::NotEvaluatable),
                },
            },
            Expr::Key(path) => match self.evaluate_path(path, params)? {
                Value::Entry(key, _) => Ok(*key),
                Value::Null => Ok(Value::Null),
                _ => Err(EvaluationError::NotEvaluatable),
            },
            Expr::Value(path) => match self.evaluate_path(path, params)? {
                Value::Entry(_, value) => Ok(*value),
                other => Ok(other),
            },
            Expr::Entry(path) => self.evaluate_path(path, params),
        }
    }

    /// Value of `path`: the bound alias value navigated through the
    /// segments. An unbound bare entity name is an entity type literal.
    pub fn evaluate_path(
        &self,
        path: &Path,
        params: &QueryEvaluationParameters,
    ) -> Result<Value, EvaluationError> {
        let root = path.root_alias().as_str();
        let value = match params.alias_value(root) {
            Some(value) => value,
            None if !path.has_subpath() && self.mapping.class_mapping(root).is_some() => {
                return Ok(Value::EntityType(root.to_string()));
            }
            None => return Err(EvaluationError::NotEvaluatable),
        };
        self.paths
            .evaluate_segments(value, path.segments())
            .map_err(|error| match error {
                EvaluationError::NotSingleValued { .. } => EvaluationError::NotSingleValued {
                    path: path.to_string(),
                },
                other => other,
            })
    }

    /// All values of `path`, flattened.
    fn path_values(
        &self,
        path: &Path,
        params: &QueryEvaluationParameters,
    ) -> Result<Vec<Value>, EvaluationError> {
        let root = params
            .alias_value(path.root_alias().as_str())
            .ok_or(EvaluationError::NotEvaluatable)?;
        Ok(self
            .paths
            .evaluate_all_segments(std::slice::from_ref(root), path.segments()))
    }

    /// Rows of a subselect, from the first evaluator of the chain that can
    /// decide it.
    pub fn evaluate_subselect(
        &self,
        select: &SelectStatement,
        params: &QueryEvaluationParameters,
    ) -> Result<Vec<Value>, EvaluationError> {
        for evaluator in &self.subselects {
            match evaluator.evaluate(self, select, params) {
                Err(EvaluationError::NotEvaluatable) => continue,
                result => return result,
            }
        }
        tracing::trace!(subselect = %select, "subselect is undetermined");
        Err(EvaluationError::NotEvaluatable)
    }

    /// Evaluate a complete SELECT in memory.
    ///
    /// Entity ranges need an [`EntitySource`]; path ranges are read from the
    /// bound aliases. GROUP BY and HAVING are not supported. Each row is the
    /// value of the single select item, or a collection of the item values.
    pub fn evaluate_select(
        &self,
        select: &SelectStatement,
        params: &QueryEvaluationParameters,
    ) -> Result<Vec<Value>, EvaluationError> {
        if !select.group_by.is_empty() || select.having.is_some() {
            return Err(EvaluationError::NotEvaluatable);
        }

        let mut rows = vec![params.clone()];
        for item in &select.from {
            rows = self.range_rows(rows, &item.range)?;
            for join in &item.joins {
                rows = self.join_rows(rows, join)?;
            }
        }

        let mut matched = Vec::new();
        for row in rows {
            let keep = match &select.where_clause {
                None => true,
                Some(condition) => self.decide(condition, &row)?,
            };
            if keep {
                matched.push(row);
            }
        }

        if !select.order_by.is_empty() {
            matched = self.sort(matched, &select.order_by)?;
        }

        let aggregated = select
            .items
            .iter()
            .any(|item| matches!(item.expr.unnested(), Expr::Aggregate { .. }));
        let mut results = if aggregated {
            let values = select
                .items
                .iter()
                .map(|item| self.aggregate(&item.expr, &matched))
                .collect::<Result<Vec<_>, _>>()?;
            vec![row_value(values)]
        } else {
            let mut results = Vec::with_capacity(matched.len());
            for row in &matched {
                let values = select
                    .items
                    .iter()
                    .map(|item| self.evaluate(&item.expr, row))
                    .collect::<Result<Vec<_>, _>>()?;
                results.push(row_value(values));
            }
            results
        };

        if select.distinct {
            let mut distinct: Vec<Value> = Vec::with_capacity(results.len());
            for value in results {
                if !distinct
                    .iter()
                    .any(|seen| self.equals(seen, &value) == Some(true) || seen == &value)
                {
                    distinct.push(value);
                }
            }
            results = distinct;
        }
        Ok(results)
    }

    fn decide(
        &self,
        condition: &Expr,
        params: &QueryEvaluationParameters,
    ) -> Result<bool, EvaluationError> {
        match self.evaluate_condition(condition, params)? {
            Outcome::True => Ok(true),
            Outcome::False => Ok(false),
            Outcome::Undetermined => Err(EvaluationError::NotEvaluatable),
        }
    }

    fn range_rows(
        &self,
        rows: Vec<QueryEvaluationParameters>,
        range: &RangeDeclaration,
    ) -> Result<Vec<QueryEvaluationParameters>, EvaluationError> {
        let mut out = Vec::new();
        for row in rows {
            let candidates = match &range.source {
                RangeSource::Entity(name) => self
                    .entity_source
                    .as_ref()
                    .ok_or(EvaluationError::NotEvaluatable)?
                    .entities(name),
                RangeSource::Path(path) | RangeSource::CollectionMember(path) => {
                    self.path_values(path, &row)?
                }
            };
            for candidate in candidates {
                out.push(row.clone().with_alias(range.alias.as_str(), candidate));
            }
        }
        Ok(out)
    }

    fn join_rows(
        &self,
        rows: Vec<QueryEvaluationParameters>,
        join: &Join,
    ) -> Result<Vec<QueryEvaluationParameters>, EvaluationError> {
        let mut out = Vec::new();
        for row in rows {
            let values = self.path_values(&join.path, &row)?;
            let Some(alias) = &join.alias else {
                if !values.is_empty() || join.kind.is_outer() {
                    out.push(row);
                }
                continue;
            };
            let mut matched = false;
            for value in values {
                let candidate = row.clone().with_alias(alias.as_str(), value);
                let keep = match &join.condition {
                    None => true,
                    Some(condition) => self.decide(&condition.expr, &candidate)?,
                };
                if keep {
                    matched = true;
                    out.push(candidate);
                }
            }
            if !matched && join.kind.is_outer() {
                out.push(row.with_alias(alias.as_str(), Value::Null));
            }
        }
        Ok(out)
    }

    fn sort(
        &self,
        rows: Vec<QueryEvaluationParameters>,
        order_by: &[OrderItem],
    ) -> Result<Vec<QueryEvaluationParameters>, EvaluationError> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let keys = order_by
                .iter()
                .map(|item| self.evaluate(&item.expr, &row))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((keys, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (item, (a, b)) in order_by.iter().zip(a.iter().zip(b.iter())) {
                let ordering = match (a.is_null(), b.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => ordering(a, b).unwrap_or(Ordering::Equal),
                };
                let ordering = match item.direction {
                    Some(SortDirection::Desc) => ordering.reverse(),
                    _ => ordering,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    fn aggregate(
        &self,
        expr: &Expr,
        rows: &[QueryEvaluationParameters],
    ) -> Result<Value, EvaluationError> {
        let Expr::Aggregate {
            function,
            distinct,
            arg,
        } = expr.unnested()
        else {
            return Err(EvaluationError::NotEvaluatable);
        };
        let mut values: Vec<Value> = Vec::new();
        for row in rows {
            let value = self.evaluate(arg, row)?;
            if value.is_null() || (*distinct && values.contains(&value)) {
                continue;
            }
            values.push(value);
        }

        match function {
            AggregateFunction::Count => Ok(Value::Integer(values.len() as i64)),
            AggregateFunction::Sum => values
                .iter()
                .try_fold(Value::Null, |sum, value| match sum {
                    Value::Null => Ok(value.clone()),
                    sum => arithmetic(&sum, BinaryOp::Add, value),
                }),
            AggregateFunction::Avg => {
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                let mut total = 0.0;
                for value in &values {
                    total += number(value)
                        .ok_or(EvaluationError::NotEvaluatable)?
                        .as_f64();
                }
                Ok(Value::Decimal(total / values.len() as f64))
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let wanted = if *function == AggregateFunction::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut best: Option<Value> = None;
                for value in values {
                    best = match best {
                        None => Some(value),
                        Some(current) => {
                            let ordering = ordering(&value, &current)
                                .ok_or(EvaluationError::NotEvaluatable)?;
                            Some(if ordering == wanted { value } else { current })
                        }
                    };
                }
                Ok(best.unwrap_or(Value::Null))
            }
        }
    }

    fn quantified(
        &self,
        left: &Expr,
        op: ComparisonOp,
        quantifier: Quantifier,
        subquery: &SelectStatement,
        params: &QueryEvaluationParameters,
    ) -> Result<Value, EvaluationError> {
        let left = self.evaluate(left, params)?;
        let rows = self.evaluate_subselect(subquery, params)?;
        let comparisons = rows.iter().map(|row| self.compare(&left, op, row));
        match quantifier {
            Quantifier::All => self.and(comparisons),
            Quantifier::Any | Quantifier::Some => self.or(comparisons),
        }
    }

    fn and<I>(&self, operands: I) -> Result<Value, EvaluationError>
    where
        I: IntoIterator<Item = Result<Value, EvaluationError>>,
    {
        let mut null = false;
        let mut undetermined = false;
        for operand in operands {
            match operand {
                Ok(Value::Boolean(false)) => return Ok(Value::Boolean(false)),
                Ok(Value::Boolean(true)) => {}
                Ok(Value::Null) => null = true,
                Ok(_) | Err(EvaluationError::NotEvaluatable) => undetermined = true,
                Err(error) => return Err(error),
            }
        }
        if undetermined {
            Err(EvaluationError::NotEvaluatable)
        } else if null {
            Ok(Value::Null)
        } else {
            Ok(Value::Boolean(true))
        }
    }

    fn or<I>(&self, operands: I) -> Result<Value, EvaluationError>
    where
        I: IntoIterator<Item = Result<Value, EvaluationError>>,
    {
        let mut null = false;
        let mut undetermined = false;
        for operand in operands {
            match operand {
                Ok(Value::Boolean(true)) => return Ok(Value::Boolean(true)),
                Ok(Value::Boolean(false)) => {}
                Ok(Value::Null) => null = true,
                Ok(_) | Err(EvaluationError::NotEvaluatable) => undetermined = true,
                Err(error) => return Err(error),
            }
        }
        if undetermined {
            Err(EvaluationError::NotEvaluatable)
        } else if null {
            Ok(Value::Null)
        } else {
            Ok(Value::Boolean(false))
        }
    }

    fn case(
        &self,
        case: &CaseExpr,
        params: &QueryEvaluationParameters,
    ) -> Result<Value, EvaluationError> {
        match &case.operand {
            Some(operand) => {
                let operand = self.evaluate(operand, params)?;
                for (when, then) in &case.whens {
                    let when = self.evaluate(when, params)?;
                    if self.equals(&operand, &when) == Some(true) {
                        return self.evaluate(then, params);
                    }
                }
            }
            None => {
                for (when, then) in &case.whens {
                    if self.evaluate(when, params)? == Value::Boolean(true) {
                        return self.evaluate(then, params);
                    }
                }
            }
        }
        match &case.else_expr {
            Some(else_expr) => self.evaluate(else_expr, params),
            None => Ok(Value::Null),
        }
    }

    fn function(
        &self,
        function: Function,
        args: &[Expr],
        params: &QueryEvaluationParameters,
    ) -> Result<Value, EvaluationError> {
        let values = args
            .iter()
            .map(|arg| self.evaluate(arg, params))
            .collect::<Result<Vec<_>, _>>()?;

        match function {
            Function::Size => {
                return match values.first() {
                    Some(Value::Collection(items)) => Ok(Value::Integer(items.len() as i64)),
                    Some(Value::Map(entries)) => Ok(Value::Integer(entries.len() as i64)),
                    Some(Value::Null) => Ok(Value::Integer(0)),
                    _ => Err(EvaluationError::NotEvaluatable),
                };
            }
            // Positions in ordered lists are not tracked in memory.
            Function::Index => return Err(EvaluationError::NotEvaluatable),
            _ => {}
        }
        if values.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }

        match (function, values.as_slice()) {
            (Function::Concat, values) => {
                let mut out = String::new();
                for value in values {
                    out.push_str(value.as_str().ok_or(EvaluationError::NotEvaluatable)?);
                }
                Ok(Value::String(out))
            }
            (Function::Substring, [Value::String(s), start, rest @ ..]) => {
                let start = integer(start)?.max(1) as usize - 1;
                let chars = s.chars().skip(start);
                let out: String = match rest.first() {
                    Some(length) => chars.take(integer(length)?.max(0) as usize).collect(),
                    None => chars.collect(),
                };
                Ok(Value::String(out))
            }
            (Function::Lower, [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),
            (Function::Upper, [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
            (Function::Length, [Value::String(s)]) => Ok(Value::Integer(s.chars().count() as i64)),
            (Function::Locate, [Value::String(needle), Value::String(haystack), rest @ ..]) => {
                let start = match rest.first() {
                    Some(start) => integer(start)?.max(1) as usize - 1,
                    None => 0,
                };
                let tail: String = haystack.chars().skip(start).collect();
                let position = match tail.find(needle.as_str()) {
                    Some(byte) => (start + tail[..byte].chars().count() + 1) as i64,
                    None => 0,
                };
                Ok(Value::Integer(position))
            }
            (Function::Abs, [Value::Integer(i)]) => Ok(match i.checked_abs() {
                Some(abs) => Value::Integer(abs),
                None => Value::Decimal((*i as f64).abs()),
            }),
            (Function::Abs, [Value::Decimal(d)]) => Ok(Value::Decimal(d.abs())),
            (Function::Sqrt, [value]) => {
                let n = number(value).ok_or(EvaluationError::NotEvaluatable)?;
                Ok(Value::Decimal(n.as_f64().sqrt()))
            }
            (Function::Mod, [a, b]) => {
                let (a, b) = (integer(a)?, integer(b)?);
                if b == 0 {
                    Ok(Value::Null)
                } else {
                    // i64::MIN % -1 overflows, the remainder is zero
                    Ok(Value::Integer(a.checked_rem(b).unwrap_or(0)))
                }
            }
            _ => Err(EvaluationError::NotEvaluatable),
        }
    }

    /// Equality with numeric promotion and persistence identity for
    /// entities; `None` when the values are not comparable.
    pub fn equals(&self, a: &Value, b: &Value) -> Option<bool> {
        match (a, b) {
            (Value::Entry(_, a), b) => self.equals(a, b),
            (a, Value::Entry(_, b)) => self.equals(a, b),
            (Value::Entity(a), Value::Entity(b)) => Some(self.mapping.same_entity(a, b)),
            (Value::EntityType(a), Value::EntityType(b)) => Some(a == b),
            (Value::Collection(a), Value::Collection(b)) => Some(
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(a, b)| self.equals(a, b) == Some(true)),
            ),
            (a, b) => ordering(a, b).map(|ordering| ordering == Ordering::Equal),
        }
    }

    fn compare(&self, left: &Value, op: ComparisonOp, right: &Value) -> Result<Value, EvaluationError> {
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }
        let result = match op {
            ComparisonOp::Equal => self.equals(left, right),
            ComparisonOp::NotEqual | ComparisonOp::BangEqual => {
                self.equals(left, right).map(|equal| !equal)
            }
            ComparisonOp::Less => ordering(left, right).map(Ordering::is_lt),
            ComparisonOp::LessEqual => ordering(left, right).map(Ordering::is_le),
            ComparisonOp::Greater => ordering(left, right).map(Ordering::is_gt),
            ComparisonOp::GreaterEqual => ordering(left, right).map(Ordering::is_ge),
        };
        result
            .map(Value::Boolean)
            .ok_or(EvaluationError::NotEvaluatable)
    }

    /// Three-valued membership of `value` in `candidates`.
    fn member(&self, value: &Value, candidates: &[Value]) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        let mut saw_null = false;
        for candidate in candidates {
            if candidate.is_null() {
                saw_null = true;
            } else if self.equals(value, candidate) == Some(true) {
                return Value::Boolean(true);
            }
        }
        if saw_null {
            Value::Null
        } else {
            Value::Boolean(false)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Decimal(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Decimal(d) => d,
        }
    }
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Integer(i) => Some(Number::Integer(*i)),
        Value::Decimal(d) => Some(Number::Decimal(*d)),
        _ => None,
    }
}

fn integer(value: &Value) -> Result<i64, EvaluationError> {
    match value {
        Value::Integer(i) => Ok(*i),
        _ => Err(EvaluationError::NotEvaluatable),
    }
}

/// Ordering of comparable values; numbers are promoted to decimals when
/// their kinds differ.
fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            number(a)?.as_f64().partial_cmp(&number(b)?.as_f64())
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Timestamp(b)) => Some(a.and_hms_opt(0, 0, 0)?.cmp(b)),
        (Value::Timestamp(a), Value::Date(b)) => Some(a.cmp(&b.and_hms_opt(0, 0, 0)?)),
        _ => None,
    }
}

fn arithmetic(left: &Value, op: BinaryOp, right: &Value) -> Result<Value, EvaluationError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let (Some(a), Some(b)) = (number(left), number(right)) else {
        return Err(EvaluationError::NotEvaluatable);
    };
    if let (Number::Integer(a), Number::Integer(b)) = (a, b) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide if b == 0 => return Ok(Value::Null),
            BinaryOp::Divide => a.checked_div(b),
        };
        if let Some(result) = result {
            return Ok(Value::Integer(result));
        }
    }
    let (a, b) = (a.as_f64(), b.as_f64());
    Ok(match op {
        BinaryOp::Add => Value::Decimal(a + b),
        BinaryOp::Subtract => Value::Decimal(a - b),
        BinaryOp::Multiply => Value::Decimal(a * b),
        BinaryOp::Divide if b == 0.0 => Value::Null,
        BinaryOp::Divide => Value::Decimal(a / b),
    })
}

fn literal_value(literal: &Literal) -> Result<Value, EvaluationError> {
    match literal {
        Literal::Null => Ok(Value::Null),
        Literal::Boolean(b) => Ok(Value::Boolean(*b)),
        Literal::String(s) => Ok(Value::String(s.clone())),
        Literal::Number(text) => number_literal(text).ok_or(EvaluationError::NotEvaluatable),
    }
}

/// Numeric literal as written: `10`, `10L`, `1.5`, `1e3`, `2.5D`, `3F`.
fn number_literal(text: &str) -> Option<Value> {
    let lower = text.to_ascii_lowercase();
    if let Some(digits) = lower.strip_suffix('l') {
        return digits.parse().ok().map(Value::Integer);
    }
    if let Some(digits) = lower.strip_suffix('d').or_else(|| lower.strip_suffix('f')) {
        return digits.parse().ok().map(Value::Decimal);
    }
    if lower.contains(['.', 'e']) {
        return lower.parse().ok().map(Value::Decimal);
    }
    lower
        .parse()
        .map(Value::Integer)
        .ok()
        .or_else(|| lower.parse().ok().map(Value::Decimal))
}

/// Match a LIKE pattern: `%` any sequence, `_` any character, `escape`
/// makes the next character literal.
fn like(value: &str, pattern: &str, escape: Option<char>) -> Result<bool, EvaluationError> {
    let mut regex = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            if let Some(literal) = chars.next() {
                regex.push_str(&regex::escape(literal.encode_utf8(&mut [0; 4])));
            }
            continue;
        }
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    regex.push('$');
    let regex = Regex::new(&regex).map_err(|_| EvaluationError::NotEvaluatable)?;
    Ok(regex.is_match(value))
}

fn negate_if(value: Value, negated: bool) -> Value {
    match value {
        Value::Boolean(b) if negated => Value::Boolean(!b),
        other => other,
    }
}

/// Items of an IN list operand; `NULL` stays a single item.
fn elements(value: Value) -> Vec<Value> {
    match value {
        Value::Null => vec![Value::Null],
        other => flatten(other),
    }
}

fn row_value(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Collection(values)
    }
}
