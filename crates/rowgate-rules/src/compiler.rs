//! Access rule compilation.

use rowgate_core::AccessType;
use rowgate_query::{AccessRuleStatement, Expr, parse_rule};
use std::collections::{BTreeSet, HashSet};

use crate::error::{CompileError, ResolveError};
use crate::resolver::AliasResolver;
use crate::rule::CompiledAccessRule;

/// Turns GRANT statements into [`CompiledAccessRule`]s.
#[derive(Debug, Clone)]
pub struct AccessRulesCompiler {
    resolver: AliasResolver,
}

impl AccessRulesCompiler {
    pub fn new(resolver: AliasResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &AliasResolver {
        &self.resolver
    }

    /// Compile parsed statements. Identical rules (same target, access types
    /// and predicate text) are kept once, in declaration order.
    pub fn compile<'a, I>(&self, statements: I) -> Result<Vec<CompiledAccessRule>, CompileError>
    where
        I: IntoIterator<Item = &'a AccessRuleStatement>,
    {
        self.compile_sourced(
            statements
                .into_iter()
                .map(|statement| (statement.clone(), statement.to_string())),
        )
    }

    /// Parse and compile rule texts.
    pub fn compile_text<I, S>(&self, rules: I) -> Result<Vec<CompiledAccessRule>, CompileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let statements = rules
            .into_iter()
            .map(|text| parse_rule_text(text.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.compile_sourced(statements)
    }

    /// Compile statements paired with the text they were declared as.
    pub fn compile_sourced<I>(&self, sources: I) -> Result<Vec<CompiledAccessRule>, CompileError>
    where
        I: IntoIterator<Item = (AccessRuleStatement, String)>,
    {
        let rules = sources
            .into_iter()
            .map(|(statement, source)| self.compile_statement(&statement, source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dedup(rules))
    }

    fn compile_statement(
        &self,
        statement: &AccessRuleStatement,
        source: String,
    ) -> Result<CompiledAccessRule, CompileError> {
        let type_definitions =
            self.resolver
                .resolve_rule(statement)
                .map_err(|error| CompileError::InvalidRule {
                    rule: source.clone(),
                    source: error,
                })?;
        let target = type_definitions
            .get(&statement.alias)
            .and_then(|definition| definition.class())
            .cloned()
            .ok_or_else(|| CompileError::InvalidRule {
                rule: source.clone(),
                source: ResolveError::UnknownEntity {
                    entity: statement.entity.clone(),
                },
            })?;

        let access_types: BTreeSet<AccessType> = if statement.access_types.is_empty() {
            AccessType::ALL.into_iter().collect()
        } else {
            statement.access_types.iter().copied().collect()
        };
        let where_clause = statement
            .where_clause
            .clone()
            .unwrap_or_else(|| Expr::boolean(true));

        let rule = CompiledAccessRule::new(
            target,
            access_types,
            statement.alias.clone(),
            where_clause,
            source,
            type_definitions,
        );
        tracing::debug!(
            entity = %rule.entity_name(),
            rule = %rule,
            "compiled access rule"
        );
        Ok(rule)
    }
}

/// Parse one GRANT statement, keeping its text.
pub(crate) fn parse_rule_text(text: &str) -> Result<(AccessRuleStatement, String), CompileError> {
    let statement = parse_rule(text).map_err(|source| CompileError::Parse {
        rule: text.to_string(),
        source,
    })?;
    Ok((statement, text.to_string()))
}

fn dedup(rules: Vec<CompiledAccessRule>) -> Vec<CompiledAccessRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| {
            let fresh = seen.insert(rule.dedup_key());
            if !fresh {
                tracing::debug!(rule = %rule.source(), "dropping duplicate access rule");
            }
            fresh
        })
        .collect()
}
