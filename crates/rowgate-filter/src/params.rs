//! Per-evaluation context.

use chrono::{Local, NaiveDateTime};
use rowgate_core::{CURRENT_PRINCIPAL, CURRENT_ROLES, SecurityContext, Value};
use std::collections::HashMap;

/// Bindings of one evaluation attempt.
///
/// Aliases are matched case-insensitively. The evaluation timestamp is taken
/// once, when the parameters are created, and shared by nested scopes.
/// Parameters derived from those of an access check carry its re-entrancy
/// guard, so checks started while evaluating a rule are not repeated.
#[derive(Debug, Clone)]
pub struct QueryEvaluationParameters {
    aliases: HashMap<String, Value>,
    named: HashMap<String, Value>,
    positional: HashMap<u32, Value>,
    in_memory_only: bool,
    checking_access: bool,
    now: NaiveDateTime,
}

impl Default for QueryEvaluationParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEvaluationParameters {
    pub fn new() -> Self {
        Self {
            aliases: HashMap::new(),
            named: HashMap::new(),
            positional: HashMap::new(),
            in_memory_only: false,
            checking_access: false,
            now: Local::now().naive_local(),
        }
    }

    /// Parameters with `CURRENT_PRINCIPAL` and `CURRENT_ROLES` bound.
    pub fn for_context(context: &dyn SecurityContext) -> Self {
        Self::new()
            .with_alias(CURRENT_PRINCIPAL, context.principal())
            .with_alias(CURRENT_ROLES, Value::Collection(context.roles()))
    }

    pub fn with_alias(mut self, alias: &str, value: impl Into<Value>) -> Self {
        self.bind_alias(alias, value);
        self
    }

    pub fn bind_alias(&mut self, alias: &str, value: impl Into<Value>) {
        self.aliases.insert(alias.to_ascii_lowercase(), value.into());
    }

    pub fn alias_value(&self, alias: &str) -> Option<&Value> {
        self.aliases.get(&alias.to_ascii_lowercase())
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn with_positional_parameter(mut self, position: u32, value: impl Into<Value>) -> Self {
        self.positional.insert(position, value.into());
        self
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.named.insert(name.into(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub fn positional_parameter(&self, position: u32) -> Option<&Value> {
        self.positional.get(&position)
    }

    /// Forbid delegation to the query executor.
    pub fn in_memory_only(mut self) -> Self {
        self.in_memory_only = true;
        self
    }

    pub fn is_in_memory_only(&self) -> bool {
        self.in_memory_only
    }

    /// Mark these parameters as belonging to a running access check.
    pub fn access_check(mut self) -> Self {
        self.checking_access = true;
        self
    }

    pub fn is_checking_access(&self) -> bool {
        self.checking_access
    }

    /// Evaluation start time, used for CURRENT_DATE, CURRENT_TIME and
    /// CURRENT_TIMESTAMP.
    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }
}
