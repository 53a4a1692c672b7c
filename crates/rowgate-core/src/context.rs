//! Security context: the current principal and its roles.

use crate::value::Value;

/// Pseudo-alias bound to the current principal.
pub const CURRENT_PRINCIPAL: &str = "CURRENT_PRINCIPAL";

/// Pseudo-alias bound to the collection of the current principal's roles.
pub const CURRENT_ROLES: &str = "CURRENT_ROLES";

/// Supplies the identity the access rules are evaluated for.
///
/// Authentication and role lookup happen outside rowgate; the filter only
/// asks for the values on demand.
pub trait SecurityContext: Send + Sync {
    /// The current principal, or `NULL` when unauthenticated.
    fn principal(&self) -> Value;

    /// The roles of the current principal.
    fn roles(&self) -> Vec<Value>;

    /// Value of an external alias, if this context defines it.
    fn alias_value(&self, alias: &str) -> Option<Value> {
        if alias.eq_ignore_ascii_case(CURRENT_PRINCIPAL) {
            Some(self.principal())
        } else if alias.eq_ignore_ascii_case(CURRENT_ROLES) {
            Some(Value::Collection(self.roles()))
        } else {
            None
        }
    }
}

/// A fixed principal and role set.
#[derive(Debug, Clone, Default)]
pub struct StaticSecurityContext {
    principal: Value,
    roles: Vec<Value>,
}

impl StaticSecurityContext {
    pub fn new(principal: impl Into<Value>) -> Self {
        Self {
            principal: principal.into(),
            roles: Vec::new(),
        }
    }

    /// Context without principal and roles.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<Value>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Value>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }
}

impl SecurityContext for StaticSecurityContext {
    fn principal(&self) -> Value {
        self.principal.clone()
    }

    fn roles(&self) -> Vec<Value> {
        self.roles.clone()
    }
}
