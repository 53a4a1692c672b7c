//! Property access strategies.
//!
//! A strategy is the only place that knows how a property value is read from
//! or written to an entity instance.

use std::fmt;
use std::sync::Arc;

use crate::value::{EntityRef, Value};

/// Reads and writes one property on a target entity.
pub trait PropertyAccessStrategy: Send + Sync + fmt::Debug {
    fn get_value(&self, target: &EntityRef) -> Value;

    fn set_value(&self, target: &EntityRef, value: Value);
}

/// Direct access to the entity's property slot.
#[derive(Debug, Clone)]
pub struct FieldAccessStrategy {
    field: String,
}

impl FieldAccessStrategy {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl PropertyAccessStrategy for FieldAccessStrategy {
    fn get_value(&self, target: &EntityRef) -> Value {
        target.get(&self.field).unwrap_or(Value::Null)
    }

    fn set_value(&self, target: &EntityRef, value: Value) {
        target.set(self.field.clone(), value);
    }
}

type Getter = Arc<dyn Fn(&EntityRef) -> Value + Send + Sync>;
type Setter = Arc<dyn Fn(&EntityRef, Value) + Send + Sync>;

/// Access through host-supplied accessor functions.
///
/// Used for computed properties or entities whose state lives outside the
/// property slots. Without a setter the property is read-only and writes are
/// ignored.
#[derive(Clone)]
pub struct AccessorAccessStrategy {
    name: String,
    getter: Getter,
    setter: Option<Setter>,
}

impl AccessorAccessStrategy {
    pub fn new<G>(name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&EntityRef) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            getter: Arc::new(getter),
            setter: None,
        }
    }

    pub fn with_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&EntityRef, Value) + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }
}

impl fmt::Debug for AccessorAccessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorAccessStrategy")
            .field("name", &self.name)
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

impl PropertyAccessStrategy for AccessorAccessStrategy {
    fn get_value(&self, target: &EntityRef) -> Value {
        (self.getter)(target)
    }

    fn set_value(&self, target: &EntityRef, value: Value) {
        match &self.setter {
            Some(setter) => setter(target, value),
            None => tracing::warn!(property = %self.name, "ignoring write to read-only property"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access() {
        let strategy = FieldAccessStrategy::new("name");
        let user = EntityRef::new("User");
        assert_eq!(strategy.get_value(&user), Value::Null);
        strategy.set_value(&user, Value::from("John"));
        assert_eq!(strategy.get_value(&user), Value::from("John"));
    }

    #[test]
    fn test_accessor_access() {
        let strategy = AccessorAccessStrategy::new("displayName", |target: &EntityRef| {
            match target.get("name") {
                Some(Value::String(name)) => Value::String(name.to_uppercase()),
                _ => Value::Null,
            }
        })
        .with_setter(|target: &EntityRef, value| target.set("name", value));

        let user = EntityRef::new("User").with("name", "john");
        assert_eq!(strategy.get_value(&user), Value::from("JOHN"));
        strategy.set_value(&user, Value::from("mary"));
        assert_eq!(strategy.get_value(&user), Value::from("MARY"));
    }
}
