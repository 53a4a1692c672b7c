//! Runtime object model.
//!
//! Entities are dynamically typed: an [`EntityRef`] carries its entity name and
//! an ordered set of property slots. The mapping model decides how a property
//! is read or written (see [`crate::mapping::PropertyAccessStrategy`]), so no
//! reflection is involved anywhere.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A value reachable from an entity graph or produced by an expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// A reference to a (managed or detached) entity. Compared by identity.
    Entity(EntityRef),
    /// A collection-valued property or a multi-row result.
    Collection(Vec<Value>),
    /// A map-valued property, in insertion order.
    Map(Vec<(Value, Value)>),
    /// One entry of a map, produced by joins over map-valued properties.
    Entry(Box<Value>, Box<Value>),
    /// An entity type literal, the result of `TYPE(x)`.
    EntityType(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(entity) => Some(entity),
            Value::Entry(_, value) => value.as_entity(),
            _ => None,
        }
    }

    /// Whether this value holds more than one element (collection or map).
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Value::Collection(_) | Value::Map(_))
    }

    /// Flatten one level: collections yield their items, maps their values,
    /// `NULL` nothing, anything else itself.
    pub fn into_elements(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::Collection(items) => items,
            Value::Map(entries) => entries.into_iter().map(|(_, value)| value).collect(),
            other => vec![other],
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Entity(_) => "entity",
            Value::Collection(_) => "collection",
            Value::Map(_) => "map",
            Value::Entry(_, _) => "entry",
            Value::EntityType(_) => "entity type",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Entity(entity) => write!(f, "{:?}", entity),
            Value::Collection(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Entry(key, value) => write!(f, "{}={}", key, value),
            Value::EntityType(name) => write!(f, "{}", name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<EntityRef> for Value {
    fn from(entity: EntityRef) -> Self {
        Value::Entity(entity)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Collection(items)
    }
}

#[derive(Debug)]
struct Entity {
    entity_name: String,
    properties: RwLock<IndexMap<String, Value>>,
}

/// Shared handle to a dynamically typed entity instance.
///
/// Cloning the handle does not clone the entity; equality is instance
/// identity. Entity graphs with back references form reference cycles.
#[derive(Clone)]
pub struct EntityRef(Arc<Entity>);

impl EntityRef {
    /// Create an empty instance of the given entity.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self(Arc::new(Entity {
            entity_name: entity_name.into(),
            properties: RwLock::new(IndexMap::new()),
        }))
    }

    /// Set a property slot and return the handle, for fixture construction.
    pub fn with(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    /// Name of the entity this instance belongs to.
    pub fn entity_name(&self) -> &str {
        &self.0.entity_name
    }

    /// Read a property slot. Unset slots read as `None`.
    pub fn get(&self, property: &str) -> Option<Value> {
        let properties = self.0.properties.read().unwrap_or_else(|e| e.into_inner());
        properties.get(property).cloned()
    }

    /// Write a property slot.
    pub fn set(&self, property: impl Into<String>, value: impl Into<Value>) {
        let mut properties = self.0.properties.write().unwrap_or_else(|e| e.into_inner());
        properties.insert(property.into(), value.into());
    }

    /// Copy of all property slots.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.0
            .properties
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace all property slots with a previous snapshot.
    pub fn restore(&self, snapshot: IndexMap<String, Value>) {
        let mut properties = self.0.properties.write().unwrap_or_else(|e| e.into_inner());
        *properties = snapshot;
    }

    /// Whether both handles point at the same instance.
    pub fn same_instance(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the instance, stable for its lifetime.
    pub fn instance_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other)
    }
}

// Properties are not printed: entity graphs are usually cyclic.
impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.entity_name(), self.instance_id())
    }
}
