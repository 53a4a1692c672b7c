//! Query executor interface.
//!
//! The persistence provider runs rewritten queries and, for subselects the
//! in-memory evaluator cannot decide, derived standalone queries. Sessions
//! opened by rowgate are always rolled back and closed, never committed.

use anyhow::Result;
use rowgate_core::Value;

/// Entry point to the persistence provider.
pub trait QueryExecutor: Send + Sync {
    /// Open a secondary session that is not subject to access filtering.
    fn open_session(&self) -> Result<Box<dyn ExecutorSession>>;

    /// The managed reference for a principal or role value that is a mapped
    /// entity, so the provider compares it by identity.
    fn entity_reference(&self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }
}

/// One session of the persistence provider.
pub trait ExecutorSession {
    fn begin(&mut self) -> Result<()>;

    fn create_query(&mut self, query: &str) -> Result<Box<dyn QueryHandle + '_>>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// A prepared query.
pub trait QueryHandle {
    fn set_parameter(&mut self, name: &str, value: Value) -> Result<()>;

    fn get_result_list(&mut self) -> Result<Vec<Value>>;
}

/// Source of all instances of an entity, for in-memory evaluation of
/// subselects ranging over entity names.
pub trait EntitySource: Send + Sync {
    /// Instances whose entity is `entity_name` or one of its subclasses.
    fn entities(&self, entity_name: &str) -> Vec<Value>;
}
