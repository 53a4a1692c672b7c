//! Path navigation over object graphs.

use rowgate_core::{MappingInformation, Value};
use std::sync::Arc;

use crate::error::EvaluationError;

/// Reads dot-separated paths through the mapping's access strategies.
///
/// Navigation is multi-valued: collections and maps met on the way are
/// flattened one level (map elements become entries), and roots whose
/// runtime type lacks a property are dropped rather than reported.
#[derive(Debug, Clone)]
pub struct PathEvaluator {
    mapping: Arc<MappingInformation>,
}

impl PathEvaluator {
    pub fn new(mapping: Arc<MappingInformation>) -> Self {
        Self { mapping }
    }

    /// The single value of `path` (e.g. `owner.name`) below `root`.
    ///
    /// No value gives `NULL`; a collection-valued last segment gives the
    /// collection itself.
    pub fn evaluate(&self, root: &Value, path: &str) -> Result<Value, EvaluationError> {
        let segments: Vec<String> = split(path);
        self.evaluate_segments(root, &segments)
    }

    /// All values of `path` below any of `roots`, flattened.
    pub fn evaluate_all(&self, roots: &[Value], path: &str) -> Vec<Value> {
        let segments: Vec<String> = split(path);
        self.evaluate_all_segments(roots, &segments)
    }

    pub fn evaluate_segments(
        &self,
        root: &Value,
        segments: &[String],
    ) -> Result<Value, EvaluationError> {
        if segments.is_empty() {
            return Ok(root.clone());
        }
        let (intermediate, last) = segments.split_at(segments.len() - 1);
        let parents = self.evaluate_all_segments(std::slice::from_ref(root), intermediate);

        let mut distinct: Vec<Value> = Vec::new();
        for parent in &parents {
            let Some(value) = self.property_value(parent, &last[0]) else {
                continue;
            };
            if !value.is_null() && !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        match distinct.len() {
            0 => Ok(Value::Null),
            1 => Ok(distinct.remove(0)),
            _ => Err(EvaluationError::NotSingleValued {
                path: segments.join("."),
            }),
        }
    }

    pub fn evaluate_all_segments(&self, roots: &[Value], segments: &[String]) -> Vec<Value> {
        let mut current: Vec<Value> = roots.iter().cloned().flat_map(flatten).collect();
        for segment in segments {
            current = current
                .iter()
                .filter_map(|value| self.property_value(value, segment))
                .flat_map(flatten)
                .collect();
        }
        current
    }

    /// The value of one property, or `None` when `value` is not an entity
    /// whose class has that property.
    pub fn property_value(&self, value: &Value, property: &str) -> Option<Value> {
        let entity = value.as_entity()?;
        let class = self.mapping.class_mapping_for_entity(entity)?;
        let property = class.property(property)?;
        Some(property.get_value(entity))
    }
}

fn split(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// One level of flattening; map elements become entries.
pub(crate) fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Collection(items) => items,
        Value::Map(entries) => entries
            .into_iter()
            .map(|(key, value)| Value::Entry(Box::new(key), Box::new(value)))
            .collect(),
        other => vec![other],
    }
}
