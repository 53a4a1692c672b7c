//! Error types for filtering and evaluation.

use rowgate_core::AccessType;
use rowgate_query::ParseError;
use rowgate_rules::ResolveError;
use thiserror::Error;

/// Errors raised by the in-memory evaluators.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The expression cannot be decided in memory. Subselect evaluators
    /// return this to pass on to the next evaluator of the chain.
    #[error("expression cannot be evaluated in memory")]
    NotEvaluatable,

    /// A single-valued request reached more than one distinct value.
    #[error("path {path} is not single-valued")]
    NotSingleValued { path: String },

    /// The query executor failed while running a delegated subselect.
    #[error("query executor error: {0}")]
    Executor(#[from] anyhow::Error),
}

/// Errors raised by the entity filter.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to parse query: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to resolve query: {0}")]
    Resolve(#[from] ResolveError),

    #[error("path {path} is not single-valued")]
    NotSingleValued { path: String },

    #[error("query executor error: {0}")]
    Executor(anyhow::Error),

    /// The entity does not satisfy any rule granting the access.
    #[error("{access_type} access to {entity} denied")]
    AccessDenied {
        entity: String,
        access_type: AccessType,
    },
}

impl From<EvaluationError> for FilterError {
    fn from(error: EvaluationError) -> Self {
        match error {
            EvaluationError::NotSingleValued { path } => FilterError::NotSingleValued { path },
            EvaluationError::Executor(error) => FilterError::Executor(error),
            // The filter turns undecidable results into denials before they
            // reach this conversion.
            EvaluationError::NotEvaluatable => FilterError::Executor(anyhow::anyhow!(
                "expression cannot be evaluated in memory"
            )),
        }
    }
}
