//! Error types for resolution and rule compilation.

use rowgate_query::ParseError;
use thiserror::Error;

/// Errors raised while resolving aliases and paths to mapped types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A range declaration names an unmapped entity.
    #[error("unknown entity {entity}")]
    UnknownEntity { entity: String },

    /// A path names a property no class in the hierarchy declares.
    #[error("entity {entity} has no property {property}")]
    UnknownProperty { entity: String, property: String },

    /// A path starts with an undeclared identification variable.
    #[error("unknown alias {alias}")]
    UnknownAlias { alias: String },

    /// A path navigates through a collection or basic value.
    #[error("cannot navigate through {segment} in {path}")]
    NotNavigable { path: String, segment: String },

    /// An alias is declared twice in the same scope.
    #[error("alias {alias} is declared more than once")]
    DuplicateAlias { alias: String },

    /// A type definition was finalized twice.
    #[error("type of alias {alias} is already final")]
    TypeAlreadyFinal { alias: String },
}

/// Errors raised while compiling access rules.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The rule text is not a valid rule.
    #[error("failed to parse access rule '{rule}': {source}")]
    Parse {
        rule: String,
        #[source]
        source: ParseError,
    },

    /// The rule does not resolve against the mapping.
    #[error("invalid access rule '{rule}': {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: ResolveError,
    },
}
