//! Error types for building the mapping model.

use thiserror::Error;

/// Errors raised while building [`crate::MappingInformation`].
#[derive(Debug, Error)]
pub enum MappingError {
    /// Two classes declare the same entity name.
    #[error("entity {entity} is declared more than once")]
    DuplicateEntity { entity: String },

    /// A class names a superclass that is not mapped.
    #[error("superclass {superclass} of entity {entity} is not mapped")]
    UnknownSuperclass { entity: String, superclass: String },

    /// The superclass chain loops back on itself.
    #[error("inheritance cycle detected at entity {entity}")]
    CyclicInheritance { entity: String },

    /// A relationship property targets an entity that is not mapped.
    #[error("property {entity}.{property} targets unmapped entity {target}")]
    UnknownTargetEntity {
        entity: String,
        property: String,
        target: String,
    },

    /// An identifier names a property the class does not have.
    #[error("id property {entity}.{property} is not mapped")]
    UnknownIdProperty { entity: String, property: String },
}
