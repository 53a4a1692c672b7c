//! # rowgate-core
//!
//! Shared building blocks for rowgate:
//! - The mapping model describing entity types, their properties,
//!   relationships and inheritance ([`MappingInformation`])
//! - The runtime object model the evaluators walk ([`Value`], [`EntityRef`])
//! - Access types and the security context supplying the current principal
//! - YAML configuration ([`SecurityConfig`])
//!
//! The mapping model is built once and is read-only afterwards, so a single
//! `Arc<MappingInformation>` can be shared by every compiler and filter.

pub mod access;
pub mod config;
pub mod context;
pub mod error;
pub mod mapping;
pub mod value;

pub use access::AccessType;
pub use config::{
    ConfigError, EntityConfig, EvaluationConfig, PermitConfig, PrincipalConfig, PropertyConfig,
    PropertyKindConfig, RolesAllowedConfig, SecurityConfig,
};
pub use context::{CURRENT_PRINCIPAL, CURRENT_ROLES, SecurityContext, StaticSecurityContext};
pub use error::MappingError;
pub use mapping::{
    AccessMode, AccessorAccessStrategy, CascadeType, ClassDeclaration, ClassMappingInformation,
    FetchType, FieldAccessStrategy, MappingInformation, MappingInformationBuilder,
    PropertyAccessStrategy, PropertyKind, PropertyMappingInformation,
};
pub use value::{EntityRef, Value};
