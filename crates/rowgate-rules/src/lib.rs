//! # rowgate-rules
//!
//! Alias/type resolution and access rule compilation for rowgate.
//!
//! This crate provides functionality to:
//! - Bind every alias of a statement to a mapped type and check every path
//!   ([`AliasResolver`])
//! - Compile GRANT statements into reusable predicates ([`AccessRulesCompiler`])
//! - Derive GRANT statements from role and permit declarations ([`source`])
//! - Look up the rules applying to a class ([`CompiledRules`])
//!
//! ## Rule Forms
//!
//! | Declaration | Compiled rule |
//! |-------------|---------------|
//! | `GRANT READ ACCESS TO Contact c WHERE c.owner = CURRENT_PRINCIPAL` | as written |
//! | `roles_allowed: [{ roles: [admin], access: [READ] }]` | `GRANT READ ACCESS TO Contact contact WHERE 'admin' IN (CURRENT_ROLES)` |
//! | `permit: [{ where: owner = CURRENT_PRINCIPAL }]` | `GRANT CREATE READ UPDATE DELETE ACCESS TO Contact contact WHERE contact.owner = CURRENT_PRINCIPAL` |

pub mod compiler;
pub mod error;
pub mod resolver;
pub mod rule;
pub mod rules;
pub mod source;
pub mod types;

pub use compiler::AccessRulesCompiler;
pub use error::{CompileError, ResolveError};
pub use resolver::{AliasResolver, ExternalAliasTypes, SecurityContextAliasTypes};
pub use rule::CompiledAccessRule;
pub use rules::CompiledRules;
pub use types::{ResolvedType, TypeDefinition, TypeDefinitions};
