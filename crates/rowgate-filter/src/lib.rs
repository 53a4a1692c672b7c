//! # rowgate-filter
//!
//! Enforcement of compiled access rules.
//!
//! This crate provides functionality to:
//! - Rewrite queries so they only return accessible instances
//!   ([`EntityFilter::filter_query`])
//! - Decide whether a loaded entity is accessible
//!   ([`EntityFilter::is_accessible`])
//! - Evaluate query expressions and subselects in memory
//!   ([`QueryEvaluator`], [`PathEvaluator`])
//! - Delegate subselects that cannot be decided in memory to the persistence
//!   provider ([`DelegatingSubselectEvaluator`])
//! - Check reads and writes of loaded entities within a unit of work
//!   ([`AccessManager`], [`SecureEntity`])
//!
//! ## Example
//!
//! ```text
//! rule:      GRANT READ ACCESS TO Contact c WHERE c.owner = CURRENT_PRINCIPAL
//! query:     SELECT contact FROM Contact contact
//! rewritten: SELECT contact FROM Contact contact WHERE contact.owner = :param0
//! ```

pub mod entity_filter;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod optimizer;
pub mod params;
pub mod path_eval;
mod rewrite;
pub mod secure;
pub mod subselect;

pub use entity_filter::{EntityFilter, FilterOutcome, FilterResult};
pub use error::{EvaluationError, FilterError};
pub use evaluator::{Outcome, QueryEvaluator};
pub use executor::{EntitySource, ExecutorSession, QueryExecutor, QueryHandle};
pub use params::QueryEvaluationParameters;
pub use path_eval::PathEvaluator;
pub use secure::{AccessManager, ChecksDisabled, DelayedChecks, ProxyStrategy, SecureEntity};
pub use subselect::{DelegatingSubselectEvaluator, SimpleSubselectEvaluator, SubselectEvaluator};
