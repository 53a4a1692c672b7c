//! # rowgate-query
//!
//! The object query language used by queries and access rules.
//!
//! ```text
//! SELECT c FROM Contact c JOIN c.owner o WHERE o.name LIKE 'J%'
//! GRANT READ ACCESS TO Contact c WHERE c.owner = CURRENT_PRINCIPAL
//! ```
//!
//! - [`parse_query`], [`parse_rule`] and [`parse_expression`] build the
//!   syntax tree in [`ast`]
//! - every node prints back to source through `Display`
//! - [`visit`] provides read-only and mutating traversals

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod path;
mod stream;
pub mod visit;

pub use ast::{
    AccessRuleStatement, AggregateFunction, BinaryOp, CaseExpr, ComparisonOp, ConditionKeyword,
    DeleteStatement, Expr, FromItem, Function, InList, Join, JoinCondition, JoinKind, Literal,
    OrderItem, Quantifier, RangeDeclaration, RangeSource, SelectItem, SelectStatement, SetItem,
    SortDirection, Statement, TrimSpec, UnaryOp, UpdateStatement,
};
pub use error::ParseError;
pub use parser::{is_reserved, parse_expression, parse_query, parse_rule, parse_select};
pub use path::{Alias, Path};
