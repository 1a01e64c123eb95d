//! Query engine
//!
//! This module provides declarative filtering over collections:
//! - [`ast`]: compiled query objects and the where-tree
//! - [`parser`]: JSON query objects to [`QuerySpec`]
//! - [`eval`]: operator semantics, LIKE patterns and result collation
//! - [`cursor`]: the single-use, chainable [`Query`] over one collection

pub mod ast;
pub mod cursor;
pub mod eval;
pub mod parser;

pub use ast::{Clause, Combinator, Direction, Group, Operator, OrderBy, QuerySpec, Where};
pub use cursor::{Query, QueryState};
pub use eval::{Collator, DEFAULT_LOCALE};
pub use parser::QueryParser;

use crate::error::ErrorKind;

/// Query errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid like pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{name} must be a finite non-negative number, got {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Index inaccessible after first operation")]
    IndexInaccessible,

    #[error("Index '{0}' not found")]
    UnknownIndex(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::IndexInaccessible => ErrorKind::IllegalState,
            QueryError::UnknownIndex(_) => ErrorKind::NotFound,
            _ => ErrorKind::InvalidArgument,
        }
    }
}
