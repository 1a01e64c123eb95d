//! Error taxonomy shared by the index, query and collection layers
//!
//! Each layer keeps its own `thiserror` enum; `kind()` on any of them maps the
//! failure onto one of the three categories callers branch on.

use std::fmt;

/// Category of a failure raised by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong shape or type for a record, numeric parameter or policy value
    InvalidArgument,
    /// Unknown named index or other missing reference
    NotFound,
    /// Operation not allowed in the current state
    IllegalState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::IllegalState => "illegal state",
        };
        f.write_str(name)
    }
}
