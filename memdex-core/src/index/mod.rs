//! Ordered indexing for collections
//!
//! This module provides the recursive sorted index with support for:
//! - Single field and compound keys (one level per field)
//! - Computed key components
//! - Prefix lookups and inclusive/exclusive range scans
//! - Identity-ordered leaf buckets for logarithmic removal

pub mod key;
pub mod ordered;

pub use key::{compare_keys, IndexOptions, KeyComparator, KeyField, KeyFn};
pub use ordered::{IndexError, Order, OrderedIndex, RangeOptions};
