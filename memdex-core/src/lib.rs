//! Memdex Core - In-memory records, ordered indexes and declarative queries
//!
//! This crate provides the data layer of an object-document mapper:
//! - Records with change tracking and shared identity
//! - Recursive sorted indexes over single and compound keys
//! - Collections with a primary index, named secondary indexes and events
//! - Chainable queries with a JSON query language

pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod logging;
pub mod query;
pub mod record;

pub use collection::{
    AddOptions, Collection, CollectionError, Incoming, RecordFactory, RemoveOptions, RemoveTarget, Selection,
};
pub use config::{CollectionConfig, ConfigError, OnConflict};
pub use error::ErrorKind;
pub use events::{Batch, CollectionEvent, RecordObserver, RecordSignal};
pub use index::*;
pub use logging::{init_logging, LoggingConfig, QueryTimer};
pub use query::*;
pub use record::{Record, RecordChanges, RecordError, RecordRef, Value};
