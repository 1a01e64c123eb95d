//! Key extraction and key ordering for ordered indexes

use crate::record::{Record, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Computes a key component (or a bucket hash) from a record
pub type KeyFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Total order over key components
pub type KeyComparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// One level of a compound key
#[derive(Clone)]
pub enum KeyField {
    /// Dotted field path; a missing field yields `Value::Null`
    Path(String),
    /// Computed from the whole record
    Computed(KeyFn),
}

impl KeyField {
    pub fn path(path: impl Into<String>) -> Self {
        KeyField::Path(path.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        KeyField::Computed(Arc::new(f))
    }

    /// Extract this key component from a record
    pub fn extract(&self, record: &Record) -> Value {
        match self {
            KeyField::Path(path) => record.get_by_path(path).cloned().unwrap_or(Value::Null),
            KeyField::Computed(f) => f(record),
        }
    }

    /// Field path, if this is a path accessor
    pub fn as_path(&self) -> Option<&str> {
        match self {
            KeyField::Path(path) => Some(path),
            KeyField::Computed(_) => None,
        }
    }
}

impl fmt::Debug for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyField::Path(path) => write!(f, "Path({path})"),
            KeyField::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for KeyField {
    fn from(path: &str) -> Self {
        KeyField::Path(path.to_string())
    }
}

impl From<String> for KeyField {
    fn from(path: String) -> Self {
        KeyField::Path(path)
    }
}

/// Options accepted when building an index
#[derive(Clone, Default)]
pub struct IndexOptions {
    /// Orders and de-duplicates records inside a leaf bucket
    pub hash_code: Option<KeyFn>,
    /// Replaces [`compare_keys`] for key components
    pub comparator: Option<KeyComparator>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_code(mut self, field: KeyField) -> Self {
        self.hash_code = Some(Arc::new(move |record: &Record| field.extract(record)));
        self
    }

    pub fn comparator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for IndexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexOptions")
            .field("hash_code", &self.hash_code.is_some())
            .field("comparator", &self.comparator.is_some())
            .finish()
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::DateTime(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Default key order
///
/// Null (absent) first, then booleans, numbers (numerically, across int and
/// float), strings (case-folded, raw bytes break ties), datetimes, arrays and
/// objects.
pub fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
        }
        (Value::String(a), Value::String(b)) => compare_case_folded(a, b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare_keys(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ord = ka.cmp(kb).then_with(|| compare_keys(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_case_folded(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}
