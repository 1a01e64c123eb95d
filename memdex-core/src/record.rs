//! Record and Value types
//!
//! This module provides the data held by a collection:
//! - Value: a JSON-like scalar/array/object plus DateTime
//! - Record: an ordered field map with a change-tracking baseline
//! - RecordRef: the shared handle whose pointer identity is the record's
//!   in-memory identity across every index

use crate::error::ErrorKind;
use crate::events::RecordObserver;
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Value stored in a record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value; indexes treat it like a missing field
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Object with string keys
    Object(BTreeMap<String, Value>),
    /// DateTime with UTC timezone
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is a number (int or float)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 (ints widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Navigate into nested objects/arrays by path segments
    fn get_path(&self, parts: &[&str]) -> Option<&Value> {
        let mut current = self;
        for &part in parts {
            current = match current {
                Value::Object(obj) => obj.get(part)?,
                Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        }
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::DateTime(_) => "datetime",
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Value::Array(arr)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(obj: BTreeMap<String, Value>) -> Self {
        Value::Object(obj)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Fields that differ from a record's committed baseline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordChanges {
    /// Fields absent from the baseline
    pub added: BTreeMap<String, Value>,
    /// Fields whose value differs from the baseline
    pub changed: BTreeMap<String, Value>,
    /// Baseline fields no longer present
    pub removed: Vec<String>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// A structured record with change tracking
pub struct Record {
    fields: BTreeMap<String, Value>,
    /// Committed snapshot that `changes()` diffs against
    baseline: BTreeMap<String, Value>,
    observer: Option<RecordObserver>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::from_fields(BTreeMap::new())
    }

    /// Create a record from fields; the fields become the committed baseline
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self {
            baseline: fields.clone(),
            fields,
            observer: None,
        }
    }

    /// Create a record from a JSON object
    pub fn from_json(json: serde_json::Value) -> Result<Self, RecordError> {
        match Value::from(json) {
            Value::Object(fields) => Ok(Self::from_fields(fields)),
            other => Err(RecordError::NotAnObject(other.type_name().to_string())),
        }
    }

    /// Builder-style field insertion that does not notify
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        self.baseline.insert(key.clone(), value.clone());
        self.fields.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get field by path (e.g., "user.address.city" or "tags.0")
    pub fn get_by_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let head = self.fields.get(parts.next()?)?;
        let rest: Vec<&str> = parts.collect();
        head.get_path(&rest)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a top-level field, notifying the owning collection if the value changed
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let changed = self.fields.get(&key) != Some(&value);
        let previous = self.fields.insert(key.clone(), value);
        if changed {
            self.notify(&key);
        }
        previous
    }

    /// Set field by path, creating intermediate objects
    pub fn set_by_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), RecordError> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(RecordError::InvalidPath(path.to_string()));
        }
        if parts.len() == 1 {
            self.set(parts[0], value);
            return Ok(());
        }

        let (field_name, parents) = match parts.split_last() {
            Some(split) => split,
            None => return Err(RecordError::InvalidPath(path.to_string())),
        };
        let mut current = self
            .fields
            .entry(parents[0].to_string())
            .or_insert_with(|| Value::Object(BTreeMap::new()));

        for &part in &parents[1..] {
            current = match current {
                Value::Object(obj) => obj
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(BTreeMap::new())),
                _ => return Err(RecordError::InvalidPath(path.to_string())),
            };
        }

        match current {
            Value::Object(obj) => {
                obj.insert(field_name.to_string(), value.into());
            }
            _ => return Err(RecordError::InvalidPath(path.to_string())),
        }
        self.notify(parents[0]);
        Ok(())
    }

    /// Remove a top-level field
    pub fn unset(&mut self, key: &str) -> Option<Value> {
        let removed = self.fields.remove(key);
        if removed.is_some() {
            self.notify(key);
        }
        removed
    }

    /// Make the current fields the new baseline
    pub fn commit(&mut self) {
        self.baseline = self.fields.clone();
    }

    /// Baseline value of a field
    pub fn previous(&self, key: &str) -> Option<&Value> {
        self.baseline.get(key)
    }

    /// Diff the current fields against the baseline
    pub fn changes(&self) -> RecordChanges {
        let mut changes = RecordChanges::default();
        for (key, value) in &self.fields {
            match self.baseline.get(key) {
                None => {
                    changes.added.insert(key.clone(), value.clone());
                }
                Some(old) if old != value => {
                    changes.changed.insert(key.clone(), value.clone());
                }
                Some(_) => {}
            }
        }
        changes.removed = self
            .baseline
            .keys()
            .filter(|key| !self.fields.contains_key(*key))
            .cloned()
            .collect();
        changes
    }

    pub fn has_changes(&self) -> bool {
        self.fields != self.baseline
    }

    /// Restore the baseline, notifying for every field that moves
    pub fn revert(&mut self) {
        let changes = self.changes();
        self.fields = self.baseline.clone();
        let touched: Vec<String> = changes
            .added
            .into_keys()
            .chain(changes.changed.into_keys())
            .chain(changes.removed)
            .collect();
        for key in touched {
            self.notify(&key);
        }
    }

    /// Deep mix-in: nested objects merge key by key, everything else overwrites
    pub(crate) fn merge_from(&mut self, incoming: &Record) {
        for (key, value) in &incoming.fields {
            match (self.fields.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(patch)) => deep_mix_in(existing, patch),
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Drop fields the incoming record lacks (except `keep`), then assign its fields
    pub(crate) fn replace_from(&mut self, incoming: &Record, keep: &str) {
        self.fields
            .retain(|key, _| key == keep || incoming.fields.contains_key(key));
        for (key, value) in &incoming.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    pub(crate) fn subscribe(&mut self, observer: RecordObserver) {
        self.observer = Some(observer);
    }

    pub(crate) fn unsubscribe(&mut self) -> Option<RecordObserver> {
        self.observer.take()
    }

    /// Subscription token of the collection currently observing this record
    pub fn observer_token(&self) -> Option<u64> {
        self.observer.as_ref().map(RecordObserver::token)
    }

    /// Convert to a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    fn notify(&self, key: &str) {
        if let Some(observer) = &self.observer {
            observer.notify(key);
        }
    }
}

fn deep_mix_in(dest: &mut BTreeMap<String, Value>, source: &BTreeMap<String, Value>) {
    for (key, value) in source {
        match (dest.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(patch)) => deep_mix_in(existing, patch),
            _ => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

// A copy is a detached record: it keeps fields and baseline but never the observer.
impl Clone for Record {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            baseline: self.baseline.clone(),
            observer: None,
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("fields", &self.fields)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, Value>::deserialize(deserializer).map(Record::from_fields)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record::from_fields(iter.into_iter().collect())
    }
}

/// Shared handle to a stored record
///
/// Clones share the same record; `ptr_eq` is the identity every index uses to
/// find a record again. Writing indexed fields through `write()` leaves the
/// indexes stale until the owning collection flushes or re-indexes the record.
#[derive(Clone)]
pub struct RecordRef(Arc<RwLock<Record>>);

impl RecordRef {
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write()
    }

    /// Whether both handles point at the same record
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity as a hashable address, stable for the life of the record
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Clone of the value at `path`
    pub fn get(&self, path: &str) -> Option<Value> {
        self.read().get_by_path(path).cloned()
    }

    /// Set a top-level field through the handle
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write().set(key, value)
    }

    /// Detached copy of the record
    pub fn snapshot(&self) -> Record {
        self.read().clone()
    }
}

impl From<Record> for RecordRef {
    fn from(record: Record) -> Self {
        RecordRef::new(record)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordRef").field(self.read().fields()).finish()
    }
}

/// Record-related errors
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Expected an object, got {0}")]
    NotAnObject(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl RecordError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}
