//! Recursive ordered index
//!
//! One level per key field. Every level keeps its keys sorted next to a
//! parallel vector of entries: leaf buckets of records at the last level,
//! nested levels everywhere else. Levels are created on first insert and
//! pruned as soon as they empty, so traversal only touches populated keys.

use super::key::{compare_keys, IndexOptions, KeyComparator, KeyField, KeyFn};
use crate::error::ErrorKind;
use crate::record::{Record, RecordRef, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Cmp<'a> = &'a (dyn Fn(&Value, &Value) -> Ordering + Send + Sync);

/// Traversal direction for [`OrderedIndex::get_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    /// Keys descending; records inside one bucket keep their bucket order
    Desc,
}

/// Bounds handling and pagination for range scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeOptions {
    pub left_inclusive: bool,
    pub right_inclusive: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            left_inclusive: true,
            right_inclusive: false,
            limit: None,
            offset: 0,
        }
    }
}

impl RangeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn left_inclusive(mut self, inclusive: bool) -> Self {
        self.left_inclusive = inclusive;
        self
    }

    pub fn right_inclusive(mut self, inclusive: bool) -> Self {
        self.right_inclusive = inclusive;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

struct Node {
    keys: Vec<Value>,
    entries: Entries,
}

enum Entries {
    Buckets(Vec<Vec<RecordRef>>),
    Children(Vec<Node>),
}

/// Comparator and bucket hash shared by every level of one index
struct Ctx<'a> {
    cmp: Cmp<'a>,
    hash_code: Option<&'a KeyFn>,
}

impl Ctx<'_> {
    fn hash_of(&self, record: &RecordRef) -> Value {
        match self.hash_code {
            Some(f) => f(&record.read()),
            None => Value::Null,
        }
    }

    /// Half-open range of bucket slots whose hash equals `hash`
    fn equal_range(&self, bucket: &[RecordRef], hash: &Value) -> (usize, usize) {
        let lo = bucket.partition_point(|r| (self.cmp)(&self.hash_of(r), hash) == Ordering::Less);
        let hi = lo + bucket[lo..].partition_point(|r| (self.cmp)(&self.hash_of(r), hash) != Ordering::Greater);
        (lo, hi)
    }
}

impl Node {
    fn new(leaf: bool) -> Self {
        let entries = if leaf {
            Entries::Buckets(Vec::new())
        } else {
            Entries::Children(Vec::new())
        };
        Self {
            keys: Vec::new(),
            entries,
        }
    }

    fn search(&self, key: &Value, cmp: Cmp<'_>) -> Result<usize, usize> {
        self.keys.binary_search_by(|probe| cmp(probe, key))
    }

    fn insert(&mut self, keys: &[Value], record: RecordRef, hash: Option<&Value>, ctx: &Ctx<'_>) -> bool {
        let Some((key, rest)) = keys.split_first() else {
            return false;
        };
        let pos = match self.search(key, ctx.cmp) {
            Ok(pos) => pos,
            Err(pos) => {
                self.keys.insert(pos, key.clone());
                match &mut self.entries {
                    Entries::Buckets(buckets) => buckets.insert(pos, Vec::new()),
                    Entries::Children(children) => children.insert(pos, Node::new(rest.len() <= 1)),
                }
                pos
            }
        };
        match &mut self.entries {
            Entries::Buckets(buckets) => bucket_insert(&mut buckets[pos], record, hash, ctx),
            Entries::Children(children) => children[pos].insert(rest, record, hash, ctx),
        }
    }

    /// Remove along a known key path
    fn remove_at(&mut self, keys: &[Value], record: &RecordRef, hash: Option<&Value>, ctx: &Ctx<'_>) -> Option<RecordRef> {
        let (key, rest) = keys.split_first()?;
        let pos = self.search(key, ctx.cmp).ok()?;
        let removed = match &mut self.entries {
            Entries::Buckets(buckets) => bucket_remove(&mut buckets[pos], record, hash, ctx)?,
            Entries::Children(children) => children[pos].remove_at(rest, record, hash, ctx)?,
        };
        self.prune(pos);
        Some(removed)
    }

    /// Remove wherever the record sits, regardless of its current keys
    fn remove_anywhere(&mut self, record: &RecordRef, hash: Option<&Value>, ctx: &Ctx<'_>) -> Option<RecordRef> {
        for pos in 0..self.keys.len() {
            let found = match &mut self.entries {
                Entries::Buckets(buckets) => bucket_remove(&mut buckets[pos], record, hash, ctx),
                Entries::Children(children) => children[pos].remove_anywhere(record, hash, ctx),
            };
            if found.is_some() {
                self.prune(pos);
                return found;
            }
        }
        None
    }

    /// True when the bucket at `keys` already holds a different record with `hash`
    fn conflicts(&self, keys: &[Value], record: &RecordRef, hash: &Value, ctx: &Ctx<'_>) -> bool {
        let Some((key, rest)) = keys.split_first() else {
            return false;
        };
        let Ok(pos) = self.search(key, ctx.cmp) else {
            return false;
        };
        match &self.entries {
            Entries::Buckets(buckets) => {
                let bucket = &buckets[pos];
                let (lo, hi) = ctx.equal_range(bucket, hash);
                bucket[lo..hi].iter().any(|r| !r.ptr_eq(record))
            }
            Entries::Children(children) => children[pos].conflicts(rest, record, hash, ctx),
        }
    }

    /// Push the key path leading to `record` onto `path`
    fn locate(&self, record: &RecordRef, path: &mut Vec<Value>) -> bool {
        for (pos, key) in self.keys.iter().enumerate() {
            path.push(key.clone());
            let found = match &self.entries {
                Entries::Buckets(buckets) => buckets[pos].iter().any(|r| r.ptr_eq(record)),
                Entries::Children(children) => children[pos].locate(record, path),
            };
            if found {
                return true;
            }
            path.pop();
        }
        false
    }

    fn prune(&mut self, pos: usize) {
        let empty = match &self.entries {
            Entries::Buckets(buckets) => buckets[pos].is_empty(),
            Entries::Children(children) => children[pos].keys.is_empty(),
        };
        if empty {
            self.keys.remove(pos);
            match &mut self.entries {
                Entries::Buckets(buckets) => {
                    buckets.remove(pos);
                }
                Entries::Children(children) => {
                    children.remove(pos);
                }
            }
        }
    }

    fn collect_slot(&self, pos: usize, order: Order, out: &mut Vec<RecordRef>) {
        match &self.entries {
            Entries::Buckets(buckets) => out.extend(buckets[pos].iter().cloned()),
            Entries::Children(children) => children[pos].collect(order, out),
        }
    }

    fn collect(&self, order: Order, out: &mut Vec<RecordRef>) {
        let n = self.keys.len();
        for step in 0..n {
            let pos = match order {
                Order::Asc => step,
                Order::Desc => n - 1 - step,
            };
            self.collect_slot(pos, order, out);
        }
    }

    fn visit(&self, f: &mut dyn FnMut(&RecordRef)) {
        match &self.entries {
            Entries::Buckets(buckets) => {
                for record in buckets.iter().flatten() {
                    f(record);
                }
            }
            Entries::Children(children) => {
                for child in children {
                    child.visit(&mut *f);
                }
            }
        }
    }

    fn get(&self, keys: &[Value], cmp: Cmp<'_>, out: &mut Vec<RecordRef>) {
        let Some((key, rest)) = keys.split_first() else {
            self.collect(Order::Asc, out);
            return;
        };
        let Ok(pos) = self.search(key, cmp) else {
            return;
        };
        match &self.entries {
            Entries::Buckets(buckets) => out.extend(buckets[pos].iter().cloned()),
            Entries::Children(children) => children[pos].get(rest, cmp, out),
        }
    }

    /// Returns true once `cap` records have been collected
    fn between(
        &self,
        left: &[Value],
        right: &[Value],
        opts: &RangeOptions,
        cap: Option<usize>,
        cmp: Cmp<'_>,
        out: &mut Vec<RecordRef>,
    ) -> bool {
        let has_children = matches!(self.entries, Entries::Children(_));
        let start = match left.first() {
            Some(l) => self.keys.partition_point(|k| cmp(k, l) == Ordering::Less),
            None => 0,
        };

        for pos in start..self.keys.len() {
            let key = &self.keys[pos];

            let mut lower: &[Value] = &[];
            if let Some(l) = left.first() {
                if cmp(key, l) == Ordering::Equal {
                    if left.len() > 1 && has_children {
                        lower = &left[1..];
                    } else if !opts.left_inclusive {
                        continue;
                    }
                }
            }

            let mut upper: &[Value] = &[];
            if let Some(r) = right.first() {
                match cmp(key, r) {
                    Ordering::Greater => break,
                    Ordering::Equal => {
                        if right.len() > 1 && has_children {
                            upper = &right[1..];
                        } else if !opts.right_inclusive {
                            break;
                        }
                    }
                    Ordering::Less => {}
                }
            }

            match &self.entries {
                Entries::Buckets(buckets) => out.extend(buckets[pos].iter().cloned()),
                Entries::Children(children) => {
                    if lower.is_empty() && upper.is_empty() {
                        children[pos].collect(Order::Asc, out);
                    } else if children[pos].between(lower, upper, opts, cap, cmp, out) {
                        return true;
                    }
                }
            }

            if cap.is_some_and(|cap| out.len() >= cap) {
                return true;
            }
        }
        false
    }
}

fn bucket_insert(bucket: &mut Vec<RecordRef>, record: RecordRef, hash: Option<&Value>, ctx: &Ctx<'_>) -> bool {
    match hash {
        Some(hash) => {
            let (lo, hi) = ctx.equal_range(bucket, hash);
            if lo < hi {
                return false;
            }
            bucket.insert(lo, record);
        }
        None => {
            // Unhashed records sit at the front, after each other
            let end = bucket.partition_point(|r| ctx.hash_of(r).is_null());
            if bucket[..end].iter().any(|r| r.ptr_eq(&record)) {
                return false;
            }
            bucket.insert(end, record);
        }
    }
    true
}

fn bucket_remove(bucket: &mut Vec<RecordRef>, record: &RecordRef, hash: Option<&Value>, ctx: &Ctx<'_>) -> Option<RecordRef> {
    if let Some(hash) = hash {
        let (lo, hi) = ctx.equal_range(bucket, hash);
        if let Some(offset) = bucket[lo..hi].iter().position(|r| r.ptr_eq(record)) {
            return Some(bucket.remove(lo + offset));
        }
    }
    let pos = bucket.iter().rposition(|r| r.ptr_eq(record))?;
    Some(bucket.remove(pos))
}

/// Sorted multi-level index from compound keys to buckets of records
pub struct OrderedIndex {
    fields: Vec<KeyField>,
    hash_code: Option<KeyFn>,
    compare: KeyComparator,
    root: Node,
    len: usize,
}

impl OrderedIndex {
    /// Create an index over `fields`, one level per field
    pub fn new(fields: Vec<KeyField>, options: IndexOptions) -> Result<Self, IndexError> {
        if fields.is_empty() {
            return Err(IndexError::NoFields);
        }
        let leaf = fields.len() == 1;
        let compare: KeyComparator = match options.comparator {
            Some(compare) => compare,
            None => Arc::new(compare_keys),
        };
        Ok(Self {
            fields,
            hash_code: options.hash_code,
            compare,
            root: Node::new(leaf),
            len: 0,
        })
    }

    /// Indexed fields
    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    /// Number of records in the index
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys at the first level
    pub fn key_count(&self) -> usize {
        self.root.keys.len()
    }

    /// Key sequence the index would file `record` under
    pub fn keys_for(&self, record: &Record) -> Vec<Value> {
        self.fields.iter().map(|field| field.extract(record)).collect()
    }

    fn ctx(&self) -> Ctx<'_> {
        Ctx {
            cmp: &*self.compare,
            hash_code: self.hash_code.as_ref(),
        }
    }

    fn hash_for(&self, record: &RecordRef) -> Option<Value> {
        let f = self.hash_code.as_ref()?;
        let hash = f(&record.read());
        (!hash.is_null()).then_some(hash)
    }

    /// Insert `record` under an explicit key sequence
    ///
    /// Returns `Ok(false)` when the target bucket already holds a record with
    /// the same hash (or, without a hash, the same record).
    pub fn insert(&mut self, keys: &[Value], record: RecordRef) -> Result<bool, IndexError> {
        if keys.len() != self.fields.len() {
            return Err(IndexError::KeyArity {
                expected: self.fields.len(),
                actual: keys.len(),
            });
        }
        let hash = self.hash_for(&record);
        let ctx = Ctx {
            cmp: &*self.compare,
            hash_code: self.hash_code.as_ref(),
        };
        let inserted = self.root.insert(keys, record, hash.as_ref(), &ctx);
        if inserted {
            self.len += 1;
        }
        Ok(inserted)
    }

    /// Insert `record` under the keys derived from its fields
    pub fn insert_record(&mut self, record: &RecordRef) -> bool {
        let keys = self.keys_for(&record.read());
        // Arity always matches keys derived from our own fields
        self.insert(&keys, record.clone()).unwrap_or(false)
    }

    /// Remove `record` by identity
    ///
    /// Looks along the record's current key path first and falls back to a
    /// full traversal, so a record whose indexed fields changed after insertion
    /// is still found. Empty levels are pruned on the way back up.
    pub fn remove(&mut self, record: &RecordRef) -> Option<RecordRef> {
        let keys = self.keys_for(&record.read());
        let hash = self.hash_for(record);
        let ctx = Ctx {
            cmp: &*self.compare,
            hash_code: self.hash_code.as_ref(),
        };
        let removed = self
            .root
            .remove_at(&keys, record, hash.as_ref(), &ctx)
            .or_else(|| self.root.remove_anywhere(record, hash.as_ref(), &ctx));
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Re-file a record after its indexed fields changed
    ///
    /// Returns `Ok(false)` (and inserts nothing) when the record was not
    /// indexed. When its new position already holds another record with the
    /// same hash, the record stays where it was and `HashConflict` is returned.
    pub fn update(&mut self, record: &RecordRef) -> Result<bool, IndexError> {
        let keys = self.keys_for(&record.read());
        if let Some(hash) = self.hash_for(record) {
            if self.root.conflicts(&keys, record, &hash, &self.ctx()) {
                return Err(IndexError::HashConflict(hash));
            }
        }
        if self.remove(record).is_none() {
            return Ok(false);
        }
        self.insert_record(record);
        Ok(true)
    }

    /// Key sequence `record` is currently filed under, found by identity
    pub fn key_of(&self, record: &RecordRef) -> Option<Vec<Value>> {
        let mut path = Vec::with_capacity(self.fields.len());
        self.root.locate(record, &mut path).then_some(path)
    }

    /// Exact lookup; a shorter key sequence flattens everything under that prefix
    pub fn get(&self, keys: &[Value]) -> Vec<RecordRef> {
        let mut out = Vec::new();
        self.root.get(keys, self.ctx().cmp, &mut out);
        out
    }

    /// Range scan between two compound keys
    ///
    /// Missing trailing components leave that side open below the given prefix.
    pub fn between(&self, left: &[Value], right: &[Value], opts: &RangeOptions) -> Vec<RecordRef> {
        let cap = opts.limit.map(|limit| limit.saturating_add(opts.offset));
        let mut out = Vec::new();
        self.root.between(left, right, opts, cap, self.ctx().cmp, &mut out);
        out.into_iter()
            .skip(opts.offset)
            .take(opts.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Every record in key order
    pub fn get_all(&self, order: Order) -> Vec<RecordRef> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect(order, &mut out);
        out
    }

    /// Visit every record in ascending key order
    pub fn visit_all<F: FnMut(&RecordRef)>(&self, mut f: F) {
        self.root.visit(&mut f);
    }

    pub fn clear(&mut self) {
        self.root = Node::new(self.fields.len() == 1);
        self.len = 0;
    }
}

impl fmt::Debug for OrderedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedIndex")
            .field("fields", &self.fields)
            .field("len", &self.len)
            .field("keys", &self.root.keys.len())
            .finish()
    }
}

/// Index errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("An index needs at least one field")]
    NoFields,

    #[error("Key has {actual} components, index has {expected} fields")]
    KeyArity { expected: usize, actual: usize },

    #[error("Another record is already filed with hash {0:?}")]
    HashConflict(Value),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::NoFields | IndexError::KeyArity { .. } => ErrorKind::InvalidArgument,
            IndexError::HashConflict(_) => ErrorKind::IllegalState,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64, age: i64) -> RecordRef {
        RecordRef::new(Record::new().with("id", id).with("age", age))
    }

    fn ids(records: &[RecordRef]) -> Vec<i64> {
        records
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap_or(-1))
            .collect()
    }

    fn by_id() -> IndexOptions {
        IndexOptions::new().hash_code(KeyField::from("id"))
    }

    #[test]
    fn test_index_requires_fields() {
        let err = OrderedIndex::new(Vec::new(), IndexOptions::new()).unwrap_err();
        assert!(matches!(err, IndexError::NoFields));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = OrderedIndex::new(vec!["age".into()], by_id()).unwrap();
        let a = rec(1, 30);
        let b = rec(2, 30);
        let c = rec(3, 40);
        for r in [&c, &b, &a] {
            assert!(index.insert_record(r));
        }

        assert_eq!(index.len(), 3);
        assert_eq!(index.key_count(), 2);
        // Bucket kept in hash order
        assert_eq!(ids(&index.get(&[Value::Int(30)])), vec![1, 2]);
        assert_eq!(ids(&index.get(&[Value::Int(40)])), vec![3]);
        assert!(index.get(&[Value::Int(50)]).is_empty());
    }

    #[test]
    fn test_duplicate_hash_is_ignored() {
        let mut index = OrderedIndex::new(vec!["age".into()], by_id()).unwrap();
        let a = rec(1, 30);
        assert!(index.insert_record(&a));
        assert!(!index.insert_record(&a));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_insert_checks_arity() {
        let mut index = OrderedIndex::new(vec!["a".into(), "b".into()], IndexOptions::new()).unwrap();
        let err = index.insert(&[Value::Int(1)], rec(1, 1)).unwrap_err();
        assert!(matches!(err, IndexError::KeyArity { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_unhashed_bucket_keeps_insertion_order() {
        let mut index = OrderedIndex::new(vec!["age".into()], IndexOptions::new()).unwrap();
        let a = rec(9, 1);
        let b = rec(3, 1);
        index.insert_record(&a);
        index.insert_record(&b);
        assert!(!index.insert_record(&a));
        assert_eq!(ids(&index.get(&[Value::Int(1)])), vec![9, 3]);
    }

    #[test]
    fn test_missing_field_sorts_first() {
        let mut index = OrderedIndex::new(vec!["age".into()], by_id()).unwrap();
        let with_age = rec(1, 5);
        let without = RecordRef::new(Record::new().with("id", 2));
        index.insert_record(&with_age);
        index.insert_record(&without);

        assert_eq!(ids(&index.get_all(Order::Asc)), vec![2, 1]);
        assert_eq!(ids(&index.get(&[Value::Null])), vec![2]);
    }

    #[test]
    fn test_remove_prunes_levels() {
        let mut index = OrderedIndex::new(vec!["age".into(), "id".into()], by_id()).unwrap();
        let a = rec(1, 30);
        let b = rec(2, 40);
        index.insert_record(&a);
        index.insert_record(&b);

        assert!(index.remove(&a).unwrap().ptr_eq(&a));
        assert_eq!(index.key_count(), 1);
        assert!(index.remove(&a).is_none());

        index.remove(&b);
        assert!(index.is_empty());
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn test_remove_after_field_change() {
        let mut index = OrderedIndex::new(vec!["age".into()], by_id()).unwrap();
        let a = rec(1, 30);
        index.insert_record(&a);

        a.set("age", 31);
        assert!(index.remove(&a).is_some());
        assert!(index.is_empty());
    }

    #[test]
    fn test_update_moves_record() {
        let mut index = OrderedIndex::new(vec!["age".into()], by_id()).unwrap();
        let a = rec(1, 30);
        let b = rec(2, 40);
        index.insert_record(&a);
        index.insert_record(&b);

        a.set("age", 50);
        assert!(index.update(&a).unwrap());
        assert_eq!(ids(&index.get_all(Order::Asc)), vec![2, 1]);
        assert!(index.get(&[Value::Int(30)]).is_empty());

        let stranger = rec(3, 10);
        assert!(!index.update(&stranger).unwrap());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_update_rejects_hash_conflict() {
        let mut index = OrderedIndex::new(vec!["id".into()], by_id()).unwrap();
        let a = rec(1, 30);
        let b = rec(2, 40);
        index.insert_record(&a);
        index.insert_record(&b);

        a.set("id", 2);
        let err = index.update(&a).unwrap_err();
        assert!(matches!(err, IndexError::HashConflict(Value::Int(2))));
        assert_eq!(err.kind(), ErrorKind::IllegalState);

        // Still filed under its old key
        assert_eq!(index.len(), 2);
        assert_eq!(index.key_of(&a), Some(vec![Value::Int(1)]));
        assert!(index.get(&[Value::Int(2)])[0].ptr_eq(&b));
    }

    #[test]
    fn test_key_of() {
        let mut index = OrderedIndex::new(vec!["age".into(), "id".into()], by_id()).unwrap();
        let a = rec(1, 30);
        index.insert_record(&a);
        index.insert_record(&rec(2, 30));

        a.set("age", 99);
        assert_eq!(index.key_of(&a), Some(vec![Value::Int(30), Value::Int(1)]));
        assert_eq!(index.key_of(&rec(1, 30)), None);
    }

    #[test]
    fn test_get_all_descending() {
        let mut index = OrderedIndex::new(vec!["age".into()], by_id()).unwrap();
        for (id, age) in [(1, 20), (2, 10), (3, 30), (4, 10)] {
            index.insert_record(&rec(id, age));
        }
        assert_eq!(ids(&index.get_all(Order::Asc)), vec![2, 4, 1, 3]);
        assert_eq!(ids(&index.get_all(Order::Desc)), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_between_default_bounds() {
        let mut index = OrderedIndex::new(vec!["id".into()], by_id()).unwrap();
        for id in 1..=5 {
            index.insert_record(&rec(id, 0));
        }

        let hits = index.between(&[Value::Int(2)], &[Value::Int(4)], &RangeOptions::default());
        assert_eq!(ids(&hits), vec![2, 3]);

        let opts = RangeOptions::new().left_inclusive(false).right_inclusive(true);
        assert_eq!(ids(&index.between(&[Value::Int(2)], &[Value::Int(4)], &opts)), vec![3, 4]);

        // Open ends
        assert_eq!(ids(&index.between(&[], &[Value::Int(3)], &RangeOptions::default())), vec![1, 2]);
        assert_eq!(ids(&index.between(&[Value::Int(4)], &[], &RangeOptions::default())), vec![4, 5]);
    }

    #[test]
    fn test_between_limit_offset() {
        let mut index = OrderedIndex::new(vec!["id".into()], by_id()).unwrap();
        for id in 1..=10 {
            index.insert_record(&rec(id, 0));
        }
        let opts = RangeOptions::new().offset(2).limit(3);
        assert_eq!(ids(&index.between(&[Value::Int(1)], &[Value::Int(10)], &opts)), vec![3, 4, 5]);

        let opts = RangeOptions::new().offset(8).limit(5);
        assert_eq!(ids(&index.between(&[Value::Int(1)], &[Value::Int(10)], &opts)), vec![9]);
    }

    #[test]
    fn test_compound_between() {
        let mut index = OrderedIndex::new(vec!["age".into(), "id".into()], by_id()).unwrap();
        for (id, age) in [(1, 20), (2, 20), (3, 20), (4, 30), (5, 30), (6, 40)] {
            index.insert_record(&rec(id, age));
        }

        // (20, 2) <= key < (30, 5)
        let hits = index.between(
            &[Value::Int(20), Value::Int(2)],
            &[Value::Int(30), Value::Int(5)],
            &RangeOptions::default(),
        );
        assert_eq!(ids(&hits), vec![2, 3, 4]);

        // Prefix bounds: whole of age 20 up to, not including, age 40
        let hits = index.between(&[Value::Int(20)], &[Value::Int(40)], &RangeOptions::default());
        assert_eq!(ids(&hits), vec![1, 2, 3, 4, 5]);

        // Same first component on both sides
        let hits = index.between(
            &[Value::Int(20), Value::Int(2)],
            &[Value::Int(20), Value::Int(3)],
            &RangeOptions::new().right_inclusive(true),
        );
        assert_eq!(ids(&hits), vec![2, 3]);
    }

    #[test]
    fn test_compound_prefix_get() {
        let mut index = OrderedIndex::new(vec!["age".into(), "id".into()], by_id()).unwrap();
        for (id, age) in [(1, 20), (2, 20), (3, 30)] {
            index.insert_record(&rec(id, age));
        }
        assert_eq!(ids(&index.get(&[Value::Int(20)])), vec![1, 2]);
        assert_eq!(ids(&index.get(&[Value::Int(20), Value::Int(2)])), vec![2]);
        assert_eq!(ids(&index.get(&[])), vec![1, 2, 3]);
    }

    #[test]
    fn test_custom_comparator() {
        let opts = by_id().comparator(|a: &Value, b: &Value| compare_keys(b, a));
        let mut index = OrderedIndex::new(vec!["id".into()], opts).unwrap();
        for id in 1..=3 {
            index.insert_record(&rec(id, 0));
        }
        assert_eq!(ids(&index.get_all(Order::Asc)), vec![3, 2, 1]);
    }

    #[test]
    fn test_visit_and_clear() {
        let mut index = OrderedIndex::new(vec!["id".into()], by_id()).unwrap();
        for id in 1..=4 {
            index.insert_record(&rec(id, 0));
        }
        let mut seen = Vec::new();
        index.visit_all(|r| seen.push(r.get("id").unwrap()));
        assert_eq!(seen.len(), 4);

        index.clear();
        assert!(index.is_empty());
        assert!(index.get_all(Order::Asc).is_empty());
    }
}
