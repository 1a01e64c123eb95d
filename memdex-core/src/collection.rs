//! Collection of records under a primary index and named secondary indexes
//!
//! The primary index is keyed by the configured id attribute. Records
//! without an id are still stored, keyed as absent, and can be listed with
//! [`Collection::unsaved`]. Every stored record is subscribed to the
//! collection's signal channel; [`Collection::flush_changes`] applies the
//! pending writes to the indexes and emits change events.

use crate::config::{CollectionConfig, ConfigError, OnConflict};
use crate::error::ErrorKind;
use crate::events::{Batch, CollectionEvent, RecordObserver, RecordSignal};
use crate::index::{IndexError, IndexOptions, KeyField, Order, OrderedIndex, RangeOptions};
use crate::query::{Query, QueryError, QuerySpec};
use crate::record::{Record, RecordError, RecordRef, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

/// Hook applied to plain records before they are stored for the first time
pub type RecordFactory = Arc<dyn Fn(Record) -> Record + Send + Sync>;

/// Input accepted by `add`
#[derive(Debug)]
pub enum Incoming {
    /// Plain data; becomes a new shared record on insert
    Plain(Record),
    /// An existing handle, stored as-is on insert
    Shared(RecordRef),
}

impl From<Record> for Incoming {
    fn from(record: Record) -> Self {
        Incoming::Plain(record)
    }
}

impl From<RecordRef> for Incoming {
    fn from(record: RecordRef) -> Self {
        Incoming::Shared(record)
    }
}

impl From<&RecordRef> for Incoming {
    fn from(record: &RecordRef) -> Self {
        Incoming::Shared(record.clone())
    }
}

/// Per-call overrides for `add`
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub on_conflict: Option<OnConflict>,
    pub commit_on_merge: Option<bool>,
    pub silent: bool,
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = Some(policy);
        self
    }

    /// Set the policy from its string form
    pub fn on_conflict_str(self, policy: &str) -> Result<Self, CollectionError> {
        Ok(self.on_conflict(policy.parse()?))
    }

    pub fn commit_on_merge(mut self, commit: bool) -> Self {
        self.commit_on_merge = Some(commit);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Per-call options for `remove` and `remove_all`
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub silent: bool,
}

impl RemoveOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

/// What `remove` looks up
#[derive(Debug)]
pub enum RemoveTarget {
    Id(Value),
    Record(RecordRef),
}

impl From<Value> for RemoveTarget {
    fn from(id: Value) -> Self {
        RemoveTarget::Id(id)
    }
}

impl From<i32> for RemoveTarget {
    fn from(id: i32) -> Self {
        RemoveTarget::Id(Value::Int(id.into()))
    }
}

impl From<i64> for RemoveTarget {
    fn from(id: i64) -> Self {
        RemoveTarget::Id(Value::Int(id))
    }
}

impl From<&str> for RemoveTarget {
    fn from(id: &str) -> Self {
        RemoveTarget::Id(Value::from(id))
    }
}

impl From<RecordRef> for RemoveTarget {
    fn from(record: RecordRef) -> Self {
        RemoveTarget::Record(record)
    }
}

impl From<&RecordRef> for RemoveTarget {
    fn from(record: &RecordRef) -> Self {
        RemoveTarget::Record(record.clone())
    }
}

/// What `remove_all` removes
#[derive(Debug)]
pub enum Selection {
    /// Every record matching a query
    Query(QuerySpec),
    /// These records, looked up by id or identity
    Records(Vec<RecordRef>),
    /// Everything
    All,
}

impl From<QuerySpec> for Selection {
    fn from(spec: QuerySpec) -> Self {
        Selection::Query(spec)
    }
}

impl From<Vec<RecordRef>> for Selection {
    fn from(records: Vec<RecordRef>) -> Self {
        Selection::Records(records)
    }
}

pub struct Collection {
    config: CollectionConfig,
    /// Primary index keyed by the id attribute
    index: OrderedIndex,
    indexes: BTreeMap<String, OrderedIndex>,
    record_factory: Option<RecordFactory>,
    events: broadcast::Sender<CollectionEvent>,
    signal_tx: mpsc::UnboundedSender<RecordSignal>,
    signal_rx: mpsc::UnboundedReceiver<RecordSignal>,
    /// Subscribed records by observer token
    subscriptions: HashMap<u64, RecordRef>,
    next_token: u64,
}

impl Collection {
    pub fn new(config: CollectionConfig) -> Result<Self, CollectionError> {
        config.validate()?;

        let id_field = KeyField::path(config.id_attribute.clone());
        let index = OrderedIndex::new(vec![id_field.clone()], IndexOptions::new().hash_code(id_field))?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        debug!(collection = %config.name, id_attribute = %config.id_attribute, "collection created");

        Ok(Self {
            config,
            index,
            indexes: BTreeMap::new(),
            record_factory: None,
            events,
            signal_tx,
            signal_rx,
            subscriptions: HashMap::new(),
            next_token: 0,
        })
    }

    /// Create a collection holding `records`, without emitting events
    pub fn with_records<I>(config: CollectionConfig, records: I) -> Result<Self, CollectionError>
    where
        I: IntoIterator,
        I::Item: Into<Incoming>,
    {
        let mut collection = Self::new(config)?;
        collection.add_many(records, &AddOptions::new().silent());
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn set_record_factory<F>(&mut self, factory: F)
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.record_factory = Some(Arc::new(factory));
    }

    /// Id of a record, or `None` if it has none
    pub fn record_id(&self, record: &Record) -> Option<Value> {
        record
            .get_by_path(&self.config.id_attribute)
            .filter(|id| !id.is_null())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Receive add, remove and change events
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    /// Insert one record, or resolve a conflict with the stored record of the same id
    pub fn add(&mut self, record: impl Into<Incoming>, opts: &AddOptions) -> RecordRef {
        let (stored, added) = self.add_one(record.into(), opts);
        if added {
            debug!(collection = %self.config.name, "added 1 record");
            if !opts.silent {
                self.emit(CollectionEvent::Add(Batch::Single(stored.clone())));
            }
        }
        stored
    }

    /// Insert several records; one batched event
    pub fn add_many<I>(&mut self, records: I, opts: &AddOptions) -> Vec<RecordRef>
    where
        I: IntoIterator,
        I::Item: Into<Incoming>,
    {
        let mut stored = Vec::new();
        let mut added = Vec::new();
        for record in records {
            let (record, is_added) = self.add_one(record.into(), opts);
            if is_added {
                added.push(record.clone());
            }
            stored.push(record);
        }
        debug!(collection = %self.config.name, count = added.len(), "added records");
        if !opts.silent && !added.is_empty() {
            self.emit(CollectionEvent::Add(Batch::Multiple(added)));
        }
        stored
    }

    /// Add a JSON object (single) or an array of objects (many)
    pub fn add_json(&mut self, json: serde_json::Value, opts: &AddOptions) -> Result<Batch, CollectionError> {
        match json {
            serde_json::Value::Object(_) => {
                let record = Record::from_json(json)?;
                Ok(Batch::Single(self.add(record, opts)))
            }
            serde_json::Value::Array(items) => {
                let records = items
                    .into_iter()
                    .map(Record::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Batch::Multiple(self.add_many(records, opts)))
            }
            other => Err(CollectionError::InvalidRecord(format!(
                "expected an object or an array of objects, got {}",
                Value::from(other).type_name()
            ))),
        }
    }

    /// Store one record; the flag is false when the handle was already stored here
    fn add_one(&mut self, incoming: Incoming, opts: &AddOptions) -> (RecordRef, bool) {
        let id = match &incoming {
            Incoming::Plain(record) => self.record_id(record),
            Incoming::Shared(record) => {
                if self.is_stored(record) {
                    return (record.clone(), false);
                }
                self.record_id(&record.read())
            }
        };

        let Some(existing) = id.and_then(|id| self.get(id)) else {
            return (self.insert_new(incoming), true);
        };

        let incoming = match incoming {
            Incoming::Shared(record) if record.ptr_eq(&existing) => return (existing, false),
            Incoming::Shared(record) => record.snapshot(),
            Incoming::Plain(record) => record,
        };

        let policy = opts.on_conflict.unwrap_or(self.config.on_conflict);
        let commit = opts.commit_on_merge.unwrap_or(self.config.commit_on_merge);
        {
            let mut stored = existing.write();
            match policy {
                OnConflict::Merge => stored.merge_from(&incoming),
                OnConflict::Replace => stored.replace_from(&incoming, &self.config.id_attribute),
                OnConflict::Skip => {}
            }
            if commit {
                stored.commit();
            }
        }
        trace!(collection = %self.config.name, %policy, "resolved add conflict");
        if let Err(err) = self.update_indexes(&existing) {
            warn!(collection = %self.config.name, %err, "merged record kept its previous position");
        }
        (existing, true)
    }

    fn insert_new(&mut self, incoming: Incoming) -> RecordRef {
        let record = match incoming {
            Incoming::Plain(record) => match &self.record_factory {
                Some(factory) => RecordRef::new(factory(record)),
                None => RecordRef::new(record),
            },
            Incoming::Shared(record) => record,
        };

        self.index.insert_record(&record);
        for index in self.indexes.values_mut() {
            index.insert_record(&record);
        }
        self.attach(&record);
        record
    }

    /// Remove a record by id or by handle
    pub fn remove(&mut self, target: impl Into<RemoveTarget>, opts: &RemoveOptions) -> Option<RecordRef> {
        let stored = match target.into() {
            RemoveTarget::Id(id) => self.get(id)?,
            RemoveTarget::Record(record) if self.is_stored(&record) => record,
            RemoveTarget::Record(record) => {
                let id = self.record_id(&record.read());
                match id {
                    Some(id) => self.get(id)?,
                    None => record,
                }
            }
        };

        let removed = self.index.remove(&stored)?;
        for index in self.indexes.values_mut() {
            index.remove(&removed);
        }
        self.detach(&removed);

        debug!(collection = %self.config.name, "removed 1 record");
        if !opts.silent {
            self.emit(CollectionEvent::Remove(Batch::Single(removed.clone())));
        }
        Some(removed)
    }

    /// Remove every selected record; one batched event when anything was removed
    pub fn remove_all(
        &mut self,
        selection: impl Into<Selection>,
        opts: &RemoveOptions,
    ) -> Result<Vec<RecordRef>, CollectionError> {
        let targets = match selection.into() {
            Selection::Query(spec) => self.filter(&spec)?,
            Selection::Records(records) => records,
            Selection::All => self.records(),
        };

        let removed: Vec<RecordRef> = targets
            .into_iter()
            .filter_map(|record| self.remove(record, &RemoveOptions::silent()))
            .collect();

        debug!(collection = %self.config.name, count = removed.len(), "removed records");
        if !opts.silent && !removed.is_empty() {
            self.emit(CollectionEvent::Remove(Batch::Multiple(removed.clone())));
        }
        Ok(removed)
    }

    /// Stored record with this id
    pub fn get(&self, id: impl Into<Value>) -> Option<RecordRef> {
        let id = id.into();
        if id.is_null() {
            return None;
        }
        self.index.get(std::slice::from_ref(&id)).into_iter().next()
    }

    /// Union of key lookups on the primary or a named index
    pub fn get_all(&self, key_lists: &[Vec<Value>], index: Option<&str>) -> Result<Vec<RecordRef>, CollectionError> {
        let mut query = self.query();
        if let Some(name) = index {
            query.with_index(name)?;
        }
        Ok(query.get_all(key_lists)?.run())
    }

    /// Every record in primary key order
    pub fn records(&self) -> Vec<RecordRef> {
        self.index.get_all(Order::Asc)
    }

    /// Range scan on the primary or a named index
    pub fn between(
        &self,
        left: &[Value],
        right: &[Value],
        opts: &RangeOptions,
        index: Option<&str>,
    ) -> Result<Vec<RecordRef>, CollectionError> {
        let mut query = self.query();
        if let Some(name) = index {
            query.with_index(name)?;
        }
        Ok(query.between(left, right, opts)?.run())
    }

    pub fn filter(&self, spec: &QuerySpec) -> Result<Vec<RecordRef>, CollectionError> {
        Ok(self.query().filter(spec)?.run())
    }

    pub fn filter_json(&self, query: &serde_json::Value) -> Result<Vec<RecordRef>, CollectionError> {
        Ok(self.query().filter_json(query)?.run())
    }

    pub fn filter_by<F>(&self, predicate: F) -> Result<Vec<RecordRef>, CollectionError>
    where
        F: Fn(&Record) -> bool,
    {
        Ok(self.query().filter_by(predicate)?.run())
    }

    pub fn skip(&self, n: usize) -> Result<Vec<RecordRef>, CollectionError> {
        Ok(self.query().skip(n)?.run())
    }

    pub fn limit(&self, n: usize) -> Result<Vec<RecordRef>, CollectionError> {
        Ok(self.query().limit(n)?.run())
    }

    /// Start a chainable query
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Build a named secondary index over the current records
    ///
    /// Leaf buckets are ordered by record id unless `opts` sets a hash code.
    /// Creating an index under an existing name replaces it.
    pub fn create_index(
        &mut self,
        name: impl Into<String>,
        fields: Vec<KeyField>,
        opts: IndexOptions,
    ) -> Result<(), CollectionError> {
        let name = name.into();
        let opts = if opts.hash_code.is_none() {
            opts.hash_code(KeyField::path(self.config.id_attribute.clone()))
        } else {
            opts
        };

        let mut index = OrderedIndex::new(fields, opts)?;
        self.index.visit_all(|record| {
            index.insert_record(record);
        });

        debug!(
            collection = %self.config.name,
            index = %name,
            records = index.len(),
            keys = index.key_count(),
            "index created"
        );
        self.indexes.insert(name, index);
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> Result<&OrderedIndex, CollectionError> {
        self.indexes
            .get(name)
            .ok_or_else(|| CollectionError::IndexNotFound(name.to_string()))
    }

    pub fn primary_index(&self) -> &OrderedIndex {
        &self.index
    }

    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }

    /// Re-position a record in the primary index (`None`) or one named index
    pub fn update_index(&mut self, record: &RecordRef, index: Option<&str>) -> Result<(), CollectionError> {
        match index {
            None => self.update_primary(record),
            Some(name) => {
                let index = self
                    .indexes
                    .get_mut(name)
                    .ok_or_else(|| CollectionError::IndexNotFound(name.to_string()))?;
                index.update(record)?;
                Ok(())
            }
        }
    }

    /// Re-position a record in every index
    ///
    /// An id already held by another record is rejected: the record gets its
    /// stored id back and is re-filed for its other changes only.
    pub fn update_indexes(&mut self, record: &RecordRef) -> Result<(), CollectionError> {
        let result = self.update_primary(record);
        for (name, index) in self.indexes.iter_mut() {
            if let Err(err) = index.update(record) {
                warn!(collection = %self.config.name, index = %name, %err, "record kept its previous position");
            }
        }
        trace!(collection = %self.config.name, "record re-indexed");
        result
    }

    fn update_primary(&mut self, record: &RecordRef) -> Result<(), CollectionError> {
        match self.index.update(record) {
            Ok(_) => Ok(()),
            Err(IndexError::HashConflict(id)) => {
                self.restore_id(record)?;
                Err(CollectionError::DuplicateId(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write back the id the primary index holds the record under, without notifying
    fn restore_id(&self, record: &RecordRef) -> Result<(), CollectionError> {
        let Some(stored) = self.index.key_of(record).and_then(|keys| keys.into_iter().next()) else {
            return Ok(());
        };
        let id_attr = &self.config.id_attribute;
        let mut guard = record.write();
        let observer = guard.unsubscribe();
        let restored = if stored.is_null() && !id_attr.contains('.') {
            guard.unset(id_attr);
            Ok(())
        } else {
            guard.set_by_path(id_attr, stored)
        };
        if let Some(observer) = observer {
            guard.subscribe(observer);
        }
        restored.map_err(CollectionError::from)
    }

    /// Apply pending record writes to the indexes
    ///
    /// Signals are coalesced per record in arrival order. Returns the number
    /// of records re-indexed.
    pub fn flush_changes(&mut self) -> usize {
        let mut order: Vec<(u64, Vec<String>)> = Vec::new();
        let mut position: HashMap<u64, usize> = HashMap::new();

        while let Ok(signal) = self.signal_rx.try_recv() {
            match position.get(&signal.token) {
                Some(&i) => {
                    let fields = &mut order[i].1;
                    if !fields.contains(&signal.field) {
                        fields.push(signal.field);
                    }
                }
                None => {
                    position.insert(signal.token, order.len());
                    order.push((signal.token, vec![signal.field]));
                }
            }
        }

        let mut flushed = 0;
        for (token, fields) in order {
            // Removed since the write
            let Some(record) = self.subscriptions.get(&token).cloned() else {
                continue;
            };
            if let Err(err) = self.update_indexes(&record) {
                warn!(collection = %self.config.name, %err, "record change rejected");
            }
            flushed += 1;
            if self.config.emit_record_events {
                self.emit(CollectionEvent::Change { record, fields });
            }
        }

        if flushed > 0 {
            debug!(collection = %self.config.name, records = flushed, "flushed record changes");
        }
        flushed
    }

    /// Records stored without an id
    pub fn unsaved(&self) -> Vec<RecordRef> {
        self.index.get(&[Value::Null])
    }

    /// Remove every record without an id, silently
    pub fn prune(&mut self) -> Vec<RecordRef> {
        let unsaved = self.unsaved();
        unsaved
            .into_iter()
            .filter_map(|record| self.remove(record, &RemoveOptions::silent()))
            .collect()
    }

    /// Every record, in primary order, as a JSON array
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.records().iter().map(|r| r.read().to_json()).collect())
    }

    fn attach(&mut self, record: &RecordRef) {
        let token = self.next_token;
        self.next_token += 1;
        record.write().subscribe(RecordObserver::new(token, self.signal_tx.clone()));
        self.subscriptions.insert(token, record.clone());
    }

    /// Token of `record` when this collection is the one observing it
    fn owned_token(&self, record: &RecordRef) -> Option<u64> {
        record
            .read()
            .observer_token()
            .filter(|token| self.subscriptions.get(token).is_some_and(|r| r.ptr_eq(record)))
    }

    fn is_stored(&self, record: &RecordRef) -> bool {
        self.owned_token(record).is_some()
    }

    fn detach(&mut self, record: &RecordRef) {
        if let Some(token) = self.owned_token(record) {
            record.write().unsubscribe();
            self.subscriptions.remove(&token);
        }
    }

    fn emit(&self, event: CollectionEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            trace!(collection = %self.config.name, event = name, "no event receivers");
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.config.name)
            .field("len", &self.len())
            .field("indexes", &self.index_names())
            .finish()
    }
}

/// Collection errors
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Index '{0}' not found")]
    IndexNotFound(String),

    #[error("Record id {0:?} is already taken")]
    DuplicateId(Value),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CollectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollectionError::InvalidRecord(_) => ErrorKind::InvalidArgument,
            CollectionError::IndexNotFound(_) => ErrorKind::NotFound,
            CollectionError::DuplicateId(_) => ErrorKind::IllegalState,
            CollectionError::Record(e) => e.kind(),
            CollectionError::Index(e) => e.kind(),
            CollectionError::Query(e) => e.kind(),
            CollectionError::Config(e) => e.kind(),
        }
    }
}
