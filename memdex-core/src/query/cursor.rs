//! Chainable, single-use query over one collection
//!
//! A query starts `Unfetched`. The first index operation (`get`, `get_all`,
//! `between`) or the first in-memory step (`filter`, `order_by`, `skip`,
//! `limit`) takes a snapshot of records and moves it to `Fetched`. Index
//! operations are only legal before that point. `run` hands the snapshot out
//! and leaves the query `Consumed` with nothing left to return.

use super::ast::{OrderBy, QuerySpec};
use super::eval::{Collator, DEFAULT_LOCALE};
use super::parser::QueryParser;
use super::QueryError;
use crate::collection::Collection;
use crate::index::{Order, OrderedIndex, RangeOptions};
use crate::logging::QueryTimer;
use crate::record::{Record, RecordRef, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

/// Lifecycle of a [`Query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Unfetched,
    Fetched,
    Consumed,
}

pub struct Query<'a> {
    collection: &'a Collection,
    index: Option<String>,
    data: Vec<RecordRef>,
    state: QueryState,
    steps: Vec<&'static str>,
    timer: QueryTimer,
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("collection", &self.collection.name())
            .field("index", &self.index)
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("len", &self.data.len())
            .finish()
    }
}

impl<'a> Query<'a> {
    pub fn new(collection: &'a Collection) -> Self {
        let timer = QueryTimer::start(collection.name(), collection.config().slow_query_threshold_ms);
        Self {
            collection,
            index: None,
            data: Vec::new(),
            state: QueryState::Unfetched,
            steps: Vec::new(),
            timer,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Route subsequent index operations through a secondary index
    pub fn with_index(&mut self, name: &str) -> Result<&mut Self, QueryError> {
        self.ensure_unfetched()?;
        if self.collection.get_index(name).is_err() {
            return Err(QueryError::UnknownIndex(name.to_string()));
        }
        self.index = Some(name.to_string());
        Ok(self)
    }

    /// Records whose key equals `keys` (a shorter key is a prefix match)
    pub fn get(&mut self, keys: &[Value]) -> Result<&mut Self, QueryError> {
        self.ensure_unfetched()?;
        self.data = self.source()?.get(keys);
        self.fetched("get");
        Ok(self)
    }

    /// Union of several key lookups, first occurrence wins; no keys selects everything
    pub fn get_all(&mut self, key_lists: &[Vec<Value>]) -> Result<&mut Self, QueryError> {
        self.ensure_unfetched()?;
        let index = self.source()?;
        self.data = if key_lists.is_empty() {
            index.get_all(Order::Asc)
        } else {
            let mut seen = HashSet::new();
            key_lists
                .iter()
                .flat_map(|keys| index.get(keys))
                .filter(|record| seen.insert(record.addr()))
                .collect()
        };
        self.fetched("get_all");
        Ok(self)
    }

    /// Range scan over the selected index
    pub fn between(&mut self, left: &[Value], right: &[Value], opts: &RangeOptions) -> Result<&mut Self, QueryError> {
        self.ensure_unfetched()?;
        self.data = self.source()?.between(left, right, opts);
        self.fetched("between");
        Ok(self)
    }

    /// Apply a compiled query: where, then orderBy, then offset, then limit
    pub fn filter(&mut self, spec: &QuerySpec) -> Result<&mut Self, QueryError> {
        self.fetch()?;
        if let Some(filter) = &spec.filter {
            if !filter.is_empty() {
                self.data.retain(|record| filter.matches(&record.read()));
            }
        }
        if !spec.order_by.is_empty() {
            let collator = Collator::new(spec.locale.as_deref().unwrap_or(DEFAULT_LOCALE));
            collator.sort(&mut self.data, &spec.order_by);
        }
        if let Some(offset) = spec.offset {
            self.drop_front(offset);
        }
        if let Some(limit) = spec.limit {
            self.data.truncate(limit);
        }
        self.steps.push("filter");
        Ok(self)
    }

    /// Parse and apply a JSON query object
    pub fn filter_json(&mut self, query: &serde_json::Value) -> Result<&mut Self, QueryError> {
        let spec = QueryParser::parse_from_value(query)?;
        self.filter(&spec)
    }

    /// Keep records the predicate accepts
    pub fn filter_by<F>(&mut self, predicate: F) -> Result<&mut Self, QueryError>
    where
        F: Fn(&Record) -> bool,
    {
        self.fetch()?;
        self.data.retain(|record| predicate(&record.read()));
        self.steps.push("filter_by");
        Ok(self)
    }

    pub fn order_by(&mut self, order: &[OrderBy], locale: Option<&str>) -> Result<&mut Self, QueryError> {
        self.fetch()?;
        Collator::new(locale.unwrap_or(DEFAULT_LOCALE)).sort(&mut self.data, order);
        self.steps.push("order_by");
        Ok(self)
    }

    /// Drop the first `n` records
    pub fn skip(&mut self, n: usize) -> Result<&mut Self, QueryError> {
        self.fetch()?;
        self.drop_front(n);
        self.steps.push("skip");
        Ok(self)
    }

    /// Keep at most `n` records
    pub fn limit(&mut self, n: usize) -> Result<&mut Self, QueryError> {
        self.fetch()?;
        self.data.truncate(n);
        self.steps.push("limit");
        Ok(self)
    }

    /// Records currently held by the snapshot
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hand out the result; the query is consumed afterwards
    pub fn run(&mut self) -> Vec<RecordRef> {
        if self.state == QueryState::Unfetched {
            self.data = self.source().map(|index| index.get_all(Order::Asc)).unwrap_or_default();
        }
        let out = std::mem::take(&mut self.data);
        if self.state != QueryState::Consumed {
            let steps = if self.steps.is_empty() {
                "all".to_string()
            } else {
                self.steps.join(",")
            };
            self.timer.finish(&steps, out.len());
        }
        self.state = QueryState::Consumed;
        out
    }

    fn ensure_unfetched(&self) -> Result<(), QueryError> {
        if self.state == QueryState::Unfetched {
            Ok(())
        } else {
            Err(QueryError::IndexInaccessible)
        }
    }

    fn source(&self) -> Result<&'a OrderedIndex, QueryError> {
        match &self.index {
            Some(name) => self
                .collection
                .get_index(name)
                .map_err(|_| QueryError::UnknownIndex(name.clone())),
            None => Ok(self.collection.primary_index()),
        }
    }

    /// Snapshot the selected index on first use
    fn fetch(&mut self) -> Result<(), QueryError> {
        if self.state == QueryState::Unfetched {
            self.data = self.source()?.get_all(Order::Asc);
            self.fetched("scan");
        }
        Ok(())
    }

    fn fetched(&mut self, step: &'static str) {
        trace!(collection = self.collection.name(), step, records = self.data.len(), "query fetched");
        self.state = QueryState::Fetched;
        self.steps.push(step);
    }

    fn drop_front(&mut self, n: usize) {
        if n >= self.data.len() {
            self.data.clear();
        } else {
            self.data.drain(..n);
        }
    }
}
