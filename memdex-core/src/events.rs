//! Change notification boundary between records, collections and observers
//!
//! Records never call back into their collection. A subscribed record pushes a
//! [`RecordSignal`] onto an unbounded channel owned by the collection, and the
//! collection drains that channel when the caller flushes. Collection-level
//! events go out over a broadcast channel to any number of receivers.

use crate::record::RecordRef;
use tokio::sync::mpsc;
use tracing::trace;

/// A single field write on a subscribed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSignal {
    /// Subscription token assigned by the owning collection
    pub token: u64,
    /// Top-level field that was written
    pub field: String,
}

/// Sending half handed to a record when it joins a collection
#[derive(Debug, Clone)]
pub struct RecordObserver {
    token: u64,
    sender: mpsc::UnboundedSender<RecordSignal>,
}

impl RecordObserver {
    pub fn new(token: u64, sender: mpsc::UnboundedSender<RecordSignal>) -> Self {
        Self { token, sender }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub(crate) fn notify(&self, field: &str) {
        let signal = RecordSignal {
            token: self.token,
            field: field.to_string(),
        };
        // The collection may already be gone; the write itself still stands.
        if self.sender.send(signal).is_err() {
            trace!(token = self.token, field, "record signal dropped, collection closed");
        }
    }
}

/// Records carried by an add/remove event or returned by `add`, shaped like the input
#[derive(Debug, Clone)]
pub enum Batch {
    Single(RecordRef),
    Multiple(Vec<RecordRef>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Single(_) => 1,
            Batch::Multiple(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The record of a `Single` batch
    pub fn as_single(&self) -> Option<&RecordRef> {
        match self {
            Batch::Single(record) => Some(record),
            Batch::Multiple(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<RecordRef> {
        match self {
            Batch::Single(record) => vec![record],
            Batch::Multiple(records) => records,
        }
    }
}

/// Notification emitted by a collection
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// Records were inserted or merged
    Add(Batch),
    /// Records were removed
    Remove(Batch),
    /// A stored record changed; one event per record per flush
    Change {
        record: RecordRef,
        fields: Vec<String>,
    },
}

impl CollectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionEvent::Add(_) => "add",
            CollectionEvent::Remove(_) => "remove",
            CollectionEvent::Change { .. } => "change",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn test_observer_notify() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = RecordObserver::new(7, tx);
        observer.notify("name");

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.token, 7);
        assert_eq!(signal.field, "name");
    }

    #[test]
    fn test_observer_notify_after_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let observer = RecordObserver::new(1, tx);
        // Must not panic
        observer.notify("name");
    }

    #[test]
    fn test_batch_shape() {
        let a = RecordRef::new(Record::new());
        let b = RecordRef::new(Record::new());

        let single = Batch::Single(a.clone());
        assert_eq!(single.len(), 1);
        assert!(single.as_single().unwrap().ptr_eq(&a));

        let multiple = Batch::Multiple(vec![a, b]);
        assert_eq!(multiple.len(), 2);
        assert!(multiple.as_single().is_none());
        assert_eq!(multiple.into_vec().len(), 2);

        assert!(Batch::Multiple(Vec::new()).is_empty());
    }
}
