use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::sync::mpsc;

/// The kind of record lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// A lifecycle notification emitted after a successful mutation.
#[derive(Debug, Clone, Serialize)]
pub struct StoreEvent {
    pub kind: ChangeKind,
    pub id: String,
    pub at: DateTime<Utc>,
}

/// Fans lifecycle events out to subscribers over mpsc channels. Purely an
/// observability surface; no store operation depends on delivery.
#[derive(Default)]
pub struct EventBus {
    senders: RefCell<Vec<mpsc::Sender<StoreEvent>>>,
}

impl EventBus {
    /// Subscribe to lifecycle events. Dropping the receiver silently
    /// unsubscribes on the next emit.
    pub fn subscribe(&self) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.borrow_mut().push(tx);
        rx
    }

    pub fn emit(&self, kind: ChangeKind, id: &str) {
        let mut senders = self.senders.borrow_mut();
        if senders.is_empty() {
            return;
        }
        let event = StoreEvent {
            kind,
            id: id.to_string(),
            at: Utc::now(),
        };
        log::debug!("emit {:?} for record {}", event.kind, event.id);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
