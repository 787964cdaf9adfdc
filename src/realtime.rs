//! Process-wide change feed.
//!
//! Row inserts on the realtime-published tables are broadcast as tagged
//! events; each WebSocket connection subscribes and applies its own filter
//! before forwarding anything to the peer. Payloads are re-validated against
//! the row schema on the receiving side, never trusted as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Messages,
    Notifications,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: ChangeTable,
    pub row: Value,
}

#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an insert. A send error only means no subscriber is
    /// listening, which is not a failure of the insert itself.
    pub fn publish_insert<T: Serialize>(&self, table: ChangeTable, row: &T) {
        let row = match serde_json::to_value(row) {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize change event row");
                return;
            }
        };
        let _ = self.tx.send(ChangeEvent {
            kind: ChangeKind::Insert,
            table,
            row,
        });
    }
}
