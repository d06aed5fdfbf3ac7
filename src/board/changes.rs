//! In-process change notification.
//!
//! API handlers publish a [`ChangeEvent`] after every successful write.
//! Subscribers pick the table they care about and treat each event as an
//! opaque "something changed" signal: they re-read full state rather than
//! applying the event incrementally.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::Table;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: i64,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, row_id: i64) -> Self {
        Self {
            table,
            kind,
            row_id,
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(table = %event.table, kind = ?event.kind, row_id = event.row_id, "change published");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, table: Table) -> TableSubscription {
        TableSubscription {
            table,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receives the events of a single table.
pub struct TableSubscription {
    table: Table,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl TableSubscription {
    pub fn table(&self) -> Table {
        self.table
    }

    /// Next event for this table, or `None` once the feed is gone.
    ///
    /// A lagged receiver skips ahead; since events only say "re-read", the
    /// lag itself is reported as a change so nothing is missed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(table = %self.table, skipped, "change subscription lagged");
                    return Some(ChangeEvent::new(self.table, ChangeKind::Update, 0));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv) used to drain bursts.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    return Some(ChangeEvent::new(self.table, ChangeKind::Update, 0));
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscription_filters_by_table() {
        let feed = ChangeFeed::new();
        let mut releases = feed.subscribe(Table::Releases);

        feed.publish(ChangeEvent::new(Table::Customers, ChangeKind::Insert, 1));
        feed.publish(ChangeEvent::new(Table::Releases, ChangeKind::Update, 7));

        let event = releases.recv().await.unwrap();
        assert_eq!(event, ChangeEvent::new(Table::Releases, ChangeKind::Update, 7));
        assert!(releases.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let feed = ChangeFeed::new();
        feed.publish(ChangeEvent::new(Table::Modules, ChangeKind::Delete, 3));
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_feed_dropped() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(Table::Releases);
        drop(feed);
        let result = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lagged_subscription_reports_a_change() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(Table::Releases);
        for id in 0..(FEED_CAPACITY as i64 + 10) {
            feed.publish(ChangeEvent::new(Table::Releases, ChangeKind::Insert, id));
        }
        let event = sub.recv().await.unwrap();
        assert_eq!(event.table, Table::Releases);
        assert_eq!(sub.table(), Table::Releases);
    }

    #[test]
    fn test_change_event_serialization() {
        let json =
            serde_json::to_string(&ChangeEvent::new(Table::VersionHistory, ChangeKind::Insert, 2))
                .unwrap();
        assert_eq!(
            json,
            r#"{"table":"version_history","kind":"insert","row_id":2}"#
        );
    }
}
