//! # Change Notification
//!
//! One `tokio::sync::watch` channel per collection. A commit publishes the
//! collection's full contents; subscribers always see the latest snapshot.
//!
//! ```text
//!   commit ──► next_revision() ──► list(collection) ──► publish(rev, docs)
//!                                                            │
//!                              only if rev > current rev ◄───┘
//!                                                            │
//!                        ┌───────────────────┬───────────────┴──┐
//!                        ▼                   ▼                  ▼
//!                  Subscription        Subscription       Subscription
//! ```
//!
//! Intermediate snapshots may be skipped when commits arrive faster than a
//! subscriber reads; the last one is never skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::{Collection, Document};

/// Full contents of one collection at one revision.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub collection: Collection,
    pub revision: u64,
    pub documents: Arc<Vec<Document>>,
}

/// Per-collection publisher shared by the store implementations.
#[derive(Debug)]
pub struct Notifier {
    channels: HashMap<Collection, watch::Sender<Snapshot>>,
    revision: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        let channels = Collection::ALL
            .into_iter()
            .map(|collection| {
                let (tx, _rx) = watch::channel(Snapshot {
                    collection,
                    revision: 0,
                    documents: Arc::new(Vec::new()),
                });
                (collection, tx)
            })
            .collect();

        Notifier {
            channels,
            revision: AtomicU64::new(0),
        }
    }

    /// Reserves the revision for a snapshot about to be taken.
    pub fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publishes a snapshot unless a newer one is already out.
    pub fn publish(&self, collection: Collection, revision: u64, documents: Vec<Document>) {
        if let Some(tx) = self.channels.get(&collection) {
            let documents = Arc::new(documents);
            tx.send_if_modified(|current| {
                if revision > current.revision {
                    *current = Snapshot {
                        collection,
                        revision,
                        documents,
                    };
                    true
                } else {
                    false
                }
            });
        }
    }

    pub fn subscribe(&self, collection: Collection) -> Subscription {
        match self.channels.get(&collection) {
            Some(tx) => Subscription { rx: tx.subscribe() },
            // Every collection gets a channel in `new`
            None => {
                let (_tx, rx) = watch::channel(Snapshot {
                    collection,
                    revision: 0,
                    documents: Arc::new(Vec::new()),
                });
                Subscription { rx }
            }
        }
    }

    /// Number of live subscriptions on a collection.
    pub fn receiver_count(&self, collection: Collection) -> usize {
        self.channels
            .get(&collection)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier::new()
    }
}

/// A live view of one collection.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Snapshot>,
}

impl Subscription {
    /// The latest snapshot, marking it seen.
    pub fn current(&mut self) -> Snapshot {
        self.rx.borrow_and_update().clone()
    }

    /// Waits for the next snapshot. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            body: json!({"id": id}),
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest_snapshot() {
        let notifier = Notifier::new();
        let mut sub = notifier.subscribe(Collection::Products);
        assert!(sub.current().documents.is_empty());

        let rev = notifier.next_revision();
        notifier.publish(Collection::Products, rev, vec![doc("a")]);

        let snap = sub.changed().await.unwrap();
        assert_eq!(snap.documents.len(), 1);
        assert_eq!(snap.revision, rev);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_dropped() {
        let notifier = Notifier::new();
        let older = notifier.next_revision();
        let newer = notifier.next_revision();

        notifier.publish(Collection::Customers, newer, vec![doc("a"), doc("b")]);
        notifier.publish(Collection::Customers, older, vec![doc("a")]);

        let mut sub = notifier.subscribe(Collection::Customers);
        assert_eq!(sub.current().documents.len(), 2);
    }

    #[test]
    fn test_receiver_count() {
        let notifier = Notifier::new();
        let sub = notifier.subscribe(Collection::Intents);
        assert_eq!(notifier.receiver_count(Collection::Intents), 1);
        drop(sub);
        assert_eq!(notifier.receiver_count(Collection::Intents), 0);
    }
}
