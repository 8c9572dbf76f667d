//! Live query subscriptions.

use futures::Stream;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use right_water_core::authz::Collection;
use right_water_core::types::IdToken;

use super::{Document, DocumentStore, Query, StoreError};

/// A live query.
///
/// Each item is the complete result set at that moment; consumers replace
/// their local copy rather than merging. The subscription ends when the
/// `Watch` is dropped or [`cancel`](Self::cancel)led, or after a snapshot
/// fails (for example once the caller lost access).
pub struct Watch {
    store: DocumentStore,
    token: Option<IdToken>,
    query: Query,
    changes: broadcast::Receiver<Collection>,
    initial: Option<Vec<Document>>,
    finished: bool,
}

impl Watch {
    pub(super) const fn new(
        store: DocumentStore,
        token: Option<IdToken>,
        query: Query,
        changes: broadcast::Receiver<Collection>,
        initial: Vec<Document>,
    ) -> Self {
        Self {
            store,
            token,
            query,
            changes,
            initial: Some(initial),
            finished: false,
        }
    }

    /// The next snapshot, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Result<Vec<Document>, StoreError>> {
        if self.finished {
            return None;
        }
        if let Some(initial) = self.initial.take() {
            return Some(Ok(initial));
        }

        loop {
            match self.changes.recv().await {
                Ok(collection) if collection == self.query.collection => break,
                Ok(_) => {}
                // Missed notifications: a fresh snapshot covers them.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "watch lagged, refreshing snapshot");
                    break;
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
        self.drain_pending();

        let snapshot = self.store.list(self.token.as_ref(), &self.query).await;
        if snapshot.is_err() {
            self.finished = true;
        }
        Some(snapshot)
    }

    /// Discard notifications already queued; the snapshot about to be taken
    /// reflects them, so a burst of writes yields one snapshot.
    fn drain_pending(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    /// Stop listening. Equivalent to dropping the watch.
    pub fn cancel(self) {
        drop(self);
    }

    /// Turn the watch into a stream of snapshots.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Vec<Document>, StoreError>> {
        async_stream::stream! {
            while let Some(snapshot) = self.next().await {
                yield snapshot;
            }
        }
    }
}
