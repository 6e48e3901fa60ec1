use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use logreceiver::prelude::*;

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<MatchId, MatchPointer>,
    fetches: usize,
    deletes: Vec<Vec<MatchId>>,
    fail_fetch_at: Option<usize>,
    fail_delete_at: Option<usize>,
}

/// A `MatchStore` that keeps its pointers in memory. Failures can be
/// injected for the n-th fetch or delete across all cursors of the store.
#[derive(Clone, Default)]
pub struct InMemoryMatchStore {
    inner: Arc<Mutex<Inner>>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for tests: insert `(message id, host id)` pairs and
    /// return the match ids that were assigned
    pub fn with_matches(&self, subscription: i64, matches: &[(i64, i64)]) -> Vec<MatchId> {
        let first = self.inner.lock().unwrap().next_id + 1;
        let matches: Vec<_> = matches
            .iter()
            .map(|(msg, host)| (MessageId(*msg), HostId(*host)))
            .collect();
        self.insert_matches(SubscriptionId(subscription), &matches)
            .unwrap();
        (first..first + matches.len() as i64).map(MatchId).collect()
    }

    /// Make the `n`-th call to `next_batch` (counting from 1) fail
    pub fn fail_fetch_at(&self, n: usize) {
        self.inner.lock().unwrap().fail_fetch_at = Some(n);
    }

    /// Make the `n`-th call to `delete_matches` (counting from 1) fail
    pub fn fail_delete_at(&self, n: usize) {
        self.inner.lock().unwrap().fail_delete_at = Some(n);
    }

    /// The pointers that are still stored for `subscription`, in match id
    /// order
    pub fn pending(&self, subscription: i64) -> Vec<MatchPointer> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|ptr| ptr.subscription_id == SubscriptionId(subscription))
            .cloned()
            .collect()
    }

    /// The message ids that are still stored for `subscription`
    pub fn pending_messages(&self, subscription: i64) -> Vec<i64> {
        self.pending(subscription)
            .iter()
            .map(|ptr| ptr.message_id.0)
            .collect()
    }

    /// The arguments of every successful call to `delete_matches`
    pub fn deletes(&self) -> Vec<Vec<MatchId>> {
        self.inner.lock().unwrap().deletes.clone()
    }

    pub fn fetches(&self) -> usize {
        self.inner.lock().unwrap().fetches
    }

    /// The number of cursors that have been opened but not dropped yet
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert_matches(
        &self,
        subscription: SubscriptionId,
        matches: &[(MessageId, HostId)],
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for (message_id, host_id) in matches {
            inner.next_id += 1;
            let match_id = MatchId(inner.next_id);
            inner.rows.insert(
                match_id,
                MatchPointer {
                    match_id,
                    subscription_id: subscription,
                    message_id: *message_id,
                    host_id: *host_id,
                },
            );
        }
        Ok(matches.len())
    }

    fn stream_matches(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Box<dyn MatchCursor>, StoreError> {
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryCursor {
            inner: self.inner.clone(),
            open_cursors: self.open_cursors.clone(),
            subscription,
            position: None,
        }))
    }

    fn delete_matches(&self, ids: &[MatchId]) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let call = inner.deletes.len() + 1;
        if inner.fail_delete_at == Some(call) {
            inner.fail_delete_at = None;
            return Err(StoreError::Unknown(anyhow!(
                "injected failure for delete #{}",
                call
            )));
        }
        inner.deletes.push(ids.to_vec());
        Ok(ids
            .iter()
            .filter(|id| inner.rows.remove(*id).is_some())
            .count())
    }

    fn count_matches(&self, subscription: SubscriptionId) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|ptr| ptr.subscription_id == subscription)
            .count())
    }
}

struct InMemoryCursor {
    inner: Arc<Mutex<Inner>>,
    open_cursors: Arc<AtomicUsize>,
    subscription: SubscriptionId,
    position: Option<MatchId>,
}

impl MatchCursor for InMemoryCursor {
    fn next_batch(&mut self, max_batch_size: usize) -> Result<Vec<MatchPointer>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetches += 1;
        if inner.fail_fetch_at == Some(inner.fetches) {
            inner.fail_fetch_at = None;
            return Err(StoreError::DatabaseUnavailable);
        }

        let batch: Vec<_> = inner
            .rows
            .values()
            .filter(|ptr| ptr.subscription_id == self.subscription)
            .filter(|ptr| self.position.map_or(true, |pos| ptr.match_id > pos))
            .take(max_batch_size)
            .cloned()
            .collect();
        if let Some(last) = batch.last() {
            self.position = Some(last.match_id);
        }
        Ok(batch)
    }
}

impl Drop for InMemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}
