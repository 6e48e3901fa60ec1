mod err;

pub use err::StoreError;

use std::collections::{BTreeSet, HashMap};

use crate::data::matches::{Host, HostId, MatchId, MatchPointer, MessageId, SubscriptionId};

/// Durable storage for match pointers. Pointers are created in bulk by
/// the classifier that decides which messages match which subscription,
/// and removed by visitation once they have been delivered.
pub trait MatchStore: Send + Sync + 'static {
    /// Record that the messages `matches` matched `subscription`. The
    /// store assigns match ids in the order of `matches`. Returns the
    /// number of pointers that were stored
    fn insert_matches(
        &self,
        subscription: SubscriptionId,
        matches: &[(MessageId, HostId)],
    ) -> Result<usize, StoreError>;

    /// Open a cursor over all pointers for `subscription` in ascending
    /// order of their match id
    fn stream_matches(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Box<dyn MatchCursor>, StoreError>;

    /// Delete the pointers with the given match ids and return how many
    /// were actually deleted
    fn delete_matches(&self, ids: &[MatchId]) -> Result<usize, StoreError>;

    /// The number of pointers for `subscription` that are still waiting
    /// to be visited
    fn count_matches(&self, subscription: SubscriptionId) -> Result<usize, StoreError>;
}

/// A forward-only cursor over the pointers of one subscription. Dropping
/// the cursor releases whatever it holds in the store.
pub trait MatchCursor: Send {
    /// Fetch the next batch of at most `max_batch_size` pointers. An empty
    /// batch means that the cursor is exhausted
    fn next_batch(&mut self, max_batch_size: usize) -> Result<Vec<MatchPointer>, StoreError>;
}

/// Looks up hosts by their id.
pub trait HostResolver: Send + Sync + 'static {
    /// Return the hosts for `ids`. Ids for which no host exists are simply
    /// missing from the result
    fn resolve_hosts(&self, ids: &BTreeSet<HostId>) -> Result<HashMap<HostId, Host>, StoreError>;
}
