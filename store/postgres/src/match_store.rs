//! The pointer table. Every row records that one message matched one
//! subscription; the message itself stays in its host's partition and is
//! referenced by `(host_id, entry_id)`.
//!
//! Matches are read with keyset pagination: each fetch asks for the
//! matches after the last match id the cursor returned, ordered by match
//! id. That makes a cursor nothing more than a position, so it holds on
//! to neither a connection nor a transaction between fetches, and the
//! matches of a batch can be deleted while the cursor is open.

use diesel::{delete, insert_into, table, Connection as _, ExpressionMethods, QueryDsl, RunQueryDsl};

use logreceiver::internal_error;
use logreceiver::prelude::*;

use crate::connection_pool::ConnectionPool;

table! {
    matched_messages(match_id) {
        match_id -> BigInt,
        subscription_id -> BigInt,
        // The message id; the name is the one the log receiver uses
        entry_id -> BigInt,
        host_id -> BigInt,
    }
}

use self::matched_messages as mm;

/// Postgres allows at most 65535 bind parameters per statement, and each
/// row we insert takes 3
const INSERT_CHUNK_SIZE: usize = 10_000;

#[derive(Clone)]
pub struct PostgresMatchStore {
    logger: Logger,
    pool: ConnectionPool,
}

impl PostgresMatchStore {
    pub fn new(logger: &Logger, pool: ConnectionPool) -> Self {
        PostgresMatchStore {
            logger: logger.new(o!("component" => "PostgresMatchStore")),
            pool,
        }
    }
}

impl MatchStore for PostgresMatchStore {
    fn insert_matches(
        &self,
        subscription: SubscriptionId,
        matches: &[(MessageId, HostId)],
    ) -> Result<usize, StoreError> {
        if matches.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get()?;
        conn.transaction(|conn| {
            let mut count = 0;
            for chunk in matches.chunks(INSERT_CHUNK_SIZE) {
                let rows: Vec<_> = chunk
                    .iter()
                    .map(|(message_id, host_id)| {
                        (
                            mm::subscription_id.eq(subscription.as_i64()),
                            mm::entry_id.eq(message_id.as_i64()),
                            mm::host_id.eq(host_id.as_i64()),
                        )
                    })
                    .collect();
                count += insert_into(mm::table).values(rows).execute(conn)?;
            }
            Ok(count)
        })
    }

    fn stream_matches(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Box<dyn MatchCursor>, StoreError> {
        trace!(self.logger, "Opening match cursor"; "subscription" => subscription);
        Ok(Box::new(KeysetCursor {
            pool: self.pool.clone(),
            subscription,
            position: None,
            exhausted: false,
        }))
    }

    fn delete_matches(&self, ids: &[MatchId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = ids.iter().map(MatchId::as_i64).collect();
        let mut conn = self.pool.get()?;
        let count = delete(mm::table.filter(mm::match_id.eq_any(ids))).execute(&mut conn)?;
        Ok(count)
    }

    fn count_matches(&self, subscription: SubscriptionId) -> Result<usize, StoreError> {
        let mut conn = self.pool.get()?;
        let count: i64 = mm::table
            .filter(mm::subscription_id.eq(subscription.as_i64()))
            .count()
            .get_result(&mut conn)?;
        usize::try_from(count).map_err(|_| internal_error!("invalid match count {}", count))
    }
}

/// A cursor over the matches of one subscription that pages through them
/// by match id
struct KeysetCursor {
    pool: ConnectionPool,
    subscription: SubscriptionId,
    /// The largest match id returned so far
    position: Option<MatchId>,
    /// Set once a fetch came back short; after that, we do not query again
    exhausted: bool,
}

impl MatchCursor for KeysetCursor {
    fn next_batch(&mut self, max_batch_size: usize) -> Result<Vec<MatchPointer>, StoreError> {
        if self.exhausted || max_batch_size == 0 {
            return Ok(vec![]);
        }

        let last = self.position.map(|id| id.as_i64()).unwrap_or(i64::MIN);
        let limit = i64::try_from(max_batch_size).unwrap_or(i64::MAX);

        let mut conn = self.pool.get()?;
        let rows = mm::table
            .select((mm::match_id, mm::entry_id, mm::host_id))
            .filter(mm::subscription_id.eq(self.subscription.as_i64()))
            .filter(mm::match_id.gt(last))
            .order(mm::match_id)
            .limit(limit)
            .load::<(i64, i64, i64)>(&mut conn)?;

        if rows.len() < max_batch_size {
            self.exhausted = true;
        }

        let subscription_id = self.subscription;
        let batch: Vec<_> = rows
            .into_iter()
            .map(|(match_id, message_id, host_id)| MatchPointer {
                match_id: MatchId(match_id),
                subscription_id,
                message_id: MessageId(message_id),
                host_id: HostId(host_id),
            })
            .collect();
        if let Some(ptr) = batch.last() {
            self.position = Some(ptr.match_id);
        }
        Ok(batch)
    }
}
