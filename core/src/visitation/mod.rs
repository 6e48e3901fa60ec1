//! Visiting the matches of a subscription. The matches are read from the
//! `MatchStore` in batches so that we never hold more than one batch in
//! memory. Each batch is split into runs of consecutive matches for the
//! same host, every run is handed to the visitor, and then the matches of
//! the batch are deleted before the next batch is read.
//!
//! Runs never span batches: if the matches of one host straddle a batch
//! boundary, the visitor sees two runs for that host. Runs are also never
//! merged within a batch, so matches for host A, B, A produce three runs.
//!
//! A batch is only deleted after all of its runs have been delivered. If
//! the visitor or the store fails in the middle of a batch, that batch
//! stays in the store and the next visitation delivers it again; earlier
//! batches are gone for good. Delivery is therefore at-least-once, and
//! at most one batch is ever delivered twice.

mod guard;
mod hosts;

use std::time::Instant;

use logreceiver::prelude::*;
use thiserror::Error;

use self::guard::VisitorGuard;
use self::hosts::HostCache;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisitOptions {
    /// The most matches to read, deliver and delete at once
    pub max_batch_size: usize,
    pub unresolved_hosts: UnresolvedHostPolicy,
}

impl VisitOptions {
    pub fn from_env() -> Self {
        VisitOptions {
            max_batch_size: ENV_VARS.visit_batch_size,
            unresolved_hosts: ENV_VARS.unresolved_hosts,
        }
    }

    pub fn with_batch_size(self, max_batch_size: usize) -> Self {
        VisitOptions {
            max_batch_size,
            ..self
        }
    }

    pub fn with_unresolved_hosts(self, unresolved_hosts: UnresolvedHostPolicy) -> Self {
        VisitOptions {
            unresolved_hosts,
            ..self
        }
    }
}

impl Default for VisitOptions {
    fn default() -> Self {
        Self::from_env()
    }
}

#[derive(Error, Debug)]
pub enum VisitationError {
    #[error("invalid batch size {0}: a batch must hold at least one match")]
    InvalidBatchSize(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("visitor failed: {0:#}")]
    Visitor(anyhow::Error),
}

impl VisitationError {
    /// Whether running the visitation again later might succeed without
    /// anybody intervening. Visitor errors are up to the visitor, and we
    /// can not tell
    pub fn is_transient(&self) -> bool {
        match self {
            VisitationError::Store(e) => e.is_transient(),
            VisitationError::InvalidBatchSize(_) | VisitationError::Visitor(_) => false,
        }
    }
}

/// Matches that could not be delivered because their host does not exist
/// anymore
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostResolutionGap {
    pub host: HostId,
    pub matches: usize,
}

/// What a successful visitation did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisitationStats {
    /// The number of non-empty batches read from the store
    pub batches: usize,
    /// The number of calls to `MessageVisitor::visit`
    pub runs: usize,
    /// The number of message ids handed to the visitor
    pub messages: usize,
    /// The number of matches deleted from the store
    pub deleted: usize,
    /// The number of matches left in the store because their host could
    /// not be resolved
    pub retained: usize,
    /// Hosts that could not be resolved, in the order in which they were
    /// first encountered
    pub gaps: Vec<HostResolutionGap>,
}

impl VisitationStats {
    fn record_gap(&mut self, host: HostId, matches: usize) {
        match self.gaps.iter_mut().find(|gap| gap.host == host) {
            Some(gap) => gap.matches += matches,
            None => self.gaps.push(HostResolutionGap { host, matches }),
        }
    }
}

/// One pass over the matches of one subscription. A session owns its host
/// cache; it is not shared with other sessions, and since hosts do not
/// change while a session runs, nothing is ever evicted from it.
pub struct VisitationSession<'a> {
    logger: Logger,
    store: &'a dyn MatchStore,
    hosts: HostCache<'a>,
    subscription: SubscriptionId,
    options: VisitOptions,
    stats: VisitationStats,
}

impl<'a> VisitationSession<'a> {
    pub fn new(
        logger: &Logger,
        store: &'a dyn MatchStore,
        resolver: &'a dyn HostResolver,
        subscription: SubscriptionId,
        options: VisitOptions,
    ) -> Self {
        let logger = logger.new(o!("subscription" => subscription));
        VisitationSession {
            hosts: HostCache::new(&logger, resolver),
            logger,
            store,
            subscription,
            options,
            stats: VisitationStats::default(),
        }
    }

    /// Deliver all matches of the subscription to `visitor` and remove
    /// them from the store.
    ///
    /// Once `visitor.begin()` has succeeded, `visitor.close()` is called
    /// exactly once, with `true` if and only if every batch was delivered
    /// and deleted. A failure to close the visitor after an otherwise
    /// successful visitation fails the visitation.
    pub fn run(
        mut self,
        visitor: &mut dyn MessageVisitor,
    ) -> Result<VisitationStats, VisitationError> {
        if self.options.max_batch_size == 0 {
            return Err(VisitationError::InvalidBatchSize(0));
        }

        let start = Instant::now();
        let mut guard =
            VisitorGuard::begin(&self.logger, visitor).map_err(VisitationError::Visitor)?;
        let res = self.visit_batches(guard.visitor());
        let closed = guard.close(res.is_ok());

        match (res, closed) {
            (Ok(()), Ok(())) => {
                info!(self.logger, "Visited matches";
                    "batches" => self.stats.batches,
                    "runs" => self.stats.runs,
                    "messages" => self.stats.messages,
                    "deleted" => self.stats.deleted,
                    "retained" => self.stats.retained,
                    "unresolved_hosts" => self.stats.gaps.len(),
                    "time_ms" => start.elapsed().as_millis());
                Ok(self.stats)
            }
            (Ok(()), Err(e)) => {
                error!(self.logger, "Failed to close visitor";
                    "error" => format!("{:#}", e));
                Err(VisitationError::Visitor(e.context("failed to close visitor")))
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    error!(self.logger, "Failed to close visitor after failed visitation";
                        "error" => format!("{:#}", close_err));
                }
                error!(self.logger, "Visitation failed";
                    "error" => e.to_string(),
                    "batches" => self.stats.batches,
                    "deleted" => self.stats.deleted);
                Err(e)
            }
        }
    }

    fn visit_batches(&mut self, visitor: &mut dyn MessageVisitor) -> Result<(), VisitationError> {
        // The cursor is dropped, and with that released, on every path out
        // of this function
        let mut cursor = self.store.stream_matches(self.subscription)?;
        loop {
            let start = Instant::now();
            let batch = cursor.next_batch(self.options.max_batch_size)?;
            if batch.is_empty() {
                return Ok(());
            }
            let fetched = start.elapsed();

            self.visit_batch(&batch, visitor)?;

            if ENV_VARS.log_batch_timing {
                info!(self.logger, "Batch timing";
                    "batch" => self.stats.batches,
                    "size" => batch.len(),
                    "fetch_ms" => fetched.as_millis(),
                    "total_ms" => start.elapsed().as_millis());
            }
        }
    }

    /// Deliver the runs of `batch` and then delete the batch
    fn visit_batch(
        &mut self,
        batch: &[MatchPointer],
        visitor: &mut dyn MessageVisitor,
    ) -> Result<(), VisitationError> {
        self.stats.batches += 1;
        self.hosts.resolve(batch.iter().map(|ptr| ptr.host_id))?;

        let mut done = Vec::with_capacity(batch.len());
        let mut message_ids = Vec::with_capacity(batch.len());
        for run in runs(batch) {
            let host_id = run[0].host_id;
            match self.hosts.get(host_id) {
                Some(host) => {
                    message_ids.clear();
                    message_ids.extend(run.iter().map(|ptr| ptr.message_id));
                    visitor
                        .visit(host, &message_ids)
                        .map_err(VisitationError::Visitor)?;
                    self.stats.runs += 1;
                    self.stats.messages += run.len();
                    done.extend(run.iter().map(|ptr| ptr.match_id));
                }
                None => {
                    self.stats.record_gap(host_id, run.len());
                    match self.options.unresolved_hosts {
                        UnresolvedHostPolicy::Discard => {
                            done.extend(run.iter().map(|ptr| ptr.match_id))
                        }
                        UnresolvedHostPolicy::Retain => self.stats.retained += run.len(),
                    }
                }
            }
        }

        if !done.is_empty() {
            let deleted = self.store.delete_matches(&done)?;
            if deleted != done.len() {
                // Someone else removed some of these matches while we
                // were delivering them
                warn!(self.logger, "Deleted fewer matches than were visited";
                    "expected" => done.len(),
                    "deleted" => deleted);
            }
            self.stats.deleted += deleted;
        }

        debug!(self.logger, "Visited batch";
            "batch" => self.stats.batches,
            "size" => batch.len(),
            "first_match" => batch[0].match_id,
            "last_match" => batch[batch.len() - 1].match_id,
            "deleted" => self.stats.deleted);
        Ok(())
    }
}

/// Split `batch` into maximal runs of consecutive matches that belong to
/// the same host
fn runs(batch: &[MatchPointer]) -> impl Iterator<Item = &[MatchPointer]> {
    batch.chunk_by(|a, b| a.host_id == b.host_id)
}
