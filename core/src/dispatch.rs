use logreceiver::prelude::*;

use crate::visitation::{VisitOptions, VisitationError, VisitationSession, VisitationStats};

/// Entry point for visiting matches. The dispatcher is cheap to clone and
/// can be shared between threads; every call to one of the `visit`
/// methods runs an independent session. Sessions for different
/// subscriptions work on disjoint sets of matches and can run
/// concurrently.
#[derive(Clone)]
pub struct MatchDispatcher {
    logger: Logger,
    store: Arc<dyn MatchStore>,
    resolver: Arc<dyn HostResolver>,
    options: VisitOptions,
}

impl MatchDispatcher {
    pub fn new(logger: &Logger, store: Arc<dyn MatchStore>, resolver: Arc<dyn HostResolver>) -> Self {
        MatchDispatcher {
            logger: logger.new(o!("component" => "MatchDispatcher")),
            store,
            resolver,
            options: VisitOptions::from_env(),
        }
    }

    pub fn with_options(self, options: VisitOptions) -> Self {
        MatchDispatcher { options, ..self }
    }

    pub fn options(&self) -> VisitOptions {
        self.options
    }

    /// Record matches for `subscription`; this is how the classifier hands
    /// its results to us
    pub fn insert_matches(
        &self,
        subscription: SubscriptionId,
        matches: &[(MessageId, HostId)],
    ) -> Result<usize, StoreError> {
        if matches.is_empty() {
            return Ok(0);
        }
        let count = self.store.insert_matches(subscription, matches)?;
        debug!(self.logger, "Stored matches";
            "subscription" => subscription,
            "count" => count);
        Ok(count)
    }

    /// The number of matches for `subscription` waiting to be visited
    pub fn pending(&self, subscription: SubscriptionId) -> Result<usize, StoreError> {
        self.store.count_matches(subscription)
    }

    /// Visit the matches of `subscription` with the configured options
    pub fn visit(
        &self,
        subscription: SubscriptionId,
        visitor: &mut dyn MessageVisitor,
    ) -> Result<VisitationStats, VisitationError> {
        self.visit_with_options(subscription, visitor, self.options)
    }

    /// Visit the matches of `subscription`, reading and deleting at most
    /// `max_batch_size` of them at a time
    pub fn visit_with_batch_size(
        &self,
        subscription: SubscriptionId,
        visitor: &mut dyn MessageVisitor,
        max_batch_size: usize,
    ) -> Result<VisitationStats, VisitationError> {
        self.visit_with_options(
            subscription,
            visitor,
            self.options.with_batch_size(max_batch_size),
        )
    }

    /// Visit the matches of `subscription`, using its own batch size if it
    /// has one. Disabled subscriptions are skipped without touching the
    /// visitor
    pub fn visit_subscription(
        &self,
        subscription: &Subscription,
        visitor: &mut dyn MessageVisitor,
    ) -> Result<VisitationStats, VisitationError> {
        if !subscription.enabled {
            debug!(self.logger, "Skipping disabled subscription";
                "subscription" => subscription.id,
                "name" => subscription.name.as_str());
            return Ok(VisitationStats::default());
        }
        let max_batch_size = subscription
            .max_batch_size
            .unwrap_or(self.options.max_batch_size);
        self.visit_with_batch_size(subscription.id, visitor, max_batch_size)
    }

    fn visit_with_options(
        &self,
        subscription: SubscriptionId,
        visitor: &mut dyn MessageVisitor,
        options: VisitOptions,
    ) -> Result<VisitationStats, VisitationError> {
        VisitationSession::new(
            &self.logger,
            self.store.as_ref(),
            self.resolver.as_ref(),
            subscription,
            options,
        )
        .run(visitor)
    }
}
