use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use logreceiver::log;
use logreceiver::prelude::{
    HostId, HostResolver, MatchId, MatchStore, MessageId, Subscription, SubscriptionId,
    UnresolvedHostPolicy,
};
use logreceiver_core::{
    HostResolutionGap, MatchDispatcher, VisitOptions, VisitationError, VisitationStats,
};
use logreceiver_mock::{InMemoryMatchStore, MockHostResolver, RecordingVisitor, VisitorEvent};
use pretty_assertions::assert_eq;

const SUB: i64 = 1;

fn options(max_batch_size: usize) -> VisitOptions {
    VisitOptions {
        max_batch_size,
        unresolved_hosts: UnresolvedHostPolicy::Discard,
    }
}

fn dispatcher(
    store: &InMemoryMatchStore,
    resolver: &Arc<MockHostResolver>,
    max_batch_size: usize,
) -> MatchDispatcher {
    let store: Arc<dyn MatchStore> = Arc::new(store.clone());
    let resolver: Arc<dyn HostResolver> = resolver.clone();
    MatchDispatcher::new(&log::discard(), store, resolver).with_options(options(max_batch_size))
}

fn match_ids(ids: &[i64]) -> Vec<MatchId> {
    ids.iter().map(|id| MatchId(*id)).collect()
}

#[test]
fn delivers_every_match_once_in_order() {
    let store = InMemoryMatchStore::new();
    store.with_matches(
        SUB,
        &[(11, 1), (12, 1), (13, 2), (14, 2), (15, 2), (16, 1), (17, 3)],
    );
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1, 2, 3]));
    let mut visitor = RecordingVisitor::new();

    let stats = dispatcher(&store, &resolver, 3)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![
            VisitorEvent::Begin,
            VisitorEvent::visit(1, &[11, 12]),
            VisitorEvent::visit(2, &[13]),
            VisitorEvent::visit(2, &[14, 15]),
            VisitorEvent::visit(1, &[16]),
            VisitorEvent::visit(3, &[17]),
            VisitorEvent::Close(true),
        ],
        visitor.events
    );
    assert_eq!(
        VisitationStats {
            batches: 3,
            runs: 5,
            messages: 7,
            deleted: 7,
            retained: 0,
            gaps: vec![],
        },
        stats
    );
    assert_eq!(
        vec![match_ids(&[1, 2, 3]), match_ids(&[4, 5, 6]), match_ids(&[7])],
        store.deletes()
    );
    assert!(store.pending(SUB).is_empty());
    assert_eq!(0, store.open_cursors());
}

#[test]
fn batch_boundary_splits_runs() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 1), (3, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    dispatcher(&store, &resolver, 2)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![VisitorEvent::visit(1, &[1, 2]), VisitorEvent::visit(1, &[3])],
        visitor.visits()
    );
}

#[test]
fn interleaved_hosts_are_not_merged() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 2), (3, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1, 2]));
    let mut visitor = RecordingVisitor::new();

    let stats = dispatcher(&store, &resolver, 3)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![
            VisitorEvent::visit(1, &[1]),
            VisitorEvent::visit(2, &[2]),
            VisitorEvent::visit(1, &[3]),
        ],
        visitor.visits()
    );
    assert_eq!(1, stats.batches);
    assert_eq!(3, stats.runs);
}

#[test]
fn unresolved_host_is_skipped_but_deleted() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 9)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    let stats = dispatcher(&store, &resolver, 10)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![VisitorEvent::Begin, VisitorEvent::Close(true)],
        visitor.events
    );
    assert!(store.pending(SUB).is_empty());
    assert_eq!(1, stats.deleted);
    assert_eq!(
        vec![HostResolutionGap {
            host: HostId(9),
            matches: 1
        }],
        stats.gaps
    );
}

#[test]
fn unresolved_host_between_resolved_runs() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 9), (3, 9), (4, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    dispatcher(&store, &resolver, 10)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![VisitorEvent::visit(1, &[1]), VisitorEvent::visit(1, &[4])],
        visitor.visits()
    );
    assert_eq!(vec![match_ids(&[1, 2, 3, 4])], store.deletes());
}

#[test]
fn retain_policy_keeps_unresolved_matches() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 9), (3, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let dispatcher = dispatcher(&store, &resolver, 10)
        .with_options(options(10).with_unresolved_hosts(UnresolvedHostPolicy::Retain));

    let mut visitor = RecordingVisitor::new();
    let stats = dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![VisitorEvent::visit(1, &[1]), VisitorEvent::visit(1, &[3])],
        visitor.visits()
    );
    assert_eq!(vec![2], store.pending_messages(SUB));
    assert_eq!(2, stats.deleted);
    assert_eq!(1, stats.retained);

    // A second pass finds the retained match again and still cannot
    // deliver it
    let mut visitor = RecordingVisitor::new();
    let stats = dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();
    assert!(visitor.visits().is_empty());
    assert_eq!(vec![2], store.pending_messages(SUB));
    assert_eq!(0, stats.deleted);
    assert_eq!(1, stats.retained);
}

#[test]
fn empty_subscription_begins_and_closes() {
    let store = InMemoryMatchStore::new();
    store.with_matches(2, &[(1, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    let stats = dispatcher(&store, &resolver, 10)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![VisitorEvent::Begin, VisitorEvent::Close(true)],
        visitor.events
    );
    assert_eq!(VisitationStats::default(), stats);
    assert!(store.deletes().is_empty());
    assert!(resolver.lookups().is_empty());
    assert_eq!(vec![1], store.pending_messages(2));
}

#[test]
fn visitor_failure_keeps_the_failed_batch() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let dispatcher = dispatcher(&store, &resolver, 2);

    let mut visitor = RecordingVisitor::failing_visit_at(2);
    let err = dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap_err();

    assert!(matches!(err, VisitationError::Visitor(_)), "{}", err);
    assert_eq!(
        vec![
            VisitorEvent::Begin,
            VisitorEvent::visit(1, &[1, 2]),
            VisitorEvent::Close(false),
        ],
        visitor.events
    );
    assert_eq!(vec![match_ids(&[1, 2])], store.deletes());
    assert_eq!(vec![3, 4, 5, 6], store.pending_messages(SUB));
    assert_eq!(0, store.open_cursors());

    // Running again picks up where the failed visitation stopped
    let mut visitor = RecordingVisitor::new();
    dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();
    assert_eq!(vec![3, 4, 5, 6], visitor.messages());
    assert!(store.pending(SUB).is_empty());
}

#[test]
fn delete_failure_redelivers_only_the_last_batch() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1)]);
    store.fail_delete_at(2);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let dispatcher = dispatcher(&store, &resolver, 2);

    let mut visitor = RecordingVisitor::new();
    let err = dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap_err();

    assert!(matches!(err, VisitationError::Store(_)), "{}", err);
    assert_eq!(vec![1, 2, 3, 4], visitor.messages());
    assert_eq!(Some(&VisitorEvent::Close(false)), visitor.events.last());
    assert_eq!(vec![3, 4, 5, 6], store.pending_messages(SUB));

    // Batch 2 was delivered but not deleted, so it is delivered again;
    // batch 1 is not
    let mut visitor = RecordingVisitor::new();
    dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();
    assert_eq!(vec![3, 4, 5, 6], visitor.messages());
    assert!(store.pending(SUB).is_empty());
}

#[test]
fn fetch_failure_closes_visitor_and_cursor() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 1), (3, 1)]);
    store.fail_fetch_at(2);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    let err = dispatcher(&store, &resolver, 2)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap_err();

    assert!(matches!(err, VisitationError::Store(_)), "{}", err);
    assert_eq!(
        vec![
            VisitorEvent::Begin,
            VisitorEvent::visit(1, &[1, 2]),
            VisitorEvent::Close(false),
        ],
        visitor.events
    );
    assert_eq!(vec![3], store.pending_messages(SUB));
    assert_eq!(0, store.open_cursors());
}

#[test]
fn resolver_failure_aborts_before_delivery() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1)]);
    let resolver = Arc::new(MockHostResolver::failing());
    let mut visitor = RecordingVisitor::new();

    let err = dispatcher(&store, &resolver, 10)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap_err();

    assert!(matches!(err, VisitationError::Store(_)), "{}", err);
    assert_eq!(
        vec![VisitorEvent::Begin, VisitorEvent::Close(false)],
        visitor.events
    );
    assert_eq!(vec![1], store.pending_messages(SUB));
}

#[test]
fn hosts_are_looked_up_once_per_session() {
    let store = InMemoryMatchStore::new();
    store.with_matches(
        SUB,
        &[(1, 1), (2, 2), (3, 2), (4, 1), (5, 3), (6, 3), (7, 1)],
    );
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1, 2]));
    let dispatcher = dispatcher(&store, &resolver, 2);

    let mut visitor = RecordingVisitor::new();
    dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    let lookups: Vec<Vec<i64>> = resolver
        .lookups()
        .iter()
        .map(|ids| ids.iter().map(|id| id.0).collect())
        .collect();
    assert_eq!(vec![vec![1, 2], vec![3]], lookups);
    assert_eq!(vec![1, 2, 3, 4, 7], visitor.messages());

    // A new session starts with an empty cache
    store.with_matches(SUB, &[(8, 1)]);
    let mut visitor = RecordingVisitor::new();
    dispatcher
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();
    assert_eq!(3, resolver.lookups().len());
}

#[test]
fn zero_batch_size_is_rejected() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    let err = dispatcher(&store, &resolver, 10)
        .visit_with_batch_size(SubscriptionId(SUB), &mut visitor, 0)
        .unwrap_err();

    assert!(matches!(err, VisitationError::InvalidBatchSize(0)), "{}", err);
    assert!(visitor.events.is_empty());
    assert_eq!(0, store.fetches());
}

#[test]
fn failed_begin_does_not_close() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::failing_begin();

    let err = dispatcher(&store, &resolver, 10)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap_err();

    assert!(matches!(err, VisitationError::Visitor(_)), "{}", err);
    assert!(visitor.events.is_empty());
    assert_eq!(0, store.fetches());
    assert_eq!(vec![1], store.pending_messages(SUB));
}

#[test]
fn failed_close_fails_the_visitation() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::failing_close();

    let err = dispatcher(&store, &resolver, 10)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap_err();

    assert!(matches!(err, VisitationError::Visitor(_)), "{}", err);
    assert_eq!(Some(&VisitorEvent::Close(true)), visitor.events.last());
    // The matches were delivered and deleted before closing
    assert!(store.pending(SUB).is_empty());
}

#[test]
fn panicking_visitor_is_closed() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 2)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1, 2]));
    let dispatcher = dispatcher(&store, &resolver, 10);
    let mut visitor = RecordingVisitor::panicking_visit_at(2);

    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        dispatcher.visit(SubscriptionId(SUB), &mut visitor)
    }));

    assert!(res.is_err());
    assert_eq!(
        vec![
            VisitorEvent::Begin,
            VisitorEvent::visit(1, &[1]),
            VisitorEvent::Close(false),
        ],
        visitor.events
    );
    assert_eq!(0, store.open_cursors());
    assert_eq!(vec![1, 2], store.pending_messages(SUB));
}

#[test]
fn subscription_settings_are_honored() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 1), (3, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let dispatcher = dispatcher(&store, &resolver, 10);

    let mut subscription = Subscription::new(SubscriptionId(SUB), "errors");
    subscription.enabled = false;
    let mut visitor = RecordingVisitor::new();
    let stats = dispatcher
        .visit_subscription(&subscription, &mut visitor)
        .unwrap();
    assert_eq!(VisitationStats::default(), stats);
    assert!(visitor.events.is_empty());
    assert_eq!(3, dispatcher.pending(SubscriptionId(SUB)).unwrap());

    subscription.enabled = true;
    subscription.max_batch_size = Some(2);
    let mut visitor = RecordingVisitor::new();
    let stats = dispatcher
        .visit_subscription(&subscription, &mut visitor)
        .unwrap();
    assert_eq!(2, stats.batches);
    assert_eq!(
        vec![match_ids(&[1, 2]), match_ids(&[3])],
        store.deletes()
    );
}

#[test]
fn subscriptions_are_visited_independently() {
    let store = InMemoryMatchStore::new();
    for i in 0..20 {
        store.with_matches(1 + i % 2, &[(i, 1 + i % 3)]);
    }
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1, 2, 3]));
    let dispatcher = dispatcher(&store, &resolver, 3);

    let (first, second) = std::thread::scope(|s| {
        let visit = |sub: i64| {
            let dispatcher = dispatcher.clone();
            s.spawn(move || {
                let mut visitor = RecordingVisitor::new();
                dispatcher
                    .visit(SubscriptionId(sub), &mut visitor)
                    .unwrap();
                visitor.messages()
            })
        };
        let first = visit(1);
        let second = visit(2);
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!((0..20).step_by(2).collect::<Vec<_>>(), first);
    assert_eq!((1..20).step_by(2).collect::<Vec<_>>(), second);
    assert!(store.pending(1).is_empty());
    assert!(store.pending(2).is_empty());
}

#[test]
fn insert_matches_assigns_increasing_ids() {
    let store = InMemoryMatchStore::new();
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let dispatcher = dispatcher(&store, &resolver, 10);

    assert_eq!(0, dispatcher.insert_matches(SubscriptionId(SUB), &[]).unwrap());
    let count = dispatcher
        .insert_matches(
            SubscriptionId(SUB),
            &[(MessageId(5), HostId(1)), (MessageId(3), HostId(1))],
        )
        .unwrap();
    assert_eq!(2, count);

    let pending = store.pending(SUB);
    assert_eq!(match_ids(&[1, 2]), pending.iter().map(|p| p.match_id).collect::<Vec<_>>());
    assert_eq!(vec![5, 3], store.pending_messages(SUB));
}

#[test]
fn exactly_full_batches_end_with_an_empty_fetch() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 1), (2, 1), (3, 2), (4, 2)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1, 2]));
    let mut visitor = RecordingVisitor::new();

    dispatcher(&store, &resolver, 2)
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(
        vec![VisitorEvent::visit(1, &[1, 2]), VisitorEvent::visit(2, &[3, 4])],
        visitor.visits()
    );
    assert_eq!(3, store.fetches());
}

#[test]
fn retained_batch_does_not_stop_the_visitation() {
    let store = InMemoryMatchStore::new();
    store.with_matches(SUB, &[(1, 9), (2, 9), (3, 1)]);
    let resolver = Arc::new(MockHostResolver::with_hosts(&[1]));
    let mut visitor = RecordingVisitor::new();

    let stats = dispatcher(&store, &resolver, 2)
        .with_options(options(2).with_unresolved_hosts(UnresolvedHostPolicy::Retain))
        .visit(SubscriptionId(SUB), &mut visitor)
        .unwrap();

    assert_eq!(vec![VisitorEvent::visit(1, &[3])], visitor.visits());
    assert_eq!(vec![1, 2], store.pending_messages(SUB));
    assert_eq!(2, stats.retained);
    assert_eq!(vec![match_ids(&[3])], store.deletes());
}
