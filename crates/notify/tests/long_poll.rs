//! Integration tests for the long-poll gateway.
//!
//! Tests exercise the public registry and dispatcher API with short real
//! timeouts.

use chrono::Utc;
use node_notify::{
    EventCategory::{self, *},
    FiredEvent, GatewayConfig, GatewayError, Registration, RegistrationRequest, SessionRegistry,
    SessionToken, Unregister, WaitOutcome,
};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn req(category: EventCategory, subject_id: u64) -> RegistrationRequest {
    Registration::new(category, subject_id).into()
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(GatewayConfig::default())
}

fn registry_with(pending_per_category: usize) -> SessionRegistry {
    SessionRegistry::new(GatewayConfig::default().with_pending_per_category(pending_per_category))
}

/// Poll until the session has an outstanding wait.
///
/// Panics if it does not start waiting within a second.
async fn until_waiting(registry: &SessionRegistry, token: &str) {
    for _ in 0..200 {
        if registry.is_waiting(token) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {token} never started waiting");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_before_wait_returns_immediately() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(TransactionConfirmed, 42)]).unwrap();

    let t1 = Utc::now();
    assert_eq!(dispatcher.publish(&FiredEvent::single(TransactionConfirmed, 42, t1)), 1);

    let start = Instant::now();
    let result = registry.wait("abc", 5_000).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].category, TransactionConfirmed);
    assert_eq!(result.events[0].subject_id, 42);
    assert_eq!(result.events[0].occurred_at, t1);
    assert!(!result.coalesced);
    assert_eq!(result.outcome, WaitOutcome::Delivered);
}

#[tokio::test]
async fn wait_without_register_is_unknown_session() {
    let registry = registry();
    let err = registry.wait("xyz", 1_000).await.unwrap_err();
    assert_eq!(err, GatewayError::UnknownSession(SessionToken::from("xyz")));
}

#[tokio::test]
async fn wait_after_unregister_all_is_unknown_session() {
    let registry = registry();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();
    registry.unregister("abc", Unregister::All).unwrap();

    // the session survives, but holds nothing to wait on
    assert!(registry.contains_session("abc"));
    assert!(matches!(
        registry.wait("abc", 1_000).await,
        Err(GatewayError::UnknownSession(_))
    ));

    // and can register again
    assert_eq!(registry.register("abc", [req(BlockPopped, 0)]).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_wait_is_rejected_and_first_completes() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(TransactionConfirmed, 42)]).unwrap();

    let first = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait("abc", 5_000).await }
    });
    until_waiting(&registry, "abc").await;

    let err = registry.wait("abc", 5_000).await.unwrap_err();
    assert_eq!(err, GatewayError::WaitAlreadyInProgress("abc".into()));
    assert!(registry.is_waiting("abc"));

    dispatcher.publish_now(TransactionConfirmed, 42);
    let result = first.await.unwrap().unwrap();
    assert_eq!(result.subjects_for(TransactionConfirmed), vec![42]);
    assert!(!registry.is_waiting("abc"));
}

#[tokio::test]
async fn reaped_session_is_unknown() {
    let registry = registry();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();
    assert_eq!(registry.interest_count(BlockPushed), 1);

    // nothing has been idle for a minute yet
    assert_eq!(registry.reap_idle(Duration::from_secs(60)), 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.reap_idle(Duration::from_millis(10)), 1);

    assert!(!registry.contains_session("abc"));
    assert_eq!(registry.interest_count(BlockPushed), 0);
    assert!(matches!(
        registry.wait("abc", 1_000).await,
        Err(GatewayError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn background_reaper_expires_idle_sessions() {
    let registry = SessionRegistry::new(
        GatewayConfig::default()
            .with_idle_timeout(Duration::from_millis(50))
            .with_reap_interval(Duration::from_millis(10)),
    );
    registry.register("idle", [req(PeerAdded, 0)]).unwrap();
    assert_eq!(registry.session_count(), 1);

    for _ in 0..100 {
        if registry.session_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("reaper did not expire the idle session");
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_registration_is_idempotent() {
    let registry = registry();
    let first = registry.register("abc", [req(TransactionConfirmed, 42)]).unwrap();
    let second = registry
        .register("abc", [req(TransactionConfirmed, 42), req(TransactionConfirmed, 42)])
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(second.len(), 1);
}

#[tokio::test]
async fn register_then_unregister_round_trips() {
    let registry = registry();
    let before = registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    let entries = vec![req(TransactionConfirmed, 1), req(LedgerEntryAdded, 0)];
    let during = registry.register("abc", entries.clone()).unwrap();
    assert_eq!(during.len(), 3);
    assert_eq!(registry.interest_count(LedgerEntryAdded), 1);

    let after = registry.unregister("abc", entries).unwrap();
    assert_eq!(after, before);
    assert_eq!(registry.interest_count(LedgerEntryAdded), 0);
    assert_eq!(registry.interest_count(TransactionConfirmed), 0);
    assert_eq!(registry.interest_count(BlockPushed), 1);
}

#[tokio::test]
async fn unregister_unknown_session() {
    let registry = registry();
    assert!(matches!(
        registry.unregister("nobody", Unregister::All),
        Err(GatewayError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn invalid_entries_register_nothing() {
    let registry = registry();

    let err = registry
        .register("abc", [req(BlockPushed, 0), RegistrationRequest::new("Block.BLOCK_EATEN", 0)])
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnknownEventCategory(_)));
    assert!(!registry.contains_session("abc"));

    let err = registry.register("abc", [req(BlockPushed, 7)]).unwrap_err();
    assert_eq!(err, GatewayError::SubjectNotSupported { category: BlockPushed, subject_id: 7 });
    assert!(!registry.contains_session("abc"));
}

#[tokio::test]
async fn events_before_registration_are_not_delivered() {
    let registry = registry();
    let dispatcher = registry.dispatcher();

    dispatcher.publish_now(BlockPushed, 1);
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    let result = registry.wait("abc", 50).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.outcome, WaitOutcome::TimedOut);
}

// ---------------------------------------------------------------------------
// Matching and delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exact_and_wildcard_match_others_do_not() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("exact", [req(TransactionConfirmed, 42)]).unwrap();
    registry.register("any", [req(TransactionConfirmed, 0)]).unwrap();
    registry.register("other", [req(TransactionConfirmed, 43)]).unwrap();
    registry.register("both", [req(TransactionConfirmed, 42), req(TransactionConfirmed, 0)]).unwrap();

    assert_eq!(dispatcher.publish_now(TransactionConfirmed, 42), 3);

    for token in ["exact", "any", "both"] {
        let result = registry.wait(token, 0).await.unwrap();
        assert_eq!(result.subjects_for(TransactionConfirmed), vec![42], "session {token}");
    }
    let result = registry.wait("other", 0).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.outcome, WaitOutcome::TimedOut);
}

#[tokio::test]
async fn delivery_wakes_a_suspended_wait() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(LedgerEntryAdded, 7)]).unwrap();

    let waiting = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait("abc", 5_000).await }
    });
    until_waiting(&registry, "abc").await;

    let start = Instant::now();
    dispatcher.publish_now(LedgerEntryAdded, 8);
    dispatcher.publish_now(LedgerEntryAdded, 7);
    let result = waiting.await.unwrap().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(result.subjects_for(LedgerEntryAdded), vec![7]);

    // delivered events are out of circulation
    let again = registry.wait("abc", 20).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn batch_is_delivered_together_in_order() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(TransactionConfirmed, 9), req(TransactionConfirmed, 5)]).unwrap();

    let at = Utc::now();
    dispatcher.publish_batch(TransactionConfirmed, [1, 5, 7, 9], at);

    let result = registry.wait("abc", 0).await.unwrap();
    assert_eq!(result.subjects_for(TransactionConfirmed), vec![5, 9]);
    assert!(result.events.iter().all(|e| e.occurred_at == at));
}

#[tokio::test]
async fn buffered_events_keep_publish_order() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(BlockPushed, 0), req(BlockPopped, 0), req(PeerAdded, 0)]).unwrap();

    dispatcher.publish_now(BlockPushed, 1);
    dispatcher.publish_now(PeerAdded, 2);
    dispatcher.publish_now(BlockPopped, 3);
    dispatcher.publish_now(BlockPushed, 4);

    let result = registry.wait("abc", 0).await.unwrap();
    let order: Vec<_> = result.events.iter().map(|e| (e.category, e.subject_id)).collect();
    assert_eq!(order, vec![(BlockPushed, 1), (PeerAdded, 2), (BlockPopped, 3), (BlockPushed, 4)]);
}

#[tokio::test]
async fn overflow_drops_oldest_and_flags_coalesced() {
    const N: usize = 5;
    let registry = registry_with(N);
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    for height in 1..=(N as u64 + 1) {
        dispatcher.publish_now(BlockPushed, height);
    }

    let result = registry.wait("abc", 0).await.unwrap();
    assert!(result.coalesced);
    assert_eq!(result.subjects_for(BlockPushed), (2..=N as u64 + 1).collect::<Vec<_>>());

    // the flag is reported once
    dispatcher.publish_now(BlockPushed, 100);
    let result = registry.wait("abc", 0).await.unwrap();
    assert!(!result.coalesced);
    assert_eq!(result.subjects_for(BlockPushed), vec![100]);
}

// ---------------------------------------------------------------------------
// Timeouts and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeout_returns_empty_after_deadline() {
    let registry = registry();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    let start = Instant::now();
    let result = registry.wait("abc", 100).await.unwrap();
    let elapsed = start.elapsed();

    assert!(result.is_empty());
    assert!(!result.coalesced);
    assert_eq!(result.outcome, WaitOutcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(100), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_100), "returned late: {elapsed:?}");

    // the slot is free again
    assert!(!registry.is_waiting("abc"));
}

#[tokio::test]
async fn requested_timeout_is_clamped() {
    let registry =
        SessionRegistry::new(GatewayConfig::default().with_max_wait(Duration::from_millis(50)));
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    let start = Instant::now();
    let result = registry.wait("abc", 60 * 60 * 1_000).await.unwrap();
    assert_eq!(result.outcome, WaitOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_token_resolves_wait() {
    let registry = registry();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();
    let cancel = CancellationToken::new();

    let waiting = tokio::spawn({
        let registry = registry.clone();
        let cancel = cancel.clone();
        async move { registry.wait_with_cancel("abc", 5_000, &cancel).await }
    });
    until_waiting(&registry, "abc").await;

    let start = Instant::now();
    cancel.cancel();
    let result = waiting.await.unwrap().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(result.is_empty());
    assert_eq!(result.outcome, WaitOutcome::Cancelled);

    // a new wait is legal immediately
    assert!(!registry.is_waiting("abc"));
    assert_eq!(registry.wait("abc", 0).await.unwrap().outcome, WaitOutcome::TimedOut);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transport_cancel_wait() {
    let registry = registry();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();
    assert!(!registry.cancel_wait("abc"));

    let waiting = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait("abc", 5_000).await }
    });
    until_waiting(&registry, "abc").await;

    assert!(registry.cancel_wait("abc"));
    let result = waiting.await.unwrap().unwrap();
    assert_eq!(result.outcome, WaitOutcome::Cancelled);
    assert!(result.is_empty());
    // registrations survive a cancelled wait
    assert_eq!(registry.registrations("abc").unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_wait_does_not_block_the_next() {
    let registry = registry();
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    let waiting = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait("abc", 5_000).await }
    });
    until_waiting(&registry, "abc").await;
    waiting.abort();
    let _ = waiting.await;

    // an event published into the abandoned slot is kept for the next wait
    dispatcher.publish_now(BlockPushed, 11);
    let result = registry.wait("abc", 1_000).await.unwrap();
    assert_eq!(result.subjects_for(BlockPushed), vec![11]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expiry_resolves_an_active_wait() {
    let registry = registry();
    registry.register("abc", [req(TransactionArrived, 3)]).unwrap();

    let waiting = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait("abc", 5_000).await }
    });
    until_waiting(&registry, "abc").await;

    assert_eq!(registry.reap_idle(Duration::ZERO), 1);
    let result = waiting.await.unwrap().unwrap();
    assert!(result.is_empty());
    assert_eq!(result.outcome, WaitOutcome::Expired);
    assert!(!registry.contains_session("abc"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_tears_down_session() {
    let registry = registry();
    registry.register("abc", [req(PeerStateChanged, 0)]).unwrap();

    let waiting = tokio::spawn({
        let registry = registry.clone();
        async move { registry.wait("abc", 5_000).await }
    });
    until_waiting(&registry, "abc").await;

    assert!(registry.close("abc"));
    assert!(!registry.close("abc"));
    assert_eq!(waiting.await.unwrap().unwrap().outcome, WaitOutcome::Expired);
    assert_eq!(registry.interest_count(PeerStateChanged), 0);
    assert!(registry.registrations("abc").is_none());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_wait_per_session_under_contention() {
    const CALLERS: usize = 32;
    let registry = registry();
    registry.register("abc", [req(BlockPushed, 0)]).unwrap();

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait("abc", 1_000).await })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for result in futures_util::future::join_all(handles).await {
        match result.unwrap() {
            Ok(result) => {
                assert_eq!(result.outcome, WaitOutcome::TimedOut);
                accepted += 1;
            }
            Err(GatewayError::WaitAlreadyInProgress(_)) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(rejected, CALLERS - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publish_and_wait_lose_nothing() {
    const EVENTS: u64 = 500;
    let registry = registry_with(EVENTS as usize);
    let dispatcher = registry.dispatcher();
    registry.register("abc", [req(TransactionConfirmed, 0)]).unwrap();

    let publisher = tokio::task::spawn_blocking(move || {
        for id in 1..=EVENTS {
            dispatcher.publish_now(TransactionConfirmed, id);
        }
    });

    let mut seen = Vec::new();
    while seen.len() < EVENTS as usize {
        let result = registry.wait("abc", 2_000).await.unwrap();
        assert!(!result.coalesced);
        assert_ne!(result.outcome, WaitOutcome::TimedOut, "events went missing");
        seen.extend(result.subjects_for(TransactionConfirmed));
    }
    publisher.await.unwrap();

    // every event exactly once, in publish order
    assert_eq!(seen, (1..=EVENTS).collect::<Vec<_>>());
}
