//! Metrics to track
//!
//! - Counters:
//!   - Sessions created and expired
//!   - Waits started, and waits resolved by outcome
//!   - Events published, delivered, and dropped on buffer overflow
//! - Gauges:
//!   - Live sessions

use metrics::{Counter, Gauge, counter, describe_counter, describe_gauge, gauge};
use node_notify_types::WaitOutcome;
use std::sync::LazyLock;

const SESSIONS_CREATED: &str = "node.notify.sessions.created";
const SESSIONS_CREATED_HELP: &str = "Number of sessions created by a first registration";

const SESSIONS_EXPIRED: &str = "node.notify.sessions.expired";
const SESSIONS_EXPIRED_HELP: &str = "Number of sessions removed by the reaper or closed by the client";

const SESSIONS_LIVE: &str = "node.notify.sessions.live";
const SESSIONS_LIVE_HELP: &str = "Number of live sessions";

const WAITS_STARTED: &str = "node.notify.waits.started";
const WAITS_STARTED_HELP: &str = "Number of wait calls accepted";

const WAITS_RESOLVED: &str = "node.notify.waits.resolved";
const WAITS_RESOLVED_HELP: &str = "Number of wait calls resolved, labeled by outcome";

const EVENTS_PUBLISHED: &str = "node.notify.events.published";
const EVENTS_PUBLISHED_HELP: &str = "Number of fired events published to the dispatcher";

const EVENTS_DELIVERED: &str = "node.notify.events.delivered";
const EVENTS_DELIVERED_HELP: &str = "Number of matched events handed to wait calls";

const EVENTS_DROPPED: &str = "node.notify.events.dropped";
const EVENTS_DROPPED_HELP: &str = "Number of buffered events dropped on per-category overflow";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    describe_counter!(SESSIONS_CREATED, SESSIONS_CREATED_HELP);
    describe_counter!(SESSIONS_EXPIRED, SESSIONS_EXPIRED_HELP);
    describe_gauge!(SESSIONS_LIVE, SESSIONS_LIVE_HELP);
    describe_counter!(WAITS_STARTED, WAITS_STARTED_HELP);
    describe_counter!(WAITS_RESOLVED, WAITS_RESOLVED_HELP);
    describe_counter!(EVENTS_PUBLISHED, EVENTS_PUBLISHED_HELP);
    describe_counter!(EVENTS_DELIVERED, EVENTS_DELIVERED_HELP);
    describe_counter!(EVENTS_DROPPED, EVENTS_DROPPED_HELP);
});

fn sessions_created() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(SESSIONS_CREATED)
}

fn sessions_expired() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(SESSIONS_EXPIRED)
}

fn sessions_live() -> Gauge {
    LazyLock::force(&DESCRIBE);
    gauge!(SESSIONS_LIVE)
}

fn waits_started() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(WAITS_STARTED)
}

fn waits_resolved(outcome: WaitOutcome) -> Counter {
    LazyLock::force(&DESCRIBE);
    let outcome = match outcome {
        WaitOutcome::Delivered => "delivered",
        WaitOutcome::TimedOut => "timed_out",
        WaitOutcome::Cancelled => "cancelled",
        WaitOutcome::Expired => "expired",
    };
    counter!(WAITS_RESOLVED, "outcome" => outcome)
}

fn events_published() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(EVENTS_PUBLISHED)
}

fn events_delivered() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(EVENTS_DELIVERED)
}

fn events_dropped() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(EVENTS_DROPPED)
}

pub(crate) fn record_session_created() {
    sessions_created().increment(1);
    sessions_live().increment(1.0);
}

pub(crate) fn record_session_expired() {
    sessions_expired().increment(1);
    sessions_live().decrement(1.0);
}

pub(crate) fn record_wait_started() {
    waits_started().increment(1);
}

pub(crate) fn record_wait_resolved(outcome: WaitOutcome, delivered: usize) {
    waits_resolved(outcome).increment(1);
    if delivered > 0 {
        events_delivered().increment(delivered as u64);
    }
}

pub(crate) fn record_published(count: usize) {
    events_published().increment(count as u64);
}

pub(crate) fn record_dropped(count: usize) {
    if count > 0 {
        events_dropped().increment(count as u64);
    }
}
