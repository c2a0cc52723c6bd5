#![doc = include_str!("../README.md")]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
pub use config::GatewayConfig;

mod dispatch;
pub use dispatch::Dispatcher;

mod error;
pub use error::{GatewayError, GatewayResult};

mod metrics;

mod notifier;
pub use notifier::EventNotifier;

mod reaper;

mod registry;
pub use registry::{SessionRegistry, SessionRegistryInner};

mod waiter;

pub use node_notify_types::{
    ANY_SUBJECT, CategoryScope, EventCategory, FiredEvent, MatchedEvent, Registration,
    RegistrationRequest, RegistrationSummary, SessionToken, Unregister, WaitOutcome, WaitResult,
};

/// Construct a registry, its dispatcher, and an [`EventNotifier`] whose
/// events are relayed into the registry by a spawned listener task.
///
/// The listener stops when `cancel` fires. Must be called from within a
/// tokio runtime.
pub fn gateway(
    config: GatewayConfig,
    cancel: tokio_util::sync::CancellationToken,
) -> (SessionRegistry, Dispatcher, EventNotifier) {
    let registry = SessionRegistry::new(config);
    let dispatcher = registry.dispatcher();
    let notifier = EventNotifier::new(config.channel_capacity());
    dispatcher.spawn_listener(&notifier, cancel);
    (registry, dispatcher, notifier)
}
