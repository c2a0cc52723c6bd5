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

mod category;
pub use category::{CategoryScope, EventCategory, UnknownEventCategory};

mod event;
pub use event::{FiredEvent, MatchedEvent, WaitOutcome, WaitResult};

mod registration;
pub use registration::{
    ANY_SUBJECT, Registration, RegistrationRequest, RegistrationSummary, Unregister,
};

mod token;
pub use token::SessionToken;
