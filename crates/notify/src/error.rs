//! Error types for the long-poll gateway.

use node_notify_types::{EventCategory, SessionToken, UnknownEventCategory};

/// Result using [`GatewayError`] as the default error type.
pub type GatewayResult<T, E = GatewayError> = std::result::Result<T, E>;

/// Caller-facing gateway errors.
///
/// All of these are local validation failures. The gateway holds no durable
/// state, so there is no storage or network failure mode. Timeouts and
/// cancellations are not errors, see [`WaitOutcome`].
///
/// [`WaitOutcome`]: node_notify_types::WaitOutcome
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// A registration named a category absent from the catalog.
    #[error(transparent)]
    UnknownEventCategory(#[from] UnknownEventCategory),
    /// A registration named a specific subject for a global category.
    #[error("event category {category} does not accept subject id {subject_id}")]
    SubjectNotSupported {
        /// The global category.
        category: EventCategory,
        /// The rejected subject id.
        subject_id: u64,
    },
    /// The token has no session, or the session holds no registrations.
    #[error("unknown session: {0}")]
    UnknownSession(SessionToken),
    /// A wait is already outstanding for the session.
    #[error("wait already in progress for session: {0}")]
    WaitAlreadyInProgress(SessionToken),
}

impl GatewayError {
    /// Convert the error to a string for API responses.
    pub fn into_string(self) -> String {
        self.to_string()
    }
}
