//! Session registry for the long-poll gateway.
//!
//! The registry owns all session state:
//!
//! - a [`DashMap`] from [`SessionToken`] to the session, holding its
//!   registrations, its pending buffer, its waiter slot, and its last
//!   activity time;
//! - a category index from each [`EventCategory`] to the sessions registered
//!   for it, so the dispatcher only visits interested sessions.
//!
//! # Locking
//!
//! A session's entry lock is the unit of atomicity: installing a waiter,
//! delivering into it, and reclaiming it all happen under that lock, so the
//! "at most one waiter" check and the install cannot interleave with another
//! `wait` on the same token.
//!
//! The index is only ever locked while a session entry is held (register,
//! unregister, expiry), or on its own (publish snapshots it, then releases it
//! before locking sessions). The order session-then-index is never inverted.
//!
//! [`DashMap`]: dashmap::DashMap

mod buffer;
mod index;
mod session;
mod table;

use crate::{
    GatewayConfig, GatewayError, GatewayResult, metrics,
    reaper::Reaper,
    waiter::Waiter,
};
use dashmap::DashMap;
use index::CategoryIndex;
use node_notify_types::{
    EventCategory, FiredEvent, MatchedEvent, Registration, RegistrationRequest,
    RegistrationSummary, SessionToken, Unregister, WaitOutcome, WaitResult,
};
use session::{Delivery, Session};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Slack allowed past a waiter's deadline before the reaper treats it as
/// abandoned.
const WAITER_GRACE: Duration = Duration::from_secs(5);

/// Registry of client sessions.
///
/// Cheaply clonable, cloning just increments an `Arc` reference count. The
/// registry is meant to be constructed once at node startup and handed to the
/// transport handlers, with a [`Dispatcher`] handed to the event source.
///
/// Calling [`Self::new`] spawns a reaper thread that periodically expires idle
/// sessions. The reaper runs on a separate thread, to avoid
/// [`DashMap::retain`] deadlocks, and holds only a weak reference, so it exits
/// once every handle is dropped.
///
/// [`Dispatcher`]: crate::Dispatcher
/// [`DashMap::retain`]: dashmap::DashMap::retain
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

impl SessionRegistry {
    /// Create a new registry and start its reaper.
    pub fn new(config: GatewayConfig) -> Self {
        let inner = Arc::new(SessionRegistryInner::new(config));
        Reaper::new(Arc::downgrade(&inner), config.reap_interval(), config.idle_timeout()).spawn();
        Self { inner }
    }

    /// Get a dispatcher publishing into this registry.
    pub fn dispatcher(&self) -> crate::Dispatcher {
        crate::Dispatcher::new(Arc::clone(&self.inner))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl core::ops::Deref for SessionRegistry {
    type Target = SessionRegistryInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl core::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Inner logic for [`SessionRegistry`].
#[derive(Debug)]
pub struct SessionRegistryInner {
    config: GatewayConfig,
    sessions: DashMap<SessionToken, Session>,
    index: CategoryIndex,
    next_waiter_id: AtomicU64,
}

impl SessionRegistryInner {
    fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            index: CategoryIndex::default(),
            next_waiter_id: AtomicU64::new(1),
        }
    }

    /// The registry configuration.
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Validate entries against the catalog. All-or-nothing.
    fn validate<I>(entries: I) -> GatewayResult<Vec<Registration>>
    where
        I: IntoIterator<Item = RegistrationRequest>,
    {
        entries
            .into_iter()
            .map(|req| -> GatewayResult<Registration> {
                let reg = req.resolve()?;
                if !reg.category.accepts_subject(reg.subject_id) {
                    return Err(GatewayError::SubjectNotSupported {
                        category: reg.category,
                        subject_id: reg.subject_id,
                    });
                }
                Ok(reg)
            })
            .collect()
    }

    /// Register interest in events, creating the session if absent.
    ///
    /// Every entry is validated before any is applied. Duplicate entries are
    /// ignored. Returns the session's full registration set.
    pub fn register<I>(
        &self,
        token: impl Into<SessionToken>,
        entries: I,
    ) -> GatewayResult<RegistrationSummary>
    where
        I: IntoIterator<Item = RegistrationRequest>,
    {
        let token = token.into();
        let regs = Self::validate(entries)?;

        let mut session = self.sessions.entry(token.clone()).or_insert_with(|| {
            debug!(%token, "created session");
            metrics::record_session_created();
            Session::new(self.config.pending_per_category())
        });
        for reg in regs {
            if session.registrations_mut().insert(reg) {
                self.index.add(reg.category, &token);
            }
        }
        session.touch();

        trace!(%token, registered = session.registrations().len(), "registered");
        Ok(session.registrations().summary())
    }

    /// Remove registrations from a session, or clear them all.
    ///
    /// Clearing does not remove the session. It stays until expiry, and can
    /// register again.
    pub fn unregister(
        &self,
        token: impl Into<SessionToken>,
        entries: impl Into<Unregister>,
    ) -> GatewayResult<RegistrationSummary> {
        let token = token.into();
        let entries = entries.into();
        let regs = match entries {
            Unregister::All => None,
            Unregister::Entries(entries) => Some(Self::validate(entries)?),
        };

        let mut session =
            self.sessions.get_mut(&token).ok_or_else(|| GatewayError::UnknownSession(token.clone()))?;
        match regs {
            None => {
                for category in session.registrations_mut().clear() {
                    self.index.remove(category, &token);
                }
            }
            Some(regs) => {
                for reg in regs {
                    if session.registrations_mut().remove(&reg) {
                        self.index.remove(reg.category, &token);
                    }
                }
            }
        }
        session.touch();

        trace!(%token, registered = session.registrations().len(), "unregistered");
        Ok(session.registrations().summary())
    }

    /// Wait for matching events.
    ///
    /// Returns immediately if events are already buffered. Otherwise suspends
    /// until an event matches, or the timeout (clamped to
    /// [`GatewayConfig::max_wait`]) elapses, or the session is expired or
    /// its wait is cancelled. Only the first case yields events.
    ///
    /// Fails with [`GatewayError::UnknownSession`] if the session does not
    /// exist or holds no registrations, and with
    /// [`GatewayError::WaitAlreadyInProgress`] if another wait is
    /// outstanding.
    pub async fn wait(
        &self,
        token: impl Into<SessionToken>,
        timeout_ms: u64,
    ) -> GatewayResult<WaitResult> {
        self.wait_inner(token.into(), timeout_ms, None).await
    }

    /// As [`Self::wait`], but also resolves with
    /// [`WaitOutcome::Cancelled`] when `cancel` fires, e.g. on client
    /// disconnect.
    pub async fn wait_with_cancel(
        &self,
        token: impl Into<SessionToken>,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> GatewayResult<WaitResult> {
        self.wait_inner(token.into(), timeout_ms, Some(cancel)).await
    }

    async fn wait_inner(
        &self,
        token: SessionToken,
        timeout_ms: u64,
        cancel: Option<&CancellationToken>,
    ) -> GatewayResult<WaitResult> {
        let waiter = {
            let mut session = self
                .sessions
                .get_mut(&token)
                .ok_or_else(|| GatewayError::UnknownSession(token.clone()))?;
            if session.registrations().is_empty() {
                return Err(GatewayError::UnknownSession(token));
            }
            if session.is_waiting() {
                return Err(GatewayError::WaitAlreadyInProgress(token));
            }
            session.touch();
            metrics::record_wait_started();

            if let Some((events, coalesced)) = session.take_pending() {
                trace!(%token, count = events.len(), "collected buffered events");
                metrics::record_wait_resolved(WaitOutcome::Delivered, events.len());
                return Ok(WaitResult::delivered(events, coalesced));
            }

            let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
            let deadline = Instant::now() + self.config.clamp_wait(timeout_ms);
            let (waiter, slot) = Waiter::new(token.clone(), id, deadline);
            session.install_waiter(slot);
            trace!(%token, id, "suspending wait");
            waiter
        };

        let result = waiter.suspend(self, cancel).await;
        self.touch(&token);
        Ok(result)
    }

    /// Reclaim the slot of wait `id` after its deadline or cancellation.
    /// Returns `false` if the wait was already resolved.
    pub(crate) fn release_waiter(&self, token: &SessionToken, id: u64) -> bool {
        self.sessions.get_mut(token).is_some_and(|mut session| session.release_waiter(id))
    }

    fn touch(&self, token: &SessionToken) {
        if let Some(mut session) = self.sessions.get_mut(token) {
            session.touch();
        }
    }

    /// Cancel the outstanding wait of a session, as on client disconnect.
    /// Returns `true` if a wait was cancelled.
    pub fn cancel_wait(&self, token: impl Into<SessionToken>) -> bool {
        let token = token.into();
        let cancelled =
            self.sessions.get_mut(&token).is_some_and(|mut session| session.cancel_waiter());
        if cancelled {
            debug!(%token, "wait cancelled by transport");
        }
        cancelled
    }

    /// Tear down a session at the client's request, exactly as expiry would.
    /// Returns `true` if the session existed.
    pub fn close(&self, token: impl Into<SessionToken>) -> bool {
        let token = token.into();
        let closed = self
            .sessions
            .remove_if_mut(&token, |token, session| {
                self.expire(token, session);
                true
            })
            .is_some();
        if closed {
            debug!(%token, "session closed");
        }
        closed
    }

    /// Expire every session idle for at least `older_than`, and clear waiter
    /// slots abandoned by their callers. Returns the number of sessions
    /// expired.
    pub fn reap_idle(&self, older_than: Duration) -> usize {
        let mut expired = 0;
        self.sessions.retain(|token, session| {
            if session.clear_stale_waiter(WAITER_GRACE) {
                trace!(%token, "cleared abandoned waiter");
            }
            if session.idle_for() < older_than {
                return true;
            }
            debug!(%token, %session, "expiring idle session");
            self.expire(token, session);
            expired += 1;
            false
        });
        expired
    }

    /// Tear down a session that is about to be removed from the map. Must be
    /// called under the session's entry lock.
    fn expire(&self, token: &SessionToken, session: &mut Session) {
        for category in session.teardown(WaitOutcome::Expired) {
            self.index.remove(category, token);
        }
        metrics::record_session_expired();
    }

    /// Deliver a fired event to every interested session. Returns the number
    /// of sessions that matched.
    pub(crate) fn publish(&self, fired: &FiredEvent) -> usize {
        metrics::record_published(fired.subject_ids.len());
        if fired.subject_ids.is_empty() {
            return 0;
        }

        let mut matched = 0;
        for token in self.index.interested(fired.category) {
            // NB: the index is only changed under the session's entry lock. A
            // session missing here expired after the snapshot, and its token
            // may already belong to a new session, so its entries are left be.
            let Some(mut session) = self.sessions.get_mut(&token) else {
                trace!(%token, category = %fired.category, "session gone since snapshot");
                continue;
            };
            if !session.registrations().has_category(fired.category) {
                continue;
            }

            let events: Vec<MatchedEvent> = fired
                .matched_events()
                .filter(|e| session.registrations().matches(e.category, e.subject_id))
                .collect();
            if events.is_empty() {
                continue;
            }
            matched += 1;

            let (delivery, dropped) = session.deliver(events);
            metrics::record_dropped(dropped);
            match delivery {
                Delivery::Woken { count } => trace!(%token, count, "woke waiter"),
                Delivery::Buffered => trace!(%token, dropped, "buffered events"),
            }
        }
        matched
    }

    /// Flag every session as having lost events, waking active waiters.
    pub(crate) fn mark_all_coalesced(&self) {
        for mut session in self.sessions.iter_mut() {
            if let Delivery::Woken { .. } = session.mark_coalesced() {
                trace!(token = %session.key(), "woke waiter with coalesced flag");
            }
        }
    }

    /// The registrations of a session, or `None` if it does not exist.
    pub fn registrations(&self, token: &str) -> Option<RegistrationSummary> {
        self.sessions.get(token).map(|session| session.registrations().summary())
    }

    /// True if a session exists for the token.
    pub fn contains_session(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }

    /// True if the session has an outstanding wait.
    pub fn is_waiting(&self, token: &str) -> bool {
        self.sessions.get(token).is_some_and(|session| session.is_waiting())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions registered for `category`.
    pub fn interest_count(&self, category: EventCategory) -> usize {
        self.index.interest_count(category)
    }
}
