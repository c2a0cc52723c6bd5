//! Configuration for the long-poll gateway.

use init4_bin_base::utils::from_env::FromEnv;
use std::time::Duration;

const DEFAULT_MAX_WAIT_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
const DEFAULT_REAP_INTERVAL_MS: u64 = 30 * 1_000;
const DEFAULT_PENDING_PER_CATEGORY: usize = 100;
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for the event long-poll gateway.
///
/// Every field is optional. Unset fields fall back to the defaults documented
/// on the accessors. The config can be loaded from the environment with
/// [`FromEnv::from_env`], or embedded in a larger node config, where durations
/// are written in milliseconds:
///
/// ```json
/// { "maxWaitMs": 60000, "pendingPerCategory": 50 }
/// ```
///
/// # Environment Variables
///
/// - `NOTIFY_MAX_WAIT_MS` – Upper bound on a single wait, in ms.
/// - `NOTIFY_IDLE_TIMEOUT_MS` – Idle time after which a session expires, in ms.
/// - `NOTIFY_REAP_INTERVAL_MS` – Interval between idle-session sweeps, in ms.
/// - `NOTIFY_PENDING_PER_CATEGORY` – Buffered events per category per session.
/// - `NOTIFY_CHANNEL_CAPACITY` – Capacity of the event notifier channel.
///
/// # Example
///
/// ```
/// use node_notify::GatewayConfig;
/// use std::time::Duration;
///
/// let config = GatewayConfig::default().with_max_wait(Duration::from_secs(30));
/// assert_eq!(config.max_wait(), Duration::from_secs(30));
/// assert_eq!(config.pending_per_category(), 100);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, FromEnv)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    #[from_env(var = "NOTIFY_MAX_WAIT_MS", desc = "Upper bound on a single wait, in ms", optional)]
    max_wait_ms: Option<u64>,

    #[from_env(
        var = "NOTIFY_IDLE_TIMEOUT_MS",
        desc = "Idle time after which a session expires, in ms",
        optional
    )]
    idle_timeout_ms: Option<u64>,

    #[from_env(
        var = "NOTIFY_REAP_INTERVAL_MS",
        desc = "Interval between idle-session sweeps, in ms",
        optional
    )]
    reap_interval_ms: Option<u64>,

    #[from_env(
        var = "NOTIFY_PENDING_PER_CATEGORY",
        desc = "Buffered events per category per session",
        optional
    )]
    pending_per_category: Option<usize>,

    #[from_env(
        var = "NOTIFY_CHANNEL_CAPACITY",
        desc = "Capacity of the event notifier channel",
        optional
    )]
    channel_capacity: Option<usize>,
}

impl GatewayConfig {
    /// Upper bound on a single wait, regardless of the requested timeout.
    ///
    /// Default: `5 minutes`.
    pub const fn max_wait(&self) -> Duration {
        match self.max_wait_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }

    /// Sessions with no client activity for this long are expired.
    ///
    /// Default: `10 minutes`.
    pub const fn idle_timeout(&self) -> Duration {
        match self.idle_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
        }
    }

    /// Interval between idle-session sweeps. At least 1ms.
    ///
    /// Default: `30 seconds`.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms.unwrap_or(DEFAULT_REAP_INTERVAL_MS).max(1))
    }

    /// Maximum undelivered events held per category per session. On overflow
    /// the oldest event of the category is dropped. At least 1.
    ///
    /// Default: `100`.
    pub fn pending_per_category(&self) -> usize {
        self.pending_per_category.unwrap_or(DEFAULT_PENDING_PER_CATEGORY).max(1)
    }

    /// Capacity of the [`EventNotifier`] broadcast channel. At least 1.
    ///
    /// Default: `1024`.
    ///
    /// [`EventNotifier`]: crate::EventNotifier
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY).max(1)
    }

    /// Set the maximum wait.
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = Some(max_wait.as_millis() as u64);
        self
    }

    /// Set the idle timeout.
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(idle_timeout.as_millis() as u64);
        self
    }

    /// Set the sweep interval.
    pub const fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval_ms = Some(reap_interval.as_millis() as u64);
        self
    }

    /// Set the per-category buffer capacity.
    pub const fn with_pending_per_category(mut self, pending_per_category: usize) -> Self {
        self.pending_per_category = Some(pending_per_category);
        self
    }

    /// Set the notifier channel capacity.
    pub const fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = Some(channel_capacity);
        self
    }

    /// Clamp a requested wait to [`Self::max_wait`].
    pub fn clamp_wait(&self, timeout_ms: u64) -> Duration {
        Duration::from_millis(timeout_ms).min(self.max_wait())
    }
}
