//! Per-address brute-force protection for the login endpoint.
//!
//! Flow Overview:
//! 1) `classify` runs before credentials are checked; an active block means
//!    the request is refused with a retry hint.
//! 2) `record_failure` counts a wrong password. Reaching `max_attempts` starts
//!    a fixed block window; failures during the window are ignored so
//!    hammering does not extend it.
//! 3) `record_success` forgets the address entirely, including an active block.
//! 4) Elapsed blocks are removed lazily when observed, or by `prune_expired`.
//!
//! The throttle never fails its caller. Store faults are logged and the
//! address is treated as not blocked.

use std::{sync::Arc, time::Duration};
use tokio::{
    task::{JoinHandle, spawn_blocking},
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error};

use super::{
    storage::{ThrottleEntry, ThrottleStore},
    utils::epoch_millis,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BLOCK_MINUTES: u64 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    max_attempts: u32,
    block_duration: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            block_duration: Duration::from_secs(DEFAULT_BLOCK_MINUTES * 60),
        }
    }
}

impl ThrottleConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures allowed before the address is blocked. Clamped to at least 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_block_minutes(self, minutes: u64) -> Self {
        self.with_block_duration(Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// A zero window would never block, so it falls back to the default.
    #[must_use]
    pub fn with_block_duration(mut self, duration: Duration) -> Self {
        self.block_duration = if duration.is_zero() {
            Self::default().block_duration
        } else {
            duration
        };
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    fn block_millis(&self) -> i64 {
        i64::try_from(self.block_duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThrottleDecision {
    #[default]
    Allowed,
    Blocked { retry_after_seconds: u64 },
}

impl ThrottleDecision {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Addresses compare as trimmed strings; an empty address has no key.
fn throttle_key(ip: Option<&str>) -> Option<&str> {
    ip.map(str::trim).filter(|key| !key.is_empty())
}

fn retry_after_seconds(remaining_millis: i64) -> u64 {
    u64::try_from(remaining_millis).unwrap_or(0).div_ceil(1000)
}

pub struct LoginThrottle {
    config: ThrottleConfig,
    store: Box<dyn ThrottleStore>,
}

impl LoginThrottle {
    pub fn new(config: ThrottleConfig, store: Box<dyn ThrottleStore>) -> Self {
        Self { config, store }
    }

    #[must_use]
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Is `ip` currently refused? Removes an elapsed block as a side effect.
    pub fn classify(&self, ip: Option<&str>) -> ThrottleDecision {
        self.classify_at(ip, epoch_millis())
    }

    pub fn classify_at(&self, ip: Option<&str>, now_millis: i64) -> ThrottleDecision {
        let Some(key) = throttle_key(ip) else {
            return ThrottleDecision::Allowed;
        };

        let mut decision = ThrottleDecision::Allowed;
        let result = self.store.update(key, &mut |slot: &mut Option<ThrottleEntry>| {
            let Some(entry) = slot.as_ref() else {
                return;
            };
            if let Some(until) = entry.active_block(now_millis) {
                decision = ThrottleDecision::Blocked {
                    retry_after_seconds: retry_after_seconds(until - now_millis),
                };
            } else if entry.block_elapsed(now_millis) {
                *slot = None;
            }
        });

        match result {
            Ok(()) => decision,
            Err(err) => {
                error!(ip = key, "Login throttle lookup failed: {err}");
                ThrottleDecision::Allowed
            }
        }
    }

    /// Count one failed login from `ip`.
    pub fn record_failure(&self, ip: Option<&str>) {
        self.record_failure_at(ip, epoch_millis());
    }

    pub fn record_failure_at(&self, ip: Option<&str>, now_millis: i64) {
        let Some(key) = throttle_key(ip) else {
            return;
        };
        let max_attempts = self.config.max_attempts;
        let block_millis = self.config.block_millis();

        let result = self.store.update(key, &mut |slot: &mut Option<ThrottleEntry>| {
            if slot
                .as_ref()
                .is_some_and(|entry| entry.active_block(now_millis).is_some())
            {
                return;
            }
            let entry = slot.get_or_insert_with(ThrottleEntry::default);
            entry.failed_count = entry.failed_count.saturating_add(1);
            if entry.failed_count >= max_attempts {
                entry.blocked_until_millis = Some(now_millis.saturating_add(block_millis));
            }
        });

        if let Err(err) = result {
            error!(ip = key, "Failed to record failed login: {err}");
        }
    }

    /// Forget all failure history for `ip`, lifting any active block.
    pub fn record_success(&self, ip: Option<&str>) {
        let Some(key) = throttle_key(ip) else {
            return;
        };
        let result = self
            .store
            .update(key, &mut |slot: &mut Option<ThrottleEntry>| *slot = None);
        if let Err(err) = result {
            error!(ip = key, "Failed to reset login throttle: {err}");
        }
    }

    /// Remove every entry whose block window has elapsed.
    ///
    /// Entries still below the threshold carry no window and are kept until a
    /// successful login from that address.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(epoch_millis())
    }

    pub fn prune_expired_at(&self, now_millis: i64) -> usize {
        match self
            .store
            .retain(&mut |entry: &ThrottleEntry| !entry.block_elapsed(now_millis))
        {
            Ok(removed) => removed,
            Err(err) => {
                error!("Failed to prune login throttle: {err}");
                0
            }
        }
    }
}

impl std::fmt::Debug for LoginThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginThrottle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run a throttle operation on the blocking pool.
///
/// The file-backed store does synchronous I/O under a lock, which must not
/// stall the async workers. A task that dies yields `T::default()`.
pub async fn run_blocking<T, F>(throttle: Arc<LoginThrottle>, op: F) -> T
where
    F: FnOnce(&LoginThrottle) -> T + Send + 'static,
    T: Default + Send + 'static,
{
    match spawn_blocking(move || op(&throttle)).await {
        Ok(value) => value,
        Err(err) => {
            error!("Login throttle task failed: {err}");
            T::default()
        }
    }
}

/// Periodically sweep elapsed blocks. Returns `None` when `every` is zero.
pub fn spawn_prune_worker(throttle: Arc<LoginThrottle>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = run_blocking(throttle.clone(), LoginThrottle::prune_expired).await;
            if removed > 0 {
                debug!(removed, "Pruned expired login blocks");
            }
        }
    }))
}
