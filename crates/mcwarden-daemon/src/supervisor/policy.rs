//! Crash restart pacing.
//!
//! A run that stayed up for at least [`RestartPolicy::fast_exit_threshold`] is
//! restarted immediately. Consecutive shorter runs are crash-looping: the
//! first is still restarted immediately, and the nth (n ≥ 2) waits
//! `initial_backoff × 2^(n-2)` clamped to `max_backoff`.

use std::time::Duration;

use mcwarden_core::settings::RestartSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub fast_exit_threshold: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RestartPolicy {
    /// Always restart without delay.
    pub const fn immediate() -> Self {
        Self {
            fast_exit_threshold: Duration::ZERO,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before the next start, given how many fast exits happened in a
    /// row (including the current one).
    pub fn delay_for(&self, fast_exits: u32) -> Duration {
        if fast_exits <= 1 {
            return Duration::ZERO;
        }
        let exp = (fast_exits - 2).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from(&RestartSettings::default())
    }
}

impl From<&RestartSettings> for RestartPolicy {
    fn from(settings: &RestartSettings) -> Self {
        Self {
            fast_exit_threshold: Duration::from_secs(settings.fast_exit_threshold_secs),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }
}

/// Tracks consecutive fast exits across restarts.
#[derive(Debug)]
pub(crate) struct CrashTracker {
    policy: RestartPolicy,
    fast_exits: u32,
}

impl CrashTracker {
    pub(crate) const fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            fast_exits: 0,
        }
    }

    /// Record an exit after `uptime` and return how long to wait before
    /// respawning.
    pub(crate) fn record_exit(&mut self, uptime: Duration) -> Duration {
        if uptime >= self.policy.fast_exit_threshold {
            self.fast_exits = 0;
            return Duration::ZERO;
        }
        self.fast_exits = self.fast_exits.saturating_add(1);
        self.policy.delay_for(self.fast_exits)
    }
}
