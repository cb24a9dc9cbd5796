//! Consecutive failed login tracking.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, warn};

use crate::scope::BruteForceSettings;
use crate::tokens::sweep_due;

/// Counter key for a login within a scope. Logins compare case-insensitively.
pub fn attempt_key(scope: &str, login: &str) -> String {
    format!("{scope}:{}", login.trim().to_lowercase())
}

/// Storage for consecutive failed password attempts.
///
/// A count expires `window` after the most recent failure; any failure
/// inside the window extends it. Backends shared between processes make the
/// lockout global.
pub trait AttemptCounter: Send + Sync + fmt::Debug {
    /// Failures currently counted for `key`.
    fn failures(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u32>;

    /// Record one failure and return the updated count.
    fn register_failure(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u32>;

    /// Forget all failures for `key`.
    fn reset(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    count: u32,
    last_failure: DateTime<Utc>,
    /// Window the last failure was counted under.
    window: Duration,
}

impl AttemptWindow {
    fn is_current(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_failure + window > now
    }
}

/// Process-local [`AttemptCounter`].
///
/// Windows that ran out are swept while failures are registered, at most
/// once a minute, so logins that never come back do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryAttemptCounter {
    windows: DashMap<String, AttemptWindow>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryAttemptCounter {
    /// Counter with no recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logins with a tracked window.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no login has a tracked window.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop windows that ended before `now`. Returns how many were dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, entry| entry.is_current(entry.window, now));
        before.saturating_sub(self.windows.len())
    }
}

impl AttemptCounter for MemoryAttemptCounter {
    fn failures(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u32> {
        Ok(self
            .windows
            .get(key)
            .filter(|entry| entry.is_current(window, now))
            .map(|entry| entry.count)
            .unwrap_or(0))
    }

    fn register_failure(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u32> {
        if sweep_due(&self.last_sweep, now) {
            let purged = self.purge_expired(now);
            if purged > 0 {
                debug!(purged, "swept expired attempt windows");
            }
        }

        let mut entry =
            self.windows.entry(key.to_string()).or_insert(AttemptWindow {
                count: 0,
                last_failure: now,
                window,
            });
        if !entry.is_current(window, now) {
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.last_failure = now;
        entry.window = window;
        Ok(entry.count)
    }

    fn reset(&self, key: &str) -> anyhow::Result<()> {
        self.windows.remove(key);
        Ok(())
    }
}

/// Whether `key` is locked out under `settings`.
pub(crate) fn is_locked(
    counter: &dyn AttemptCounter,
    settings: &BruteForceSettings,
    key: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    if !settings.is_enabled() {
        return Ok(false);
    }
    let failures = counter.failures(key, settings.ban_for, now)?;
    Ok(settings.is_exceeded(failures))
}

/// Count a failure and report whether it tipped the key into lockout.
pub(crate) fn register_failure(
    counter: &dyn AttemptCounter,
    settings: &BruteForceSettings,
    key: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    if !settings.is_enabled() {
        return Ok(false);
    }
    let failures = counter.register_failure(key, settings.ban_for, now)?;
    let locked = settings.is_exceeded(failures);
    if locked {
        warn!(
            key,
            ban_seconds = settings.ban_for.num_seconds(),
            "failed login limit reached"
        );
    }
    Ok(locked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BruteForceSettings {
        BruteForceSettings {
            limit: 3,
            ban_for: Duration::minutes(10),
        }
    }

    #[test]
    fn locks_after_limit_and_unlocks_after_window() {
        let counter = MemoryAttemptCounter::new();
        let settings = settings();
        let now = Utc::now();
        let key = attempt_key("user", "Alice");

        assert!(!register_failure(&counter, &settings, &key, now).unwrap());
        assert!(!register_failure(&counter, &settings, &key, now).unwrap());
        assert!(register_failure(&counter, &settings, &key, now).unwrap());
        assert!(is_locked(&counter, &settings, &key, now).unwrap());

        let later = now + Duration::minutes(11);
        assert!(!is_locked(&counter, &settings, &key, later).unwrap());
        assert!(!register_failure(&counter, &settings, &key, later).unwrap());
    }

    #[test]
    fn window_extends_from_last_failure() {
        let counter = MemoryAttemptCounter::new();
        let settings = settings();
        let start = Utc::now();
        let key = attempt_key("user", "bob");

        register_failure(&counter, &settings, &key, start).unwrap();
        register_failure(&counter, &settings, &key, start + Duration::minutes(8))
            .unwrap();
        assert_eq!(
            counter
                .failures(&key, settings.ban_for, start + Duration::minutes(15))
                .unwrap(),
            2
        );
    }

    #[test]
    fn keys_fold_case_and_reset_clears() {
        let counter = MemoryAttemptCounter::new();
        let settings = settings();
        let now = Utc::now();

        register_failure(&counter, &settings, &attempt_key("user", "ALICE"), now)
            .unwrap();
        let key = attempt_key("user", "alice");
        assert_eq!(counter.failures(&key, settings.ban_for, now).unwrap(), 1);
        assert_eq!(
            counter
                .failures(&attempt_key("admin", "alice"), settings.ban_for, now)
                .unwrap(),
            0
        );

        counter.reset(&key).unwrap();
        assert_eq!(counter.failures(&key, settings.ban_for, now).unwrap(), 0);
    }

    #[test]
    fn disabled_settings_never_lock() {
        let counter = MemoryAttemptCounter::new();
        let disabled = BruteForceSettings::disabled();
        let now = Utc::now();
        for _ in 0..10 {
            assert!(!register_failure(&counter, &disabled, "k", now).unwrap());
        }
        assert!(!is_locked(&counter, &disabled, "k", now).unwrap());
    }

    #[test]
    fn concurrent_failures_are_all_counted() {
        let counter = MemoryAttemptCounter::new();
        let settings = settings();
        let now = Utc::now();
        let key = attempt_key("user", "carol");
        let threads = 8;
        let per_thread = 50;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    for _ in 0..per_thread {
                        counter
                            .register_failure(&key, settings.ban_for, now)
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(
            counter.failures(&key, settings.ban_for, now).unwrap(),
            threads * per_thread
        );
    }

    #[test]
    fn abandoned_windows_are_swept() {
        let counter = MemoryAttemptCounter::new();
        let settings = settings();
        let start = Utc::now();
        for n in 0..10_000 {
            counter
                .register_failure(
                    &attempt_key("user", &format!("guess{n}")),
                    settings.ban_for,
                    start,
                )
                .unwrap();
        }
        assert_eq!(counter.len(), 10_000);

        let later = start + Duration::days(30);
        counter
            .register_failure(
                &attempt_key("user", "dave"),
                settings.ban_for,
                later,
            )
            .unwrap();
        assert_eq!(counter.len(), 1);
    }

    #[test]
    fn purge_keeps_windows_still_running() {
        let counter = MemoryAttemptCounter::new();
        let now = Utc::now();
        counter
            .register_failure("user:short", Duration::minutes(5), now)
            .unwrap();
        counter
            .register_failure("user:long", Duration::hours(2), now)
            .unwrap();

        assert_eq!(counter.purge_expired(now + Duration::minutes(30)), 1);
        assert_eq!(
            counter
                .failures("user:long", Duration::hours(2), now)
                .unwrap(),
            1
        );
        assert!(!counter.is_empty());
    }
}
