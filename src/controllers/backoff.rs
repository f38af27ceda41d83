//! Per-object retry backoff for failed reconciliations

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::store::JobKey;

#[derive(Clone, Copy, Debug)]
struct Failures {
    count: u32,
    last: Instant,
}

/// Exponential backoff keyed by Job identity.
///
/// The first failure waits `base`, each consecutive failure doubles the
/// delay up to `max`. A successful reconcile resets the count. Entries with
/// no failure for twice `max` are dropped on the next recorded failure, so
/// Jobs that vanish while failing do not stay tracked.
#[derive(Debug)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<JobKey, Failures>>,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<JobKey, Failures>> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Idle time after which an entry is forgotten; always longer than the
    /// largest requeue delay, so a Job that keeps failing stays at the cap.
    fn retention(&self) -> Duration {
        self.max.saturating_mul(2)
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &JobKey) -> Duration {
        self.next_delay_at(key, Instant::now())
    }

    pub(crate) fn next_delay_at(&self, key: &JobKey, now: Instant) -> Duration {
        let attempt = {
            let mut failures = self.failures();
            let retention = self.retention();
            failures.retain(|_, f| now.saturating_duration_since(f.last) < retention);

            let entry = failures.entry(key.clone()).or_insert(Failures {
                count: 0,
                last: now,
            });
            entry.count = entry.count.saturating_add(1);
            entry.last = now;
            entry.count
        };
        self.delay_for(attempt)
    }

    pub fn reset(&self, key: &JobKey) {
        self.failures().remove(key);
    }

    pub fn failure_count(&self, key: &JobKey) -> u32 {
        self.failures().get(key).map(|f| f.count).unwrap_or(0)
    }

    /// Number of Jobs currently tracked
    pub fn tracked(&self) -> usize {
        self.failures().len()
    }

    /// Delay for the given 1-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}
