/// Brute-force lockout policy
use chrono::{DateTime, Duration, Utc};

/// Pure mapping from a post-increment failure count to a lock decision.
///
/// The threshold is exclusive-at-boundary: the attempt that brings the
/// counter to exactly `max_attempts` locks the account on that same failure.
/// No I/O happens here; persistence of the decision is the store's job.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    max_attempts: i32,
    lockout_duration: Duration,
}

impl LockoutPolicy {
    pub fn new(max_attempts: i32, lockout_duration_secs: i64) -> Self {
        Self {
            max_attempts,
            lockout_duration: Duration::seconds(lockout_duration_secs),
        }
    }

    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Lock expiry for a failure recorded at `now`, if the counter has
    /// reached the threshold.
    pub fn decide(&self, failed_attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if failed_attempts >= self.max_attempts {
            Some(now + self.lockout_duration)
        } else {
            None
        }
    }

    /// Candidate `locked_until` for a failure recorded at `now`; the store
    /// applies it only when the atomic increment crosses the threshold.
    pub fn lock_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lockout_duration
    }

    /// Seconds left on an active lock, floored at zero.
    pub fn remaining_secs(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        (locked_until - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_lock_below_threshold() {
        let policy = LockoutPolicy::new(5, 1800);
        let now = Utc::now();
        for attempts in 0..5 {
            assert!(policy.decide(attempts, now).is_none());
        }
    }

    #[test]
    fn test_lock_at_exact_threshold() {
        let policy = LockoutPolicy::new(5, 1800);
        let now = Utc::now();
        let locked_until = policy.decide(5, now).expect("5th failure must lock");
        assert_eq!(locked_until, now + Duration::seconds(1800));
    }

    #[test]
    fn test_lock_above_threshold() {
        let policy = LockoutPolicy::new(5, 1800);
        let now = Utc::now();
        assert!(policy.decide(6, now).is_some());
    }

    #[test]
    fn test_remaining_secs_floors_at_zero() {
        let now = Utc::now();
        assert_eq!(
            LockoutPolicy::remaining_secs(now + Duration::seconds(90), now),
            90
        );
        assert_eq!(
            LockoutPolicy::remaining_secs(now - Duration::seconds(90), now),
            0
        );
    }
}
