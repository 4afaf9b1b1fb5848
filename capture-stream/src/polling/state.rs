//! Per-field poll state and schedule arithmetic
//!
//! All times are wall-clock milliseconds since the Unix epoch and are passed
//! in explicitly, which keeps the schedule logic deterministic under test.
//!
//! Read times are phase-aligned to an anchor (the scheduler's creation time):
//! a field with a 500 ms period is read at `anchor + n * 500` no matter when
//! it was registered or how long reads take.

use std::time::Duration;

use capture_api::{SubscriptionKey, Value};

/// Upper bound for the consecutive failure count
pub const MAX_FAILURE_COUNT: u32 = 100;

/// Upper bound for the backoff delay, in seconds
pub const MAX_BACKOFF_SECS: i64 = 3600;

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Extra delay after `failure_count` consecutive failures
///
/// `min(k², 3600)` seconds, pushed to the next multiple of `period_ms`
/// strictly above it.
///
/// ```
/// use capture_stream::polling::backoff_delay;
///
/// assert_eq!(backoff_delay(0, 500), 0);
/// assert_eq!(backoff_delay(1, 500), 1500);
/// assert_eq!(backoff_delay(2, 3000), 6000);
/// ```
pub fn backoff_delay(failure_count: u32, period_ms: i64) -> i64 {
    if failure_count == 0 || period_ms <= 0 {
        return 0;
    }
    let k = i64::from(failure_count);
    let delay = (k * k).min(MAX_BACKOFF_SECS) * 1000;
    delay + period_ms - delay % period_ms
}

/// Schedule and bookkeeping for one polled field
#[derive(Debug, Clone)]
pub struct PollState {
    key: SubscriptionKey,
    period: i64,
    next_read_time: i64,
    failure_count: u32,
    error_state: bool,
    last_value: Option<Value>,
    event_only_on_change: bool,
    failure_backoff: bool,
}

impl PollState {
    pub fn new(
        key: SubscriptionKey,
        period: Duration,
        event_only_on_change: bool,
        failure_backoff: bool,
        anchor: i64,
        now: i64,
    ) -> Self {
        let mut state = Self {
            key,
            period: i64::try_from(period.as_millis()).unwrap_or(i64::MAX),
            next_read_time: anchor,
            failure_count: 0,
            error_state: false,
            last_value: None,
            event_only_on_change,
            failure_backoff,
        };
        state.reset(anchor, now);
        state
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period.max(0) as u64)
    }

    /// Fields with a zero period are kept but never read
    pub fn is_polled(&self) -> bool {
        self.period > 0
    }

    pub fn next_read_time(&self) -> i64 {
        self.next_read_time
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn is_error_state(&self) -> bool {
        self.error_state
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    pub(crate) fn set_last_value(&mut self, value: Option<Value>) {
        self.last_value = value;
    }

    pub fn event_only_on_change(&self) -> bool {
        self.event_only_on_change
    }

    /// Re-anchor the schedule
    pub fn reset(&mut self, anchor: i64, now: i64) {
        self.next_read_time = anchor;
        self.next(now);
    }

    /// Advance to the next period boundary after `now`, plus backoff
    ///
    /// If the clock moved backwards past the scheduled time, the next read is
    /// placed within one period of `now` instead.
    pub fn next(&mut self, now: i64) {
        if !self.is_polled() {
            return;
        }
        let diff = now - self.next_read_time;
        let rem = diff % self.period;
        self.next_read_time = if diff < 0 {
            now - rem
        } else {
            now + self.period - rem
        };

        if self.failure_backoff && self.failure_count > 0 {
            self.next_read_time += backoff_delay(self.failure_count, self.period);
        }
    }

    /// Longest legitimate wait: one period plus any pending backoff
    fn max_wait(&self) -> i64 {
        if self.failure_backoff {
            self.period + backoff_delay(self.failure_count, self.period)
        } else {
            self.period
        }
    }

    /// Milliseconds until the next read, never negative
    ///
    /// A result larger than one period plus the pending backoff means the
    /// clock jumped backwards; the schedule is recomputed from `now` in that
    /// case.
    pub fn remaining(&mut self, now: i64) -> i64 {
        let remaining = (self.next_read_time - now).max(0);
        if remaining <= self.max_wait() {
            return remaining;
        }
        self.next(now);
        (self.next_read_time - now).max(0)
    }

    pub fn is_due(&mut self, now: i64) -> bool {
        self.is_polled() && self.remaining(now) == 0
    }

    /// Record a successful read and schedule the next one
    ///
    /// Returns true when the value differs from the previous sample.
    pub fn record_success(&mut self, value: Value, now: i64) -> bool {
        self.failure_count = 0;
        self.error_state = false;
        let changed = self.last_value.as_ref() != Some(&value);
        self.last_value = Some(value);
        self.next(now);
        changed
    }

    /// Record a failed read and schedule the retry
    ///
    /// Returns true for the first failure after a success (or registration).
    pub fn record_failure(&mut self, now: i64) -> bool {
        let first = !self.error_state;
        self.error_state = true;
        if self.failure_backoff && self.failure_count < MAX_FAILURE_COUNT {
            self.failure_count += 1;
        }
        self.next(now);
        first
    }

    /// Forget past failures
    pub fn clear_failures(&mut self) {
        self.failure_count = 0;
        self.error_state = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const ANCHOR: i64 = 1_000_000;

    fn state(period_ms: u64) -> PollState {
        PollState::new(
            SubscriptionKey::new("d1", "f1"),
            Duration::from_millis(period_ms),
            false,
            true,
            ANCHOR,
            ANCHOR,
        )
    }

    #[rstest]
    #[case(1, 500, 1_500)]
    #[case(2, 500, 4_500)]
    #[case(3, 1_000, 10_000)]
    #[case(10, 7_000, 105_000)]
    #[case(60, 1_000, 3_601_000)]
    #[case(100, 1_000, 3_601_000)]
    fn test_backoff_delay(#[case] k: u32, #[case] period: i64, #[case] expected: i64) {
        assert_eq!(backoff_delay(k, period), expected);
    }

    #[test]
    fn test_first_read_phase_aligned_to_anchor() {
        let mut s = state(500);
        assert_eq!(s.next_read_time(), ANCHOR + 500);

        // Registered later: still lands on an anchor multiple
        let late = PollState::new(
            SubscriptionKey::new("d1", "f1"),
            Duration::from_millis(500),
            false,
            true,
            ANCHOR,
            ANCHOR + 1_230,
        );
        assert_eq!(late.next_read_time(), ANCHOR + 1_500);

        assert_eq!(s.remaining(ANCHOR + 200), 300);
        assert!(s.is_due(ANCHOR + 500));
    }

    #[test]
    fn test_success_schedules_next_boundary() {
        let mut s = state(500);
        // Read finished 40 ms late
        let changed = s.record_success(Value::from("A"), ANCHOR + 540);
        assert!(changed);
        assert_eq!(s.next_read_time(), ANCHOR + 1_000);

        assert!(!s.record_success(Value::from("A"), ANCHOR + 1_010));
        assert!(s.record_success(Value::from("B"), ANCHOR + 1_510));
    }

    #[test]
    fn test_failure_backoff_and_cap() {
        let mut s = state(500);
        assert!(s.record_failure(ANCHOR + 500));
        assert_eq!(s.failure_count(), 1);
        assert_eq!(s.next_read_time(), ANCHOR + 1_000 + 1_500);

        assert!(!s.record_failure(ANCHOR + 2_500));
        for i in 0..200 {
            s.record_failure(ANCHOR + 3_000 + i);
        }
        assert_eq!(s.failure_count(), MAX_FAILURE_COUNT);
        assert!(s.is_error_state());

        s.record_success(Value::Null, ANCHOR + 10_000);
        assert_eq!(s.failure_count(), 0);
        assert!(!s.is_error_state());
    }

    #[test]
    fn test_remaining_stable_during_backoff() {
        let mut s = state(500);
        s.record_failure(ANCHOR + 500);
        let scheduled = s.next_read_time();

        // Remaining exceeds the period but must not push the read further out
        assert_eq!(s.remaining(ANCHOR + 600), scheduled - (ANCHOR + 600));
        assert_eq!(s.next_read_time(), scheduled);
    }

    #[test]
    fn test_backoff_kept_across_period_boundaries() {
        let mut s = state(500);
        s.record_failure(ANCHOR + 500);
        let scheduled = s.next_read_time();
        assert_eq!(scheduled, ANCHOR + 2_500);

        // Woken every 100 ms by other fields until the retry is due
        let mut now = ANCHOR + 600;
        while now < scheduled {
            assert_eq!(s.remaining(now), scheduled - now);
            assert_eq!(s.next_read_time(), scheduled);
            now += 100;
        }
        assert!(s.is_due(scheduled));
    }

    #[test]
    fn test_clock_moved_backwards_during_backoff() {
        let mut s = state(500);
        s.record_failure(ANCHOR + 10_000);
        let scheduled = s.next_read_time();

        let now = scheduled - 3_600_000;
        let remaining = s.remaining(now);
        assert!(remaining <= 500 + backoff_delay(1, 500), "remaining {}", remaining);
    }

    #[test]
    fn test_cleared_failures_drop_pending_backoff() {
        let mut s = state(500);
        s.record_failure(ANCHOR + 500);
        s.clear_failures();
        assert!(s.remaining(ANCHOR + 600) <= 500);
    }

    #[test]
    fn test_failures_without_backoff_keep_period() {
        let mut s = PollState::new(
            SubscriptionKey::new("d1", "f1"),
            Duration::from_millis(500),
            false,
            false,
            ANCHOR,
            ANCHOR,
        );
        s.record_failure(ANCHOR + 500);
        assert_eq!(s.failure_count(), 0);
        assert!(s.is_error_state());
        assert_eq!(s.next_read_time(), ANCHOR + 1_000);
    }

    #[test]
    fn test_clock_moved_backwards() {
        let mut s = state(500);
        s.record_success(Value::from(1), ANCHOR + 10_000);
        assert_eq!(s.next_read_time(), ANCHOR + 10_500);

        // Clock set back by an hour: remaining would be huge, so recompute
        let now = ANCHOR + 10_000 - 3_600_000;
        let remaining = s.remaining(now);
        assert!(remaining <= 500, "remaining {} after clock jump", remaining);
    }

    #[test]
    fn test_zero_period_is_never_due() {
        let mut s = state(0);
        assert!(!s.is_polled());
        assert!(!s.is_due(ANCHOR + 1_000_000));
    }

    proptest! {
        #[test]
        fn backoff_is_non_decreasing_and_period_aligned(period in 1i64..20_000) {
            let mut previous = 0;
            for k in 1..=10u32 {
                let delay = backoff_delay(k, period);
                let base = i64::from(k * k) * 1000;
                prop_assert!(delay > base);
                prop_assert!(delay <= base + period);
                prop_assert_eq!(delay % period, 0);
                prop_assert!(delay >= previous);
                previous = delay;
            }
        }

        #[test]
        fn next_read_is_in_future_and_aligned(
            period in 1i64..10_000,
            offset in 0i64..1_000_000,
        ) {
            let mut s = state(period as u64);
            let now = ANCHOR + period + offset;
            s.next(now);
            prop_assert!(s.next_read_time() > now);
            prop_assert!(s.next_read_time() - now <= period);
            prop_assert_eq!((s.next_read_time() - ANCHOR) % period, 0);
        }
    }
}
