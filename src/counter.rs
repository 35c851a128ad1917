//! The lazily refilled volume counter backing a bucket.

use core::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Outcome of an admission check against the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The requested volume was deducted.
    Admitted,
    /// Not enough volume. Holds the minimum time until enough volume could
    /// have accrued through refill alone.
    Wait(Duration),
}

#[derive(Debug)]
struct State {
    /// Currently available volume. Never above capacity.
    volume: u64,
    /// Point up to which refill has been applied. Only ever moves forward in
    /// whole intervals.
    last_update: Instant,
}

/// Capacity-bounded counter which refills by `rate` every `interval`.
///
/// Refill is lazy: it is only computed when the counter is consulted, using
/// the time passed in by the caller.
#[derive(Debug)]
pub(crate) struct RefillCounter {
    capacity: u64,
    rate: u64,
    interval: Duration,
    state: Mutex<State>,
}

impl RefillCounter {
    /// Construct a new counter.
    ///
    /// The caller is responsible for `capacity`, `rate` and `interval` being
    /// non-zero.
    pub(crate) fn new(
        capacity: u64,
        rate: u64,
        interval: Duration,
        initial: u64,
        now: Instant,
    ) -> Self {
        debug_assert!(capacity > 0 && rate > 0 && !interval.is_zero());

        Self {
            capacity,
            rate,
            interval,
            state: Mutex::new(State {
                volume: initial.min(capacity),
                last_update: now,
            }),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub(crate) fn rate(&self) -> u64 {
        self.rate
    }

    #[inline]
    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Try to deduct `volume` as of `now`.
    pub(crate) fn try_admit(&self, volume: u64, now: Instant) -> Admission {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if volume <= state.volume {
            state.volume -= volume;
            trace!(volume, remaining = state.volume, "admitted");
            return Admission::Admitted;
        }

        let hint = self.wait_hint(volume - state.volume);
        trace!(volume, available = state.volume, ?hint, "insufficient volume");
        Admission::Wait(hint)
    }

    /// Add `volume` as of `now`, saturating at capacity.
    pub(crate) fn credit(&self, volume: u64, now: Instant) {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.volume = state.volume.saturating_add(volume).min(self.capacity);
        trace!(volume, available = state.volume, "credited");
    }

    /// Current volume as of `now`.
    pub(crate) fn volume(&self, now: Instant) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.volume
    }

    /// Apply every whole interval elapsed since the last update.
    ///
    /// The sub-interval remainder stays behind in `last_update` so it counts
    /// towards the next refill.
    fn refill(&self, state: &mut State, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_update);
        let interval = self.interval.as_nanos();
        let periods = elapsed.as_nanos() / interval;

        if periods == 0 {
            return;
        }

        // Remainder is strictly less than the interval, which is itself a
        // Duration, so it fits in u64 nanoseconds for any sane interval.
        let remainder = (elapsed.as_nanos() % interval).min(u64::MAX as u128) as u64;
        state.last_update += elapsed - Duration::from_nanos(remainder);

        let added = u64::try_from(periods)
            .unwrap_or(u64::MAX)
            .saturating_mul(self.rate);

        state.volume = state.volume.saturating_add(added).min(self.capacity);
    }

    /// Time until `deficit` more volume accrues, ignoring capacity.
    fn wait_hint(&self, deficit: u64) -> Duration {
        let periods = deficit / self.rate + u64::from(deficit % self.rate != 0);
        let periods = u32::try_from(periods).unwrap_or(u32::MAX);
        self.interval.saturating_mul(periods)
    }
}

#[cfg(test)]
mod tests {
    use super::{Admission, RefillCounter};
    use core::time::Duration;
    use tokio::time::Instant;

    const SECOND: Duration = Duration::from_secs(1);

    fn counter(capacity: u64, rate: u64, initial: u64) -> (RefillCounter, Instant) {
        let start = Instant::now();
        (RefillCounter::new(capacity, rate, SECOND, initial, start), start)
    }

    #[test]
    fn lazy_refill() {
        let (counter, start) = counter(100, 2, 0);
        let now = start + SECOND * 10;

        assert_eq!(counter.try_admit(20, now), Admission::Admitted);
        assert_eq!(counter.volume(now), 0);
    }

    #[test]
    fn refill_is_idempotent() {
        let (counter, start) = counter(100, 2, 0);
        let now = start + Duration::from_millis(3500);

        assert_eq!(counter.volume(now), 6);
        assert_eq!(counter.volume(now), 6);
        assert_eq!(counter.volume(now + Duration::from_millis(499)), 6);
    }

    #[test]
    fn remainder_is_banked() {
        let (counter, start) = counter(100, 1, 0);

        // Polling every 700ms must not lose the partial seconds.
        let mut now = start;

        for _ in 0..10 {
            now += Duration::from_millis(700);
            counter.volume(now);
        }

        assert_eq!(counter.volume(now), 7);
    }

    #[test]
    fn refill_saturates_at_capacity() {
        let (counter, start) = counter(10, 3, 5);
        assert_eq!(counter.volume(start + SECOND * 100), 10);
    }

    #[test]
    fn credit_saturates_at_capacity() {
        let (counter, start) = counter(10, 1, 0);

        for n in 0..50 {
            counter.credit(n, start);
            assert!(counter.volume(start) <= 10);
        }

        assert_eq!(counter.volume(start), 10);
        counter.credit(u64::MAX, start);
        assert_eq!(counter.volume(start), 10);
    }

    #[test]
    fn wait_hint_rounds_up() {
        let (counter, start) = counter(100, 2, 0);

        assert_eq!(counter.try_admit(10, start), Admission::Wait(SECOND * 5));
        assert_eq!(counter.try_admit(11, start), Admission::Wait(SECOND * 6));
        assert_eq!(counter.try_admit(1, start), Admission::Wait(SECOND));
    }

    #[test]
    fn wait_hint_ignores_capacity() {
        let (counter, start) = counter(10, 1, 0);
        assert_eq!(counter.try_admit(50, start), Admission::Wait(SECOND * 50));
    }

    #[test]
    fn failed_admission_keeps_volume() {
        let (counter, start) = counter(100, 1, 4);

        assert!(matches!(counter.try_admit(5, start), Admission::Wait(_)));
        assert_eq!(counter.volume(start), 4);
        assert_eq!(counter.try_admit(4, start), Admission::Admitted);
        assert_eq!(counter.volume(start), 0);
    }

    #[test]
    fn zero_volume_always_admits() {
        let (counter, start) = counter(1, 1, 0);
        assert_eq!(counter.try_admit(0, start), Admission::Admitted);
    }

    #[test]
    fn initial_is_clamped() {
        let (counter, start) = counter(10, 1, 1000);
        assert_eq!(counter.volume(start), 10);
    }

    #[test]
    fn time_going_backwards_is_ignored() {
        let start = Instant::now() + SECOND * 10;
        let counter = RefillCounter::new(100, 1, SECOND, 0, start);

        assert_eq!(counter.volume(start - SECOND * 5), 0);
        assert_eq!(counter.volume(start + SECOND), 1);
    }
}
