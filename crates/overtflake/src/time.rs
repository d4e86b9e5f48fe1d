use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Overtone epoch: Sunday, January 1, 2017 00:00:00 UTC, in milliseconds
/// since the Unix epoch. This is the default epoch for overt-flake IDs.
pub const OVERTONE_EPOCH_MS: i64 = 1_483_228_800_000;

/// Twitter Snowflake epoch: Thursday, November 4, 2010 01:42:54.657 UTC.
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_288_834_974_657;

/// The Unix epoch itself: Thursday, January 1, 1970 00:00:00 UTC.
pub const UNIX_EPOCH_MS: i64 = 0;

/// A source of the current time in milliseconds since the Unix epoch.
///
/// The allocator reads time exclusively through this trait so that tests
/// can drive the backwards-time and tick-exhaustion paths with a mocked
/// clock instead of waiting on the real one.
///
/// # Example
///
/// ```
/// use overtflake::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> i64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> i64;
}

/// A monotonic wall clock with millisecond resolution.
///
/// The clock captures `SystemTime::now()` once at construction and measures
/// all subsequent time with `Instant`, so readings are aligned to the Unix
/// epoch but can never run backwards within a process, regardless of NTP
/// steps or daylight-savings adjustments. Backwards time is therefore only
/// observable across process restarts, which is exactly what the operator
/// watermark (`wait_for_time`) guards against.
#[derive(Copy, Clone)]
pub struct MonotonicClock {
    started: Instant,
    offset: Duration,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Constructs a monotonic clock anchored to the current system time.
    pub fn new() -> Self {
        let offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);

        Self {
            started: Instant::now(),
            offset,
        }
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> i64 {
        (self.offset + self.started.elapsed()).as_millis() as i64
    }
}

impl<T: TimeSource> TimeSource for &T {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_is_unix_aligned() {
        let clock = MonotonicClock::new();
        let now = clock.current_millis();
        // Any sane host clock reads later than the Overtone epoch.
        assert!(now > OVERTONE_EPOCH_MS);
    }

    #[test]
    fn monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let mut last = clock.current_millis();
        for _ in 0..1_000 {
            let now = clock.current_millis();
            assert!(now >= last);
            last = now;
        }
    }
}
