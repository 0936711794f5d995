//! Simulation time helpers
//!
//! All engine time is a [`Duration`] since the start of the encounter.

use std::time::Duration;

/// Sentinel expiration for effects that never run out
pub const NEVER_EXPIRES: Duration = Duration::MAX;

/// Smallest time step the engine distinguishes when rounding tick periods
pub const TICK_GRANULARITY: Duration = Duration::from_millis(1);

const NANOS_PER_MILLI: u128 = 1_000_000;

/// Round to the nearest integer, ties to even (2.5 -> 2, 3.5 -> 4)
pub fn round_half_even(value: f64) -> f64 {
    value.round_ties_even()
}

/// Round a duration to the nearest whole millisecond, ties to even
pub fn round_to_millis(duration: Duration) -> Duration {
    let nanos = duration.as_nanos();
    let mut millis = nanos / NANOS_PER_MILLI;
    let rem = nanos % NANOS_PER_MILLI;
    let half = NANOS_PER_MILLI / 2;
    if rem > half || (rem == half && millis % 2 == 1) {
        millis += 1;
    }
    Duration::from_millis(millis as u64)
}

/// Divide a duration by a speed multiplier (1.0 = unchanged, 1.25 = 25% faster)
///
/// The result is truncated to whole nanoseconds.
pub fn apply_speed(duration: Duration, speed: f64) -> Duration {
    debug_assert!(speed > 0.0 && speed.is_finite(), "speed must be positive, got {}", speed);
    Duration::from_nanos((duration.as_nanos() as f64 / speed) as u64)
}

/// Multiply a duration by a scalar, truncated to whole nanoseconds
pub fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::from_nanos((duration.as_nanos() as f64 * factor.max(0.0)) as u64)
}

/// Milliseconds as a float, for log fields and rates
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / NANOS_PER_MILLI as f64
}
