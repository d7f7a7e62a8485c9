//! Simulated-time bookkeeping.
//!
//! Every duration inside the core is an integer number of ticks of 1 / 2^23
//! second. One CPU base cycle is 2 ticks at normal speed and 1 tick in double
//! speed mode, and the divider/timer/PPU periods are all exact multiples of a
//! tick, so no floating point is needed anywhere. Conversion to and from wall
//! clock time happens only at the scheduler boundary.

use std::time::Duration;

pub const TICKS_PER_SECOND: u64 = 1 << 23;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

pub fn ticks_to_duration(ticks: u64) -> Duration {
    let nanos = u128::from(ticks) * NANOS_PER_SECOND / u128::from(TICKS_PER_SECOND);
    Duration::from_nanos(nanos as u64)
}

pub fn duration_to_ticks(duration: Duration) -> u64 {
    (duration.as_nanos() * u128::from(TICKS_PER_SECOND) / NANOS_PER_SECOND) as u64
}
