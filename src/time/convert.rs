/*
 * Time Conversion
 *
 * Stateless arithmetic turning raw cycle counter samples plus the sealed
 * clock parameters into (seconds, microseconds) pairs, and deadline
 * arithmetic with subsecond carry.
 *
 * Units: a raw sample divided by `frequency_mhz` gives microsecond-scale
 * "scaled" units; subtracting `basis_cycles` (itself scaled) gives
 * microseconds since boot.
 */

use super::{ClockState, RawSample};

pub const SUBSECONDS_PER_SECOND: u64 = 1_000_000;

/// A point on the boot-relative timeline: whole seconds plus microseconds.
///
/// `subseconds` is always below one million. Ordering is lexicographic on
/// (seconds, subseconds), which the field order gives the derived impls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSplit {
    pub seconds: u64,
    pub subseconds: u32,
}

impl TimeSplit {
    pub const ZERO: TimeSplit = TimeSplit {
        seconds: 0,
        subseconds: 0,
    };

    /// Add a relative offset, carrying overflowing subseconds into seconds.
    pub fn plus(self, seconds: u64, subseconds: u64) -> TimeSplit {
        let subseconds = u64::from(self.subseconds) + subseconds;
        TimeSplit {
            seconds: self.seconds + seconds + subseconds / SUBSECONDS_PER_SECOND,
            subseconds: (subseconds % SUBSECONDS_PER_SECOND) as u32,
        }
    }
}

/// Split a raw counter sample into time since boot.
pub fn split(sample: RawSample, state: &ClockState) -> TimeSplit {
    split_scaled(sample.0 / state.frequency_mhz, state)
}

/// Split an already frequency-scaled sample into time since boot.
pub(crate) fn split_scaled(scaled: u64, state: &ClockState) -> TimeSplit {
    let elapsed = scaled.saturating_sub(state.basis_cycles);
    TimeSplit {
        seconds: elapsed / SUBSECONDS_PER_SECOND,
        subseconds: (elapsed % SUBSECONDS_PER_SECOND) as u32,
    }
}

/// Wall-clock time for a raw counter sample: the boot epoch advanced by the
/// time since boot.
pub fn wall_clock(sample: RawSample, state: &ClockState) -> (u64, u64) {
    let split = split(sample, state);
    (
        state.epoch_seconds + split.seconds,
        u64::from(split.subseconds),
    )
}
