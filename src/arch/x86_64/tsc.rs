/*
 * Timestamp Counter
 *
 * Read access to the CPU's free-running cycle counter, the kernel's
 * monotonic time source. The counter increments at a fixed but
 * board-specific rate; drivers/system/pit.rs derives that rate once at boot
 * and time/convert.rs turns raw readings into wall-clock time.
 */

use crate::time::{CycleCounter, RawSample};

/// The CPU timestamp counter.
///
/// RDTSC hands back the 64-bit count in two 32-bit halves; the `x86` crate
/// reassembles them.
pub struct Tsc;

impl CycleCounter for Tsc {
    #[inline(always)]
    fn read(&self) -> RawSample {
        RawSample(unsafe { x86::time::rdtsc() })
    }
}
