/*
 * Tempus Kernel Clock Core
 *
 * Timekeeping and timer tick dispatch for the Tempus kernel. This crate
 * establishes the wall clock at boot by reading the battery-backed CMOS RTC,
 * calibrates the CPU timestamp counter against a PIT channel 2 reference
 * pulse, and services the periodic timer interrupt: it advances time, wakes
 * sleeping tasks whose deadlines have elapsed, accounts CPU usage, and hands
 * control to the scheduler for preemption.
 *
 * Subsystem map:
 * - io: port I/O primitives and the byte-bus interface drivers run on
 * - drivers/system: CMOS RTC epoch reader and PIT channel 2 calibrator
 * - arch/x86_64: timestamp counter access
 * - time: clock state, time conversion, and the tick handler
 *
 * Boot ordering contract: `time::init()` runs before interrupts are enabled.
 * The first timer interrupt and the first wall-clock query both assume a
 * sealed, calibrated clock; queries issued earlier return zero instead of
 * doing arithmetic on uninitialized state.
 */

#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

pub mod arch;
pub mod drivers;
pub mod io;
pub mod time;

#[cfg(test)]
mod testing;

pub use time::{CycleCounter, RawSample, SystemClock, TickHooks, TickPhase, TimeSplit};
