/*
 * System Controller Drivers
 *
 * Drivers for the two system-board timekeeping devices consumed at boot:
 * the battery-backed CMOS real-time clock (wall-clock epoch) and PIT
 * channel 2 (the known-duration pulse the timestamp counter is calibrated
 * against). Both run exactly once, before interrupts are enabled.
 */

pub mod pit;
pub mod rtc;
