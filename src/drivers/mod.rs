/*
 * Hardware Drivers
 *
 * Drivers for the hardware the clock core depends on. Everything here is
 * written against the `io::PortBus` capability rather than raw IN/OUT, so
 * the register protocols can be exercised under test with a scripted bus.
 *
 * Driver categories:
 * - System: CMOS RTC and PIT calibration channel
 */

pub mod system;
