/*
 * PIT Channel 2 Calibration
 *
 * Derives the timestamp counter's rate by bracketing a known-duration
 * hardware pulse. Channel 2 of the 8254 timer is the only gated channel:
 * its countdown starts on a rising gate edge (port 0x61 bit 0) and its
 * output level (port 0x61 bit 5) flips when the countdown expires.
 *
 * One calibration run:
 * 1. Raise the gate and silence the speaker while the channel is programmed.
 * 2. Program channel 2 as a one-shot and load the pulse divisor, low byte
 *    then high byte.
 * 3. Drop and raise the gate to arm the one-shot, then sample the counter.
 * 4. Poll the output until the pulse completes, then sample again.
 *
 * The output level at pulse start is platform-variant: QEMU and VirtualBox
 * start low, real hardware and VMware start high. The initial level is
 * sampled and the complementary edge awaited, rather than assuming one
 * polarity.
 *
 * The divisor is 2983 ticks of the 1.193182 MHz PIT base clock, a 2.5 ms
 * pulse, so dividing the measured cycle delta by 2500 yields cycles per
 * microsecond directly.
 */

use bitflags::bitflags;

use crate::io::PortBus;
use crate::time::CycleCounter;

const PIT_CHANNEL2_DATA: u16 = 0x42;
const PIT_MODE_COMMAND: u16 = 0x43;
const SETTLE_PORT: u16 = 0x60;
const SYSTEM_CONTROL: u16 = 0x61;

/// Channel 2, lo/hi byte access, mode 1 (hardware one-shot), binary.
const CHANNEL2_ONE_SHOT: u8 = 0xB2;

/// 2983 ticks of the 1.193182 MHz base clock: a 2.5 ms gate pulse.
const PULSE_DIVISOR: u16 = 0x0BA7;

/// Length of the calibration pulse in microseconds.
const PULSE_MICROS: u64 = 2_500;

/// Rate assumed when the measurement collapses to zero, so later time
/// conversion never divides by zero.
pub const FALLBACK_MHZ: u64 = 2000;

bitflags! {
    /// System control port (0x61) bits touched during calibration.
    #[derive(Clone, Copy)]
    struct Control: u8 {
        const GATE2 = 1 << 0;
        const SPEAKER = 1 << 1;
        const OUT2 = 1 << 5;
    }
}

/// Result of a calibration run.
pub struct Calibration {
    /// Cycle counter rate in cycles per microsecond.
    pub frequency_mhz: u64,
    /// Pre-pulse counter sample scaled to microsecond units; the origin for
    /// time-since-boot.
    pub basis_cycles: u64,
}

fn control(ports: &mut impl PortBus) -> Control {
    Control::from_bits_truncate(ports.read(SYSTEM_CONTROL))
}

/// Run the one-shot pulse and derive the counter frequency.
///
/// Invoked exactly once at boot, before interrupts are enabled; the edge
/// polls below busy-wait with no timeout. A stalled timer chip hangs boot
/// rather than sealing an unverified rate.
pub fn calibrate(ports: &mut impl PortBus, counter: &impl CycleCounter) -> Calibration {
    // Silence the speaker and raise the gate while the channel is programmed.
    let ctl = control(ports);
    ports.write(
        SYSTEM_CONTROL,
        ((ctl - Control::SPEAKER - Control::OUT2) | Control::GATE2).bits(),
    );

    ports.write(PIT_MODE_COMMAND, CHANNEL2_ONE_SHOT);
    ports.write(PIT_CHANNEL2_DATA, (PULSE_DIVISOR & 0xFF) as u8);
    // Settle between the two divisor bytes.
    let _ = ports.read(SETTLE_PORT);
    ports.write(PIT_CHANNEL2_DATA, (PULSE_DIVISOR >> 8) as u8);

    // Mode 1 arms on a rising gate edge: drop the gate, then raise it.
    let ctl = control(ports);
    ports.write(SYSTEM_CONTROL, (ctl - Control::GATE2 - Control::OUT2).bits());
    ports.write(
        SYSTEM_CONTROL,
        ((ctl - Control::OUT2) | Control::GATE2).bits(),
    );

    let start = counter.read().0;

    // The output level at pulse start differs across platforms; wait for
    // whichever edge is the complement of the level observed now.
    if control(ports).contains(Control::OUT2) {
        while control(ports).contains(Control::OUT2) {}
    } else {
        while !control(ports).contains(Control::OUT2) {}
    }

    let end = counter.read().0;
    let delta = end.saturating_sub(start);

    let mut frequency_mhz = delta / PULSE_MICROS;
    if frequency_mhz == 0 {
        log::warn!(
            "clock: implausible calibration delta of {} cycles, assuming {} MHz",
            delta,
            FALLBACK_MHZ
        );
        frequency_mhz = FALLBACK_MHZ;
    }

    Calibration {
        frequency_mhz,
        basis_cycles: start / frequency_mhz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCounter, PulseFixture};

    #[test]
    fn test_calibrate_derives_mhz_from_pulse() {
        // 5_000_000 cycles across the 2.5 ms pulse: 2000 cycles/us.
        let mut pulse = PulseFixture::new(false, 3);
        let counter = FakeCounter::new(&[10_000_000, 15_000_000]);
        let calibration = calibrate(&mut pulse, &counter);
        assert_eq!(calibration.frequency_mhz, 2000);
        assert_eq!(calibration.basis_cycles, 10_000_000 / 2000);
        assert_eq!(pulse.divisor(), Some(PULSE_DIVISOR));
        assert_eq!(pulse.command(), Some(CHANNEL2_ONE_SHOT));
    }

    #[test]
    fn test_calibrate_handles_either_gate_polarity() {
        for initial_high in [false, true] {
            let mut pulse = PulseFixture::new(initial_high, 7);
            let counter = FakeCounter::new(&[0, 2_500_000]);
            let calibration = calibrate(&mut pulse, &counter);
            assert_eq!(calibration.frequency_mhz, 1000);
        }
    }

    #[test]
    fn test_zero_delta_falls_back_to_default_rate() {
        let mut pulse = PulseFixture::new(true, 1);
        let counter = FakeCounter::new(&[40_000, 40_000]);
        let calibration = calibrate(&mut pulse, &counter);
        assert_eq!(calibration.frequency_mhz, FALLBACK_MHZ);
        assert_eq!(calibration.basis_cycles, 40_000 / FALLBACK_MHZ);
    }
}
