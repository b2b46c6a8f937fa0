/*
 * System Time
 *
 * Clock state and the time queries built on it. At boot the RTC supplies
 * the wall-clock epoch and the PIT calibration run supplies the cycle
 * counter rate; both are sealed into a `ClockState` and every later time
 * query is a pure function of that state plus a fresh counter sample.
 *
 * The state lives in an owned `SystemClock` context passed by reference,
 * not in free-standing module statics. The kernel-global instance at the
 * bottom of this module wraps one `SystemClock<Tsc>` in a spin mutex; the
 * epoch, rate, and basis are write-once at calibration, and the usage
 * checkpoint has a single writer (the tick handler on the owning
 * processor). Other processors learn of ticks only through the propagation
 * hook, never by reading this state directly.
 *
 * Pre-calibration queries return zero: an epoch of zero is the checked
 * "calibration has not run" sentinel, not an error.
 */

pub mod convert;
pub mod tick;

pub use convert::{SUBSECONDS_PER_SECOND, TimeSplit};
pub use tick::{TIMER_IRQ, TickHooks, TickPhase};

use crate::drivers::system::{pit, rtc};
use crate::io::PortBus;

/// One raw reading of the free-running cycle counter. Only differences
/// between samples taken on the same logical processor carry meaning.
#[derive(Debug, Clone, Copy)]
pub struct RawSample(pub u64);

/// Capability to read the free-running cycle counter.
///
/// Production code uses `arch::x86_64::tsc::Tsc`; tests script the samples.
pub trait CycleCounter {
    fn read(&self) -> RawSample;
}

/// Calibrated clock parameters.
///
/// `epoch_seconds`, `frequency_mhz`, and `basis_cycles` are immutable once
/// `SystemClock::calibrate` seals them. `usage_basis_cycles` moves forward
/// only, and only from the tick handler.
pub struct ClockState {
    /// Wall-clock seconds at boot. Zero means calibration has not run.
    epoch_seconds: u64,
    /// Cycle counter rate in cycles per microsecond.
    frequency_mhz: u64,
    /// Counter sample at boot, scaled to microsecond units; time-since-boot
    /// zero.
    basis_cycles: u64,
    /// Scaled counter value of the last CPU usage accounting checkpoint.
    usage_basis_cycles: u64,
}

impl ClockState {
    /// Unsealed state: epoch sentinel zero, fallback rate so conversion
    /// arithmetic stays total even if queried out of order.
    pub(crate) const fn new() -> Self {
        ClockState {
            epoch_seconds: 0,
            frequency_mhz: pit::FALLBACK_MHZ,
            basis_cycles: 0,
            usage_basis_cycles: 0,
        }
    }
}

/// The clock core's context: sealed parameters plus the counter they were
/// calibrated against.
pub struct SystemClock<C> {
    state: ClockState,
    counter: C,
    phase: TickPhase,
    ticks_serviced: u64,
}

impl<C: CycleCounter> SystemClock<C> {
    pub const fn new(counter: C) -> Self {
        SystemClock {
            state: ClockState::new(),
            counter,
            phase: TickPhase::Idle,
            ticks_serviced: 0,
        }
    }

    /// Read the boot epoch from the RTC, calibrate the cycle counter
    /// against the PIT pulse, and seal the clock. Runs exactly once, before
    /// interrupts are enabled.
    pub fn calibrate(&mut self, ports: &mut impl PortBus) {
        log::info!("clock: calibrating cycle counter");
        let epoch_seconds = rtc::read_epoch(ports);
        let calibration = pit::calibrate(ports, &self.counter);

        self.state.epoch_seconds = epoch_seconds;
        self.state.frequency_mhz = calibration.frequency_mhz;
        self.state.basis_cycles = calibration.basis_cycles;
        self.state.usage_basis_cycles = calibration.basis_cycles;

        log::info!("clock: cycle counter timed at {} MHz", self.state.frequency_mhz);
        log::info!("clock: boot time is {}s", self.state.epoch_seconds);
        log::info!("clock: counter basis is {}us", self.state.basis_cycles);
    }

    /// Whether calibration has sealed the clock.
    pub fn is_calibrated(&self) -> bool {
        self.state.epoch_seconds != 0
    }

    pub(crate) fn sample(&self) -> RawSample {
        self.counter.read()
    }

    /// Time since boot. Zero before calibration.
    pub fn uptime(&self) -> TimeSplit {
        if !self.is_calibrated() {
            return TimeSplit::ZERO;
        }
        convert::split(self.sample(), &self.state)
    }

    /// Wall-clock time as (seconds since the Unix epoch, microseconds).
    /// `(0, 0)` before calibration.
    pub fn wall_clock(&self) -> (u64, u64) {
        if !self.is_calibrated() {
            return (0, 0);
        }
        convert::wall_clock(self.sample(), &self.state)
    }

    /// Current wall-clock seconds.
    pub fn now(&self) -> u64 {
        self.wall_clock().0
    }

    /// Absolute boot-relative deadline for a relative duration from now.
    /// Zero before calibration.
    pub fn deadline_after(&self, seconds: u64, subseconds: u64) -> TimeSplit {
        if !self.is_calibrated() {
            return TimeSplit::ZERO;
        }
        convert::split(self.sample(), &self.state).plus(seconds, subseconds)
    }

    /// Calibrated counter rate in cycles per microsecond.
    pub fn frequency_mhz(&self) -> u64 {
        self.state.frequency_mhz
    }

    /// Wall-clock seconds at boot.
    pub fn boot_epoch_seconds(&self) -> u64 {
        self.state.epoch_seconds
    }

    /// Number of timer interrupts fully serviced.
    pub fn ticks_serviced(&self) -> u64 {
        self.ticks_serviced
    }

    pub fn tick_phase(&self) -> TickPhase {
        self.phase
    }
}

#[cfg(target_arch = "x86_64")]
mod system {
    use spin::Mutex;
    use x86_64::instructions::interrupts;

    use super::{SystemClock, TickHooks, TimeSplit};
    use crate::arch::x86_64::tsc::Tsc;
    use crate::io::PioBus;

    /// The kernel-global clock. None until `init` seals a calibrated
    /// instance.
    static SYSTEM_CLOCK: Mutex<Option<SystemClock<Tsc>>> = Mutex::new(None);

    /// Calibrate the system clock and install it. Must run before
    /// interrupts are enabled; the first tick assumes a sealed clock.
    pub fn init() {
        let mut ports = PioBus;
        let mut clock = SystemClock::new(Tsc);
        clock.calibrate(&mut ports);
        interrupts::without_interrupts(|| {
            *SYSTEM_CLOCK.lock() = Some(clock);
        });
    }

    /// Current wall-clock time as (seconds, microseconds). `(0, 0)` before
    /// `init`.
    pub fn current_wall_time() -> (u64, u64) {
        interrupts::without_interrupts(|| {
            SYSTEM_CLOCK
                .lock()
                .as_ref()
                .map(|clock| clock.wall_clock())
                .unwrap_or((0, 0))
        })
    }

    /// Current wall-clock seconds.
    pub fn now() -> u64 {
        current_wall_time().0
    }

    /// Absolute boot-relative deadline for a relative duration from now.
    pub fn deadline_after(seconds: u64, subseconds: u64) -> TimeSplit {
        interrupts::without_interrupts(|| {
            SYSTEM_CLOCK
                .lock()
                .as_ref()
                .map(|clock| clock.deadline_after(seconds, subseconds))
                .unwrap_or(TimeSplit::ZERO)
        })
    }

    /// Timer interrupt (IRQ0) entry point. Runs in interrupt context with
    /// interrupts disabled, so the clock lock is taken directly.
    pub fn handle_timer_interrupt(hooks: &mut impl TickHooks) {
        {
            let mut clock = SYSTEM_CLOCK.lock();
            match clock.as_mut() {
                Some(clock) => clock.begin_tick(hooks),
                None => return,
            }
        }

        // The switch may resume a different context than the one that was
        // interrupted; the clock lock must not be held across it.
        hooks.switch_task(true);

        {
            let mut clock = SYSTEM_CLOCK.lock();
            if let Some(clock) = clock.as_mut() {
                clock.end_tick();
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub use system::{current_wall_time, deadline_after, handle_timer_interrupt, init, now};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CAL_BASIS, CAL_MHZ, EPOCH_2024, FakeCounter, calibrated_clock};

    #[test]
    fn test_queries_before_calibration_return_zero() {
        let clock = SystemClock::new(FakeCounter::new(&[123_456_789]));
        assert!(!clock.is_calibrated());
        assert_eq!(clock.wall_clock(), (0, 0));
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.uptime(), TimeSplit::ZERO);
        assert_eq!(clock.deadline_after(5, 999_999), TimeSplit::ZERO);
    }

    #[test]
    fn test_calibrate_seals_epoch_and_rate() {
        let clock = calibrated_clock(&[]);
        assert!(clock.is_calibrated());
        assert_eq!(clock.boot_epoch_seconds(), EPOCH_2024);
        assert_eq!(clock.frequency_mhz(), CAL_MHZ);
    }

    #[test]
    fn test_wall_clock_tracks_counter() {
        let raw = (CAL_BASIS + 90_000_123) * CAL_MHZ;
        let clock = calibrated_clock(&[raw]);
        assert_eq!(clock.wall_clock(), (EPOCH_2024 + 90, 123));
    }

    #[test]
    fn test_deadline_after_carries_from_current_time() {
        let raw = (CAL_BASIS + 10_900_000) * CAL_MHZ;
        let clock = calibrated_clock(&[raw]);
        // Now is 10.9s since boot; 300ms more lands at 11.2s.
        assert_eq!(
            clock.deadline_after(0, 300_000),
            TimeSplit {
                seconds: 11,
                subseconds: 200_000
            }
        );
    }
}
