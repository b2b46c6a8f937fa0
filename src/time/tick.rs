/*
 * Timer Tick Servicing
 *
 * The interrupt-context routine behind the periodic timer interrupt. Each
 * tick samples the cycle counter, hands the current boot-relative time to
 * the scheduler's sleeper wakeup, acknowledges the interrupt, accounts CPU
 * usage at a coarser interval than the tick itself, propagates the tick to
 * the other processors, and finally invokes the scheduler's preemption
 * entry point.
 *
 * The handler is a two-state machine: Idle between interrupts, Servicing
 * while the handler runs. The final task switch may resume a different
 * context than the one that was interrupted; the epilogue (Servicing back
 * to Idle) still executes exactly once per tick, in whichever context
 * control resumes. The interrupt source is edge-triggered and acknowledged
 * mid-service, and nested delivery is assumed not to happen: the handler
 * never blocks and all hardware waits happen during boot calibration only.
 *
 * None of the outcalls report errors. An uninitialized collaborator is a
 * boot-ordering violation, not a runtime fault.
 */

use super::convert::{self, SUBSECONDS_PER_SECOND};
use super::{CycleCounter, SystemClock};

/// IRQ line of the periodic timer.
pub const TIMER_IRQ: u8 = 0;

/// Scaled-microsecond gap between CPU usage accounting updates. Ticks fire
/// more often than usage is accounted; a quarter second of elapsed counter
/// time has to pass before the next accounting call.
const USAGE_INTERVAL: u64 = SUBSECONDS_PER_SECOND / 4;

/// Kernel collaborators invoked while servicing a tick.
///
/// The clock core supplies current time and drives the calls in a fixed
/// order; it never inspects or stores scheduler state itself.
pub trait TickHooks {
    /// Requeue blocked tasks whose deadlines are at or before the given
    /// boot-relative time.
    fn wakeup_sleepers(&mut self, seconds: u64, subseconds: u64);

    /// Acknowledge the timer interrupt at the interrupt controller.
    fn irq_ack(&mut self, irq: u8);

    /// Charge the elapsed scaled-microsecond delta of CPU time, at the
    /// given counter rate, to the running tasks.
    fn update_process_usage(&mut self, elapsed: u64, frequency_mhz: u64);

    /// Fan the tick out to the other processors. Fire-and-forget.
    fn propagate_tick(&mut self);

    /// Enter the scheduler; may switch away from the current task. Control
    /// returns here once this logical task is resumed.
    fn switch_task(&mut self, preempt: bool);
}

/// Tick handler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// Between interrupts.
    Idle,
    /// Executing the handler.
    Servicing,
}

impl<C: CycleCounter> SystemClock<C> {
    /// Steps of tick service that precede the task switch: time
    /// advancement, sleeper wakeup, interrupt acknowledgment, usage
    /// accounting, and tick propagation.
    ///
    /// Kept separate from [`SystemClock::end_tick`] so the global entry
    /// point can release the clock before the switch.
    pub(crate) fn begin_tick(&mut self, hooks: &mut impl TickHooks) {
        debug_assert_eq!(self.phase, TickPhase::Idle);
        self.phase = TickPhase::Servicing;

        let scaled = self.sample().0 / self.state.frequency_mhz;
        let now = convert::split_scaled(scaled, &self.state);
        hooks.wakeup_sleepers(now.seconds, u64::from(now.subseconds));

        // Acknowledge before anything below could permit re-delivery.
        hooks.irq_ack(TIMER_IRQ);

        if self.state.usage_basis_cycles + USAGE_INTERVAL <= scaled {
            hooks.update_process_usage(
                scaled - self.state.usage_basis_cycles,
                self.state.frequency_mhz,
            );
            self.state.usage_basis_cycles = scaled;
        }

        hooks.propagate_tick();
    }

    /// Tick epilogue: the Servicing state ends here, exactly once per
    /// interrupt, regardless of which context the task switch resumed.
    pub(crate) fn end_tick(&mut self) {
        self.phase = TickPhase::Idle;
        self.ticks_serviced += 1;
    }

    /// Service one timer interrupt start to finish.
    pub fn service_tick(&mut self, hooks: &mut impl TickHooks) {
        self.begin_tick(hooks);
        hooks.switch_task(true);
        self.end_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CAL_BASIS, CAL_MHZ, HookCall, RecordingHooks, calibrated_clock};

    /// Raw counter value whose scaled reading sits `offset` microseconds
    /// past the calibration basis.
    fn raw_at(offset: u64) -> u64 {
        (CAL_BASIS + offset) * CAL_MHZ
    }

    #[test]
    fn test_tick_dispatch_order() {
        let mut clock = calibrated_clock(&[raw_at(3_250_000)]);
        let mut hooks = RecordingHooks::default();
        clock.service_tick(&mut hooks);

        assert_eq!(
            hooks.calls,
            [
                HookCall::WakeupSleepers {
                    seconds: 3,
                    subseconds: 250_000
                },
                HookCall::IrqAck(TIMER_IRQ),
                HookCall::UpdateProcessUsage {
                    elapsed: 3_250_000,
                    frequency_mhz: CAL_MHZ
                },
                HookCall::PropagateTick,
                HookCall::SwitchTask { preempt: true },
            ]
        );
    }

    #[test]
    fn test_usage_accounted_only_past_quarter_second() {
        let mut clock = calibrated_clock(&[
            raw_at(300_000), // first tick: past the interval, accounted
            raw_at(400_000), // 100ms since checkpoint: skipped
            raw_at(549_999), // 249.999ms: still short
            raw_at(550_000), // exactly a quarter second: accounted
        ]);

        let mut hooks = RecordingHooks::default();
        for _ in 0..4 {
            clock.service_tick(&mut hooks);
        }

        let usage: Vec<_> = hooks
            .calls
            .iter()
            .filter(|call| matches!(call, HookCall::UpdateProcessUsage { .. }))
            .collect();
        assert_eq!(
            usage,
            [
                &HookCall::UpdateProcessUsage {
                    elapsed: 300_000,
                    frequency_mhz: CAL_MHZ
                },
                &HookCall::UpdateProcessUsage {
                    elapsed: 250_000,
                    frequency_mhz: CAL_MHZ
                },
            ]
        );
    }

    #[test]
    fn test_epilogue_runs_once_per_tick() {
        let mut clock = calibrated_clock(&[raw_at(10_000), raw_at(20_000), raw_at(30_000)]);
        let mut hooks = RecordingHooks::default();

        assert_eq!(clock.tick_phase(), TickPhase::Idle);
        for expected in 1..=3 {
            clock.service_tick(&mut hooks);
            assert_eq!(clock.tick_phase(), TickPhase::Idle);
            assert_eq!(clock.ticks_serviced(), expected);
        }
    }

    #[test]
    fn test_handler_is_servicing_until_after_switch() {
        let mut clock = calibrated_clock(&[raw_at(1_000)]);
        let mut hooks = RecordingHooks::default();
        clock.begin_tick(&mut hooks);
        assert_eq!(clock.tick_phase(), TickPhase::Servicing);
        hooks.switch_task(true);
        clock.end_tick();
        assert_eq!(clock.tick_phase(), TickPhase::Idle);
        assert_eq!(clock.ticks_serviced(), 1);
    }
}
