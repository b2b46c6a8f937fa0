/*
 * Architecture Abstraction Layer
 *
 * Architecture-specific pieces of the clock core. Currently x86_64 only:
 * the timestamp counter used as the free-running monotonic time source.
 * Portable code reaches it through the `time::CycleCounter` capability.
 */

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
