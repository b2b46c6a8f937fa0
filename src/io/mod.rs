/*
 * Input/Output System
 *
 * Low-level port I/O and the byte-wide bus interface the system peripheral
 * drivers are written against. Production code backs the bus with real
 * IN/OUT instructions; the test suite substitutes a scripted register file
 * so the RTC debounce and PIT calibration protocols run without hardware.
 */

pub mod pio;

pub use pio::{Io, Pio};

#[cfg(target_arch = "x86_64")]
pub use pio::PioBus;

/// Byte-wide port bus capability.
///
/// The RTC and PIT drivers address hardware exclusively through this trait:
/// one byte read and one byte write at a 16-bit port address.
pub trait PortBus {
    /// Read a byte from the given port.
    fn read(&mut self, port: u16) -> u8;

    /// Write a byte to the given port.
    fn write(&mut self, port: u16, value: u8);
}
