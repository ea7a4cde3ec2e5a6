//! Hardware access layer for the ThunderX PTP clock.
//!
//! This crate provides:
//! - [`RegisterAccess`] capability for 64-bit register reads and writes
//! - [`ClockVariant`] per-chip callback table consumed by the clock engine
//! - [`regs`] module with the PTP and RST register maps
//! - [`mmio`] module with memory-mapped register windows
//! - [`rst`] module with the reset/fuses block and clock rate resolver
//! - [`sim`] module with simulated hardware for testing

pub mod mmio;
pub mod regs;
pub mod rst;
pub mod sim;

pub use mmio::*;
pub use rst::*;
pub use sim::*;

use std::sync::Arc;

/// Register read/write capability bound to one hardware instance.
///
/// Offsets are byte offsets relative to the instance's base address.
/// This is the only place hardware addressing knowledge lives.
pub trait RegisterAccess: Send + Sync {
    /// Read the 64-bit register at `offset`.
    fn read(&self, offset: u64) -> u64;

    /// Write `value` to the 64-bit register at `offset`.
    fn write(&self, offset: u64, value: u64);

    /// Read-modify-write helper: set the bits in `mask`.
    fn set_bits(&self, offset: u64, mask: u64) {
        let value = self.read(offset);
        self.write(offset, value | mask);
    }

    /// Read-modify-write helper: clear the bits in `mask`.
    fn clear_bits(&self, offset: u64, mask: u64) {
        let value = self.read(offset);
        self.write(offset, value & !mask);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &T {
    fn read(&self, offset: u64) -> u64 {
        (**self).read(offset)
    }

    fn write(&self, offset: u64, value: u64) {
        (**self).write(offset, value);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for Arc<T> {
    fn read(&self, offset: u64) -> u64 {
        (**self).read(offset)
    }

    fn write(&self, offset: u64, value: u64) {
        (**self).write(offset, value);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for Box<T> {
    fn read(&self, offset: u64) -> u64 {
        (**self).read(offset)
    }

    fn write(&self, offset: u64, value: u64) {
        (**self).write(offset, value);
    }
}

/// Per-chip callback table for a PTP clock block.
///
/// Chip families differ only in how registers are reached and in
/// whether their packet engine wants to hear about offset steps.
pub trait ClockVariant: RegisterAccess {
    /// Human-readable clock name, reported to the clock service when the
    /// configured name is empty.
    fn name(&self) -> &str;

    /// Called after an offset step of `delta_ns` has been applied.
    ///
    /// Packet engines that capture raw counter timestamps use this
    /// to shift their own correlation. Default: no-op.
    fn adjust_time_hook(&self, _delta_ns: i64) {}
}

impl<T: ClockVariant + ?Sized> ClockVariant for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn adjust_time_hook(&self, delta_ns: i64) {
        (**self).adjust_time_hook(delta_ns);
    }
}
