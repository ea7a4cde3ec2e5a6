//! Simulated PTP and RST hardware for testing without a ThunderX SoC.
//!
//! The PTP model follows the real block: while the enable bit is set,
//! every coprocessor cycle adds the Q32.32 compensation value to the
//! nanosecond counter, carrying the fractional part between cycles.
//! Time only moves when the test calls [`SimulatedRegisters::advance_cycles`],
//! which keeps tests deterministic.

use crate::regs;
use crate::{ClockVariant, RegisterAccess};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Counter state updated atomically as a unit.
#[derive(Debug, Default)]
struct Counter {
    /// Whole nanoseconds (`PTP_CLOCK_HI`).
    hi: u64,
    /// Fractional nanoseconds, low 32 bits (`PTP_CLOCK_LO`).
    frac: u64,
}

#[derive(Debug, Default)]
struct SimState {
    cfg: AtomicU64,
    comp: AtomicU64,
    counter: spin::Mutex<Counter>,
    /// Sum of all offset steps reported through the adjust-time hook.
    hook_total_ns: AtomicI64,
    hook_calls: AtomicU64,
    writes: AtomicU64,
}

/// Simulated PTP clock block.
///
/// Cloning yields another handle to the same simulated hardware, so a
/// test can keep one handle while the clock engine owns the other.
#[derive(Debug, Clone)]
pub struct SimulatedRegisters {
    name: String,
    state: Arc<SimState>,
}

impl SimulatedRegisters {
    /// Create a simulated block with all registers zeroed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(SimState::default()),
        }
    }

    /// Run the hardware for `cycles` coprocessor cycles.
    ///
    /// Has no effect while the enable bit is clear.
    pub fn advance_cycles(&self, cycles: u64) {
        if !self.is_enabled() {
            return;
        }
        let comp = u128::from(self.state.comp.load(Ordering::Acquire));
        let mut counter = self.state.counter.lock();
        let total = u128::from(counter.frac) + comp * u128::from(cycles);
        counter.hi = counter.hi.wrapping_add((total >> 32) as u64);
        counter.frac = (total & 0xFFFF_FFFF) as u64;
    }

    /// Whether the PTP enable bit is currently set.
    pub fn is_enabled(&self) -> bool {
        self.state.cfg.load(Ordering::Acquire) & regs::PTP_CLOCK_CFG_PTP_EN != 0
    }

    /// Raw nanosecond counter value, as a packet engine would latch it.
    pub fn counter(&self) -> u64 {
        self.state.counter.lock().hi
    }

    /// Currently programmed compensation value.
    pub fn compensation(&self) -> u64 {
        self.state.comp.load(Ordering::Acquire)
    }

    /// Sum of offset steps reported through [`ClockVariant::adjust_time_hook`].
    pub fn hook_total_ns(&self) -> i64 {
        self.state.hook_total_ns.load(Ordering::Acquire)
    }

    /// Number of adjust-time hook invocations.
    pub fn hook_calls(&self) -> u64 {
        self.state.hook_calls.load(Ordering::Acquire)
    }

    /// Number of register writes issued so far.
    pub fn write_count(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }
}

impl RegisterAccess for SimulatedRegisters {
    fn read(&self, offset: u64) -> u64 {
        match offset {
            regs::PTP_CLOCK_CFG => self.state.cfg.load(Ordering::Acquire),
            regs::PTP_CLOCK_LO => self.state.counter.lock().frac,
            regs::PTP_CLOCK_HI => self.state.counter.lock().hi,
            regs::PTP_CLOCK_COMP => self.state.comp.load(Ordering::Acquire),
            _ => {
                trace!(offset, "read of unmodelled register");
                0
            }
        }
    }

    fn write(&self, offset: u64, value: u64) {
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        match offset {
            regs::PTP_CLOCK_CFG => self.state.cfg.store(value, Ordering::Release),
            regs::PTP_CLOCK_LO => self.state.counter.lock().frac = value & 0xFFFF_FFFF,
            regs::PTP_CLOCK_HI => self.state.counter.lock().hi = value,
            regs::PTP_CLOCK_COMP => self.state.comp.store(value, Ordering::Release),
            _ => trace!(offset, value, "write to unmodelled register ignored"),
        }
    }
}

impl ClockVariant for SimulatedRegisters {
    fn name(&self) -> &str {
        &self.name
    }

    fn adjust_time_hook(&self, delta_ns: i64) {
        self.state.hook_total_ns.fetch_add(delta_ns, Ordering::AcqRel);
        self.state.hook_calls.fetch_add(1, Ordering::AcqRel);
    }
}

/// Simulated reset/fuses block exposing a fused SCLK multiplier.
#[derive(Debug, Clone)]
pub struct SimulatedRst {
    boot: Arc<AtomicU64>,
}

impl SimulatedRst {
    /// Create an RST block whose `RST_BOOT` carries `multiplier`.
    ///
    /// Unrelated boot bits are set as well so that field extraction
    /// is exercised against a realistic register value.
    pub fn with_multiplier(multiplier: u8) -> Self {
        let field = (u64::from(multiplier) & regs::RST_BOOT_PNR_MUL_MASK)
            << regs::RST_BOOT_PNR_MUL_SHIFT;
        // C_MUL in bits 40..46 and a few low strap bits
        let noise = (0x1E_u64 << 40) | 0x0000_0000_0001_00C3;
        Self {
            boot: Arc::new(AtomicU64::new(field | noise)),
        }
    }

    /// Raw boot register value.
    pub fn boot_register(&self) -> u64 {
        self.boot.load(Ordering::Acquire)
    }
}

impl RegisterAccess for SimulatedRst {
    fn read(&self, offset: u64) -> u64 {
        if offset == regs::RST_BOOT {
            self.boot.load(Ordering::Acquire)
        } else {
            trace!(offset, "read of unmodelled RST register");
            0
        }
    }

    fn write(&self, offset: u64, value: u64) {
        // RST_BOOT is read-only fuse state
        trace!(offset, value, "write to read-only RST block ignored");
    }
}
