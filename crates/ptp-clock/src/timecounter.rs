//! Cycle counter to nanosecond time counter conversion.
//!
//! A [`CycleCounter`] describes a free-running hardware counter (width
//! mask plus a `mult >> shift` scale to nanoseconds). A [`TimeCounter`]
//! accumulates counter deltas into a 64-bit nanosecond value anchored
//! at `init`, carrying sub-nanosecond remainders between reads.
//!
//! The ThunderX PTP counter already counts nanoseconds (hardware adds the
//! compensation value each cycle), so the engine uses the identity scale.

/// Anything that can produce the current raw counter value.
pub trait CycleSource {
    /// Read the raw counter.
    fn read_cycles(&self) -> u64;
}

impl<F: Fn() -> u64> CycleSource for F {
    fn read_cycles(&self) -> u64 {
        self()
    }
}

/// Description of a hardware cycle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounter {
    /// Width mask applied to counter deltas.
    pub mask: u64,
    /// Cycle to nanosecond multiplier.
    pub mult: u32,
    /// Cycle to nanosecond shift.
    pub shift: u32,
}

impl CycleCounter {
    /// Full 64-bit counter that already counts nanoseconds.
    pub const IDENTITY_64: Self = Self {
        mask: u64::MAX,
        mult: 1,
        shift: 0,
    };

    /// Mask covering the low `bits` bits.
    #[must_use]
    pub const fn mask_bits(bits: u32) -> u64 {
        if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }

    /// Convert a cycle delta to nanoseconds, updating the fractional carry.
    fn cyc2ns(&self, cycles: u64, frac_mask: u64, frac: &mut u64) -> u64 {
        let ns = u128::from(cycles) * u128::from(self.mult) + u128::from(*frac);
        *frac = (ns as u64) & frac_mask;
        (ns >> self.shift) as u64
    }

    /// Convert a cycle delta behind the anchor to nanoseconds.
    fn cyc2ns_backwards(&self, cycles: u64, frac: u64) -> u64 {
        let ns = (u128::from(cycles) * u128::from(self.mult)).saturating_sub(u128::from(frac));
        (ns >> self.shift) as u64
    }
}

impl Default for CycleCounter {
    fn default() -> Self {
        Self::IDENTITY_64
    }
}

/// Nanosecond clock derived from a [`CycleCounter`].
#[derive(Debug, Clone, Default)]
pub struct TimeCounter {
    cc: CycleCounter,
    /// Counter value at the last read.
    cycle_last: u64,
    /// Nanoseconds at `cycle_last`.
    nsec: u64,
    /// Mask of the fractional bits below `shift`.
    frac_mask: u64,
    /// Accumulated fractional nanoseconds.
    frac: u64,
}

impl TimeCounter {
    /// Create a counter anchored at `start_ns` for the current counter value.
    pub fn new(cc: CycleCounter, source: &impl CycleSource, start_ns: u64) -> Self {
        let mut tc = Self {
            cc,
            ..Self::default()
        };
        tc.init(source, start_ns);
        tc
    }

    /// Re-anchor the nanosecond domain to `start_ns` at the current counter value.
    ///
    /// Discards fractional history.
    pub fn init(&mut self, source: &impl CycleSource, start_ns: u64) {
        self.cycle_last = source.read_cycles();
        self.nsec = start_ns;
        self.frac_mask = CycleCounter::mask_bits(self.cc.shift);
        self.frac = 0;
    }

    /// Nanoseconds elapsed since the previous read; advances the anchor.
    fn read_delta(&mut self, source: &impl CycleSource) -> u64 {
        let cycle_now = source.read_cycles();
        let delta = cycle_now.wrapping_sub(self.cycle_last) & self.cc.mask;
        let ns = self.cc.cyc2ns(delta, self.frac_mask, &mut self.frac);
        self.cycle_last = cycle_now;
        ns
    }

    /// Read the current time in nanoseconds.
    pub fn read(&mut self, source: &impl CycleSource) -> u64 {
        let ns = self.read_delta(source);
        self.nsec = self.nsec.wrapping_add(ns);
        self.nsec
    }

    /// Step the nanosecond domain by `delta_ns` without re-anchoring.
    pub fn adjust(&mut self, delta_ns: i64) {
        self.nsec = self.nsec.wrapping_add_signed(delta_ns);
    }

    /// Convert a raw counter value captured elsewhere into nanoseconds.
    ///
    /// Values up to half the counter range behind the anchor are treated
    /// as being in the past rather than wrapped into the future.
    #[must_use]
    pub fn cyc2time(&self, cycle_tstamp: u64) -> u64 {
        let delta = cycle_tstamp.wrapping_sub(self.cycle_last) & self.cc.mask;

        if delta > self.cc.mask / 2 {
            let behind = self.cycle_last.wrapping_sub(cycle_tstamp) & self.cc.mask;
            self.nsec
                .wrapping_sub(self.cc.cyc2ns_backwards(behind, self.frac))
        } else {
            let mut frac = self.frac;
            self.nsec
                .wrapping_add(self.cc.cyc2ns(delta, self.frac_mask, &mut frac))
        }
    }

    /// Nanoseconds at the last read, without touching the hardware.
    #[must_use]
    pub fn last_nsec(&self) -> u64 {
        self.nsec
    }

    /// Counter value at the last read.
    #[must_use]
    pub fn cycle_last(&self) -> u64 {
        self.cycle_last
    }
}
