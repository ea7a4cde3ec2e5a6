//! Adjustment bookkeeping for diagnostics.

use serde::Serialize;

/// Counters describing how a PTP stack has been steering the clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdjustmentStats {
    /// Number of `set_time` calls (epochs started).
    pub time_sets: u64,
    /// Number of `adjust_time` offset steps.
    pub time_steps: u64,
    /// Sum of all offset steps in nanoseconds.
    pub cumulative_step_ns: i64,
    /// Number of programmed frequency trims.
    pub freq_adjustments: u64,
    /// Last programmed trim in parts per billion.
    pub last_ppb: i32,
    /// Trims refused as out of range.
    pub rejected_adjustments: u64,
    /// Trims saturated to `max_adj`.
    pub clamped_adjustments: u64,
}

impl AdjustmentStats {
    /// Record an offset step.
    pub fn record_step(&mut self, delta_ns: i64) {
        self.time_steps += 1;
        self.cumulative_step_ns = self.cumulative_step_ns.wrapping_add(delta_ns);
    }

    /// Record a re-anchor.
    pub fn record_set(&mut self) {
        self.time_sets += 1;
    }

    /// Record a programmed frequency trim.
    pub fn record_trim(&mut self, ppb: i32, clamped: bool) {
        self.freq_adjustments += 1;
        self.last_ppb = ppb;
        if clamped {
            self.clamped_adjustments += 1;
        }
    }

    /// Record a refused frequency trim.
    pub fn record_rejected(&mut self) {
        self.rejected_adjustments += 1;
    }
}
