//! Hardware clock engine.
//!
//! [`PtpClock`] turns the free-running PTP counter into a settable,
//! adjustable nanosecond clock:
//!
//! - `get_time` extrapolates from the last anchor using the counter
//! - `set_time` re-anchors and starts a new epoch
//! - `adjust_time` steps the nanosecond domain without re-anchoring
//! - `adjust_frequency` reprograms the Q32.32 compensation register
//!
//! # Threading Model
//!
//! A control-plane thread steers the clock while a packet path reads it
//! for timestamps. All time-counter and compensation state sits behind a
//! single spin lock; critical sections are a handful of register accesses
//! and never block. User space has no interrupt context, so the lock does
//! not need to mask interrupts.
//!
//! The current step offset is additionally published through a
//! cache-padded atomic so packet engines can correlate raw timestamps
//! without taking the lock. That read is best-effort visibility, not a
//! substitute for `get_time`.

use crate::compensation::{adjusted_compensation, base_compensation, bounded_ppb};
use crate::stats::AdjustmentStats;
use crate::timecounter::{CycleCounter, CycleSource, TimeCounter};
use crossbeam_utils::CachePadded;
use ptp_common::config::{ClockConfig, OutOfRangePolicy};
use ptp_common::error::{PtpError, PtpResult};
use ptp_common::state::ClockState;
use ptp_common::time::{wall_clock_ns, Timespec64};
use ptp_hw::{regs, ClockVariant, RegisterAccess};
use serde::Serialize;
use static_assertions::{assert_impl_all, assert_obj_safe};
use std::sync::atomic::{fence, AtomicI64, Ordering};
use tracing::{debug, info, trace, warn};

/// Size of the PHC name buffer, including the terminator.
pub const PHC_NAME_LEN: usize = 16;

/// Static capabilities advertised to the clock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockCaps {
    /// Largest frequency adjustment in parts per billion.
    pub max_adj: u32,
    /// Number of external timestamp channels.
    pub n_ext_ts: u32,
    /// Number of programmable pins.
    pub n_pins: u32,
    /// Whether a PPS event is generated.
    pub pps: bool,
}

/// Ancillary feature requests a PTP stack may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRequest {
    /// Timestamp an external event on channel `index`.
    ExternalTimestamp {
        /// Channel index.
        index: u32,
    },
    /// Periodic output on channel `index`.
    PeriodicOutput {
        /// Channel index.
        index: u32,
    },
    /// Pulse-per-second event.
    Pps,
}

/// Clock operations exposed to a PTP stack and to packet engines.
///
/// Object safe so that a registry can hand out `Arc<dyn PhcClock>`.
pub trait PhcClock: Send + Sync {
    /// Clock name.
    fn name(&self) -> &str;

    /// Advertised capabilities.
    fn caps(&self) -> ClockCaps;

    /// Current time in nanoseconds.
    fn get_time(&self) -> PtpResult<u64>;

    /// Re-anchor the clock to `ns`.
    fn set_time(&self, ns: u64) -> PtpResult<()>;

    /// Step the clock by `delta_ns`.
    fn adjust_time(&self, delta_ns: i64) -> PtpResult<()>;

    /// Trim the frequency by `ppb` parts per billion.
    fn adjust_frequency(&self, ppb: i32) -> PtpResult<()>;

    /// Enable or disable an ancillary feature.
    fn enable_feature(&self, request: ClockRequest, on: bool) -> PtpResult<()>;

    /// Sum of offset steps applied in the current epoch (lock-free).
    fn adjust_offset(&self) -> i64;

    /// Convert a raw counter timestamp into the clock's nanosecond domain.
    fn cycles_to_time(&self, raw: u64) -> PtpResult<u64>;

    /// Current time as a timespec.
    fn gettime64(&self) -> PtpResult<Timespec64> {
        self.get_time().map(Timespec64::from_nanos)
    }

    /// Re-anchor the clock to a timespec.
    fn settime64(&self, ts: &Timespec64) -> PtpResult<()> {
        self.set_time(ts.to_nanos()?)
    }
}

/// Cycle source reading the hardware nanosecond counter.
struct HwCounter<'a, V>(&'a V);

impl<V: RegisterAccess> CycleSource for HwCounter<'_, V> {
    fn read_cycles(&self) -> u64 {
        let raw = self.0.read(regs::PTP_CLOCK_HI);
        trace!(raw, "PTP counter read");
        raw
    }
}

/// State guarded by the clock lock.
#[derive(Debug)]
struct ClockInner {
    state: ClockState,
    tc: TimeCounter,
    /// Value last written to `PTP_CLOCK_COMP`.
    comp: u64,
    /// Incremented by every `set_time`.
    epoch: u64,
    stats: AdjustmentStats,
}

/// A PTP hardware clock backed by one chip variant's register block.
#[derive(Debug)]
pub struct PtpClock<V: ClockVariant> {
    variant: V,
    name: String,
    caps: ClockCaps,
    clock_rate_hz: u64,
    base_comp: u64,
    out_of_range: OutOfRangePolicy,
    inner: spin::Mutex<ClockInner>,
    adjust_offset_ns: CachePadded<AtomicI64>,
}

assert_impl_all!(PtpClock<ptp_hw::SimulatedRegisters>: Send, Sync);
assert_obj_safe!(PhcClock);

/// Truncate `name` to fit the PHC name buffer on a char boundary.
fn phc_name(name: &str) -> String {
    let mut end = name.len().min(PHC_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

impl<V: ClockVariant> PtpClock<V> {
    /// Create a clock for `variant` ticking at `clock_rate_hz`.
    ///
    /// The clock starts [`ClockState::Uninitialized`]; hardware is not
    /// touched until [`enable_hardware`](Self::enable_hardware). It is
    /// published under `config.name`, or the variant's name when that is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidClockRate`] for a zero rate.
    pub fn new(variant: V, clock_rate_hz: u64, config: &ClockConfig) -> PtpResult<Self> {
        let base_comp = base_compensation(clock_rate_hz)?;
        let name = if config.name.is_empty() {
            phc_name(variant.name())
        } else {
            phc_name(&config.name)
        };

        debug!(name = %name, clock_rate_hz, base_comp, "PTP clock created");

        Ok(Self {
            variant,
            name,
            caps: ClockCaps {
                max_adj: config.max_adj_ppb,
                n_ext_ts: 0,
                n_pins: 0,
                pps: false,
            },
            clock_rate_hz,
            base_comp,
            out_of_range: config.out_of_range,
            inner: spin::Mutex::new(ClockInner {
                state: ClockState::Uninitialized,
                tc: TimeCounter::default(),
                comp: base_comp,
                epoch: 0,
                stats: AdjustmentStats::default(),
            }),
            adjust_offset_ns: CachePadded::new(AtomicI64::new(0)),
        })
    }

    /// Arm the hardware anchored to the current wall-clock time.
    pub fn enable_hardware_now(&self) -> PtpResult<()> {
        self.enable_hardware(wall_clock_ns())
    }

    /// Arm the hardware and anchor the nanosecond domain at `start_ns`.
    ///
    /// Sets the enable bit and programs the nominal compensation.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidStateTransition`] unless the clock is
    /// still uninitialized.
    pub fn enable_hardware(&self, start_ns: u64) -> PtpResult<()> {
        let mut inner = self.inner.lock();
        inner.state.transition_to(ClockState::Enabled)?;

        let cc = CycleCounter::IDENTITY_64;
        inner.tc = TimeCounter::new(cc, &HwCounter(&self.variant), start_ns);

        self.variant
            .set_bits(regs::PTP_CLOCK_CFG, regs::PTP_CLOCK_CFG_PTP_EN);
        self.variant.write(regs::PTP_CLOCK_COMP, self.base_comp);
        inner.comp = self.base_comp;
        drop(inner);

        info!(
            name = %self.name,
            clock_rate_hz = self.clock_rate_hz,
            comp = self.base_comp,
            start_ns,
            "PTP hardware enabled"
        );
        Ok(())
    }

    /// Clear the hardware enable bit. Terminal.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidStateTransition`] if already disabled.
    pub fn disable_hardware(&self) -> PtpResult<()> {
        let mut inner = self.inner.lock();
        inner.state.transition_to(ClockState::Disabled)?;
        self.variant
            .clear_bits(regs::PTP_CLOCK_CFG, regs::PTP_CLOCK_CFG_PTP_EN);
        drop(inner);

        info!(name = %self.name, "PTP hardware disabled");
        Ok(())
    }

    /// Current time in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidState`] unless enabled.
    pub fn get_time(&self) -> PtpResult<u64> {
        let mut inner = self.inner.lock();
        inner.state.require_enabled("gettime")?;
        Ok(inner.tc.read(&HwCounter(&self.variant)))
    }

    /// Re-anchor the clock to `ns` at the current counter value.
    ///
    /// Starts a new epoch and resets the published step offset.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidState`] unless enabled.
    pub fn set_time(&self, ns: u64) -> PtpResult<()> {
        let mut inner = self.inner.lock();
        inner.state.require_enabled("settime")?;
        inner.tc.init(&HwCounter(&self.variant), ns);
        inner.epoch += 1;
        inner.stats.record_set();
        self.adjust_offset_ns.store(0, Ordering::Release);
        let epoch = inner.epoch;
        drop(inner);

        debug!(name = %self.name, ns, epoch, "PTP time set");
        Ok(())
    }

    /// Step the clock by `delta_ns` without starting a new epoch.
    ///
    /// Issues a full fence after releasing the lock so lock-free readers
    /// of [`adjust_offset`](Self::adjust_offset) on other cores observe
    /// the step promptly, then notifies the chip variant.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidState`] unless enabled.
    pub fn adjust_time(&self, delta_ns: i64) -> PtpResult<()> {
        {
            let mut inner = self.inner.lock();
            inner.state.require_enabled("adjtime")?;
            inner.tc.adjust(delta_ns);
            inner.stats.record_step(delta_ns);
            self.adjust_offset_ns.fetch_add(delta_ns, Ordering::Relaxed);
        }

        // Sync, for the packet path to get the latest value
        fence(Ordering::SeqCst);

        self.variant.adjust_time_hook(delta_ns);
        debug!(name = %self.name, delta_ns, "PTP time adjusted");
        Ok(())
    }

    /// Trim the frequency by `ppb` parts per billion.
    ///
    /// Absolute: the new compensation is derived from the nominal value,
    /// replacing any previous trim.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidState`] unless enabled, and
    /// [`PtpError::FrequencyOutOfRange`] when `|ppb|` exceeds `max_adj`
    /// under the reject policy.
    pub fn adjust_frequency(&self, ppb: i32) -> PtpResult<()> {
        let mut inner = self.inner.lock();
        inner.state.require_enabled("adjfreq")?;

        let (ppb, clamped) = match bounded_ppb(ppb, self.caps.max_adj, self.out_of_range) {
            Ok(bounded) => bounded,
            Err(e) => {
                inner.stats.record_rejected();
                drop(inner);
                warn!(name = %self.name, error = %e, "Frequency adjustment rejected");
                return Err(e);
            }
        };

        let comp = adjusted_compensation(self.base_comp, ppb);
        self.variant.write(regs::PTP_CLOCK_COMP, comp);
        inner.comp = comp;
        inner.stats.record_trim(ppb, clamped);
        drop(inner);

        if clamped {
            warn!(name = %self.name, ppb, "Frequency adjustment clamped to max_adj");
        }
        debug!(name = %self.name, ppb, comp, "PTP frequency adjusted");
        Ok(())
    }

    /// External timestamp events are not supported by this hardware.
    ///
    /// The answer does not depend on the lifecycle, so there is no state
    /// check: a clock that is not enabled reports the same error.
    ///
    /// # Errors
    ///
    /// Always returns [`PtpError::Unsupported`].
    pub fn enable_external_event(&self, _on: bool) -> PtpResult<()> {
        Err(PtpError::Unsupported("external timestamp events"))
    }

    /// Convert a raw counter value latched by a packet engine into time.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::InvalidState`] unless enabled.
    pub fn cycles_to_time(&self, raw: u64) -> PtpResult<u64> {
        let inner = self.inner.lock();
        inner.state.require_enabled("cyc2time")?;
        Ok(inner.tc.cyc2time(raw))
    }

    /// Sum of offset steps applied in the current epoch.
    ///
    /// Lock-free; may lag a concurrent `adjust_time` on another core.
    pub fn adjust_offset(&self) -> i64 {
        self.adjust_offset_ns.load(Ordering::Acquire)
    }

    /// Lifecycle state.
    pub fn state(&self) -> ClockState {
        self.inner.lock().state
    }

    /// Number of `set_time` calls so far.
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Compensation currently programmed into hardware.
    pub fn compensation(&self) -> u64 {
        self.inner.lock().comp
    }

    /// Compensation for the nominal rate.
    pub fn base_compensation(&self) -> u64 {
        self.base_comp
    }

    /// Nominal tick frequency in Hz.
    pub fn clock_rate_hz(&self) -> u64 {
        self.clock_rate_hz
    }

    /// Snapshot of the adjustment counters.
    pub fn stats(&self) -> AdjustmentStats {
        self.inner.lock().stats.clone()
    }

    /// Clock name, truncated to the PHC name buffer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advertised capabilities.
    pub fn caps(&self) -> ClockCaps {
        self.caps
    }

    /// The chip variant driving this clock.
    pub fn variant(&self) -> &V {
        &self.variant
    }
}

impl<V: ClockVariant> PhcClock for PtpClock<V> {
    fn name(&self) -> &str {
        PtpClock::name(self)
    }

    fn caps(&self) -> ClockCaps {
        self.caps
    }

    fn get_time(&self) -> PtpResult<u64> {
        PtpClock::get_time(self)
    }

    fn set_time(&self, ns: u64) -> PtpResult<()> {
        PtpClock::set_time(self, ns)
    }

    fn adjust_time(&self, delta_ns: i64) -> PtpResult<()> {
        PtpClock::adjust_time(self, delta_ns)
    }

    fn adjust_frequency(&self, ppb: i32) -> PtpResult<()> {
        PtpClock::adjust_frequency(self, ppb)
    }

    fn enable_feature(&self, request: ClockRequest, on: bool) -> PtpResult<()> {
        match request {
            ClockRequest::ExternalTimestamp { .. } => self.enable_external_event(on),
            ClockRequest::PeriodicOutput { .. } => Err(PtpError::Unsupported("periodic output")),
            ClockRequest::Pps => Err(PtpError::Unsupported("pps")),
        }
    }

    fn adjust_offset(&self) -> i64 {
        PtpClock::adjust_offset(self)
    }

    fn cycles_to_time(&self, raw: u64) -> PtpResult<u64> {
        PtpClock::cycles_to_time(self, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_hw::SimulatedRegisters;

    const RATE_800MHZ: u64 = 800_000_000;

    fn enabled_clock(start_ns: u64) -> (PtpClock<SimulatedRegisters>, SimulatedRegisters) {
        let hw = SimulatedRegisters::new("thunder_ptp");
        let clock = PtpClock::new(hw.clone(), RATE_800MHZ, &ClockConfig::default()).unwrap();
        clock.enable_hardware(start_ns).unwrap();
        (clock, hw)
    }

    #[test]
    fn test_zero_rate_rejected() {
        let hw = SimulatedRegisters::new("zero");
        let result = PtpClock::new(hw, 0, &ClockConfig::default());
        assert!(matches!(result, Err(PtpError::InvalidClockRate(0))));
    }

    #[test]
    fn test_enable_programs_hardware() {
        let (clock, hw) = enabled_clock(0);
        assert!(hw.is_enabled());
        assert_eq!(hw.compensation(), 5_368_709_120);
        assert_eq!(clock.compensation(), clock.base_compensation());
        assert_eq!(clock.state(), ClockState::Enabled);
    }

    #[test]
    fn test_operations_rejected_before_enable() {
        let hw = SimulatedRegisters::new("idle");
        let clock = PtpClock::new(hw.clone(), RATE_800MHZ, &ClockConfig::default()).unwrap();

        assert!(matches!(
            clock.get_time(),
            Err(PtpError::InvalidState { op: "gettime", .. })
        ));
        assert!(clock.set_time(1).is_err());
        assert!(clock.adjust_time(1).is_err());
        assert!(clock.adjust_frequency(1).is_err());
        assert_eq!(hw.write_count(), 0);
    }

    #[test]
    fn test_operations_rejected_after_disable() {
        let (clock, hw) = enabled_clock(0);
        clock.disable_hardware().unwrap();
        assert!(!hw.is_enabled());

        assert!(matches!(
            clock.adjust_time(10),
            Err(PtpError::InvalidState { op: "adjtime", .. })
        ));
        assert!(clock.enable_hardware(0).is_err());
        assert!(clock.disable_hardware().is_err());
    }

    #[test]
    fn test_set_then_get_is_exact() {
        let (clock, hw) = enabled_clock(0);
        hw.advance_cycles(1_000);

        clock.set_time(1_700_000_000_123_456_789).unwrap();
        assert_eq!(clock.get_time().unwrap(), 1_700_000_000_123_456_789);
        assert_eq!(clock.epoch(), 1);
    }

    #[test]
    fn test_get_time_follows_counter() {
        let (clock, hw) = enabled_clock(10_000);
        // 800 MHz: 1.25 ns per cycle
        hw.advance_cycles(800);
        assert_eq!(clock.get_time().unwrap(), 11_000);
    }

    #[test]
    fn test_adjust_time_steps_without_new_epoch() {
        let (clock, hw) = enabled_clock(0);
        clock.set_time(5_000_000).unwrap();
        hw.advance_cycles(80);

        let before = clock.get_time().unwrap();
        clock.adjust_time(-2_500).unwrap();
        assert_eq!(clock.get_time().unwrap(), before - 2_500);
        assert_eq!(clock.epoch(), 1);
        assert_eq!(clock.adjust_offset(), -2_500);
        assert_eq!(hw.hook_total_ns(), -2_500);
    }

    #[test]
    fn test_set_time_resets_offset() {
        let (clock, _hw) = enabled_clock(0);
        clock.adjust_time(700).unwrap();
        clock.adjust_time(300).unwrap();
        assert_eq!(clock.adjust_offset(), 1_000);

        clock.set_time(42).unwrap();
        assert_eq!(clock.adjust_offset(), 0);
        assert_eq!(clock.stats().cumulative_step_ns, 1_000);
    }

    #[test]
    fn test_adjust_frequency_programs_register() {
        let (clock, hw) = enabled_clock(0);

        clock.adjust_frequency(500_000_000).unwrap();
        assert_eq!(hw.compensation(), 8_053_063_680);
        assert_eq!(clock.compensation(), 8_053_063_680);

        clock.adjust_frequency(0).unwrap();
        assert_eq!(hw.compensation(), clock.base_compensation());
    }

    #[test]
    fn test_trim_changes_counter_rate() {
        let (clock, hw) = enabled_clock(0);
        clock.adjust_frequency(100_000_000).unwrap(); // +10%

        hw.advance_cycles(800_000);
        // 1_000_000 ns nominal, plus 10% (within fixed-point truncation)
        let now = clock.get_time().unwrap();
        assert!((1_099_999..=1_100_000).contains(&now), "now = {now}");
    }

    #[test]
    fn test_out_of_range_rejected_by_default() {
        let (clock, hw) = enabled_clock(0);
        let err = clock.adjust_frequency(1_000_000_001).unwrap_err();
        assert!(matches!(err, PtpError::FrequencyOutOfRange { .. }));
        assert_eq!(hw.compensation(), clock.base_compensation());
        assert_eq!(clock.stats().rejected_adjustments, 1);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let hw = SimulatedRegisters::new("clamp");
        let config = ClockConfig {
            max_adj_ppb: 100_000_000,
            out_of_range: OutOfRangePolicy::Clamp,
            ..ClockConfig::default()
        };
        let clock = PtpClock::new(hw.clone(), RATE_800MHZ, &config).unwrap();
        clock.enable_hardware(0).unwrap();

        clock.adjust_frequency(-900_000_000).unwrap();
        assert_eq!(
            hw.compensation(),
            adjusted_compensation(clock.base_compensation(), -100_000_000)
        );
        assert_eq!(clock.stats().clamped_adjustments, 1);
        assert_eq!(clock.stats().last_ppb, -100_000_000);
    }

    #[test]
    fn test_external_events_unsupported() {
        let (clock, _hw) = enabled_clock(0);
        let before = clock.stats();
        assert_eq!(
            clock.enable_external_event(true),
            Err(PtpError::Unsupported("external timestamp events"))
        );
        assert!(PhcClock::enable_feature(&clock, ClockRequest::Pps, true).is_err());
        assert_eq!(clock.stats(), before);
    }

    #[test]
    fn test_external_events_unsupported_in_any_state() {
        let hw = SimulatedRegisters::new("idle");
        let clock = PtpClock::new(hw.clone(), RATE_800MHZ, &ClockConfig::default()).unwrap();
        let unsupported = Err(PtpError::Unsupported("external timestamp events"));

        assert_eq!(clock.enable_external_event(true), unsupported);
        clock.enable_hardware(0).unwrap();
        clock.disable_hardware().unwrap();
        assert_eq!(clock.enable_external_event(false), unsupported);
        assert_eq!(clock.state(), ClockState::Disabled);
        assert!(!hw.is_enabled());
    }

    #[test]
    fn test_cycles_to_time_correlates_packet_timestamps() {
        let (clock, hw) = enabled_clock(0);
        clock.set_time(1_000_000).unwrap();
        let anchor = hw.counter();

        hw.advance_cycles(400); // 500 ns
        let latched = hw.counter();
        assert_eq!(clock.cycles_to_time(latched).unwrap(), 1_000_500);
        assert_eq!(clock.cycles_to_time(anchor).unwrap(), 1_000_000);
    }

    #[test]
    fn test_timespec_surface() {
        let (clock, _hw) = enabled_clock(0);
        let ts = Timespec64::new(1_700_000_000, 250).unwrap();
        clock.settime64(&ts).unwrap();
        assert_eq!(clock.gettime64().unwrap(), ts);
    }

    #[test]
    fn test_name_truncated_to_phc_buffer() {
        assert_eq!(phc_name("thunder_ptp"), "thunder_ptp");
        assert_eq!(phc_name("cavium_thunderx_ptp_clock"), "cavium_thunderx");
        assert_eq!(phc_name("cavium_thunderx_ptp_clock").len(), 15);
        // Multi-byte character straddling the limit is dropped whole
        assert_eq!(phc_name("ptp_clock_abcdé"), "ptp_clock_abcd");
    }

    #[test]
    fn test_configured_name_wins_over_variant_name() {
        let config = ClockConfig {
            name: "cavium_thunderx_bgx_ptp".to_string(),
            ..ClockConfig::default()
        };
        let hw = SimulatedRegisters::new("thunder_ptp");
        let clock = PtpClock::new(hw, RATE_800MHZ, &config).unwrap();
        assert_eq!(clock.name(), "cavium_thunderx");

        let unnamed = ClockConfig {
            name: String::new(),
            ..ClockConfig::default()
        };
        let hw = SimulatedRegisters::new("bgx_ptp");
        let clock = PtpClock::new(hw, RATE_800MHZ, &unnamed).unwrap();
        assert_eq!(clock.name(), "bgx_ptp");
    }
}
