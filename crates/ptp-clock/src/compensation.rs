//! Q32.32 compensation arithmetic.
//!
//! The hardware adds the compensation value to the PTP counter on every
//! coprocessor clock cycle. The value is nanoseconds per cycle in 64-bit
//! fixed point: upper 32 bits whole nanoseconds, lower 32 bits fraction.
//!
//! Frequency trims are absolute: `comp = base ± base * |ppb| / 1e9`,
//! always recomputed from the nominal `base`, never from the previous trim.

use ptp_common::config::OutOfRangePolicy;
use ptp_common::error::{PtpError, PtpResult};
use ptp_common::time::NSEC_PER_SEC;

/// Nominal compensation for `clock_rate_hz`: `floor(2^32 * 1e9 / rate)`.
///
/// # Errors
///
/// Returns [`PtpError::InvalidClockRate`] for a zero rate.
pub fn base_compensation(clock_rate_hz: u64) -> PtpResult<u64> {
    if clock_rate_hz == 0 {
        return Err(PtpError::InvalidClockRate(clock_rate_hz));
    }
    Ok((NSEC_PER_SEC << 32) / clock_rate_hz)
}

/// Compensation trimmed by `ppb` parts per billion.
///
/// The multiply is widened to 128 bits so `base` near 2^32 times `ppb`
/// near 1e9 cannot overflow. Saturates instead of wrapping for `|ppb|`
/// beyond one billion.
#[must_use]
pub fn adjusted_compensation(base: u64, ppb: i32) -> u64 {
    let magnitude = u128::from(ppb.unsigned_abs());
    let delta = u128::from(base) * magnitude / u128::from(NSEC_PER_SEC);
    let delta = u64::try_from(delta).unwrap_or(u64::MAX);

    if ppb < 0 {
        base.saturating_sub(delta)
    } else {
        base.saturating_add(delta)
    }
}

/// Apply the out-of-range policy to a requested adjustment.
///
/// Returns the adjustment to program and whether it was clamped.
///
/// # Errors
///
/// Returns [`PtpError::FrequencyOutOfRange`] under [`OutOfRangePolicy::Reject`]
/// when `|ppb| > max_adj`.
pub fn bounded_ppb(ppb: i32, max_adj: u32, policy: OutOfRangePolicy) -> PtpResult<(i32, bool)> {
    if ppb.unsigned_abs() <= max_adj {
        return Ok((ppb, false));
    }
    match policy {
        OutOfRangePolicy::Reject => Err(PtpError::FrequencyOutOfRange { ppb, max: max_adj }),
        OutOfRangePolicy::Clamp => {
            // max_adj never exceeds one billion, so it fits an i32
            let limit = i32::try_from(max_adj).unwrap_or(i32::MAX);
            Ok((ppb.clamp(-limit, limit), true))
        }
    }
}
