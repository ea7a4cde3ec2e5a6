//! Nanosecond/timespec helpers for the PHC surface.

use crate::error::{PtpError, PtpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Seconds plus nanoseconds, as exchanged with a PTP stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timespec64 {
    /// Whole seconds since the clock epoch.
    pub sec: i64,
    /// Nanoseconds within the second (`0..NSEC_PER_SEC`).
    pub nsec: u32,
}

impl Timespec64 {
    /// Create a timespec, rejecting a nanosecond field of a second or more.
    pub fn new(sec: i64, nsec: u32) -> PtpResult<Self> {
        if u64::from(nsec) >= NSEC_PER_SEC {
            return Err(PtpError::InvalidTimespec { sec, nsec });
        }
        Ok(Self { sec, nsec })
    }

    /// Split a nanosecond count into seconds and nanoseconds.
    #[must_use]
    pub fn from_nanos(ns: u64) -> Self {
        Self {
            sec: (ns / NSEC_PER_SEC) as i64,
            nsec: (ns % NSEC_PER_SEC) as u32,
        }
    }

    /// Convert to a nanosecond count.
    ///
    /// Negative times and values beyond `u64::MAX` nanoseconds are rejected.
    pub fn to_nanos(&self) -> PtpResult<u64> {
        let invalid = || PtpError::InvalidTimespec {
            sec: self.sec,
            nsec: self.nsec,
        };
        if u64::from(self.nsec) >= NSEC_PER_SEC {
            return Err(invalid());
        }
        let sec = u64::try_from(self.sec).map_err(|_| invalid())?;
        sec.checked_mul(NSEC_PER_SEC)
            .and_then(|ns| ns.checked_add(u64::from(self.nsec)))
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Timespec64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// Clamps to zero if the system clock is set before 1970.
#[must_use]
pub fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
