//! Attach and detach lifecycle.
//!
//! Attach resolves the nominal rate, builds the engine, arms the hardware
//! and registers the clock with the hosting service. Every failure after
//! the hardware is armed disarms it again before returning, so no
//! hardware is left counting without an owner.
//!
//! Detach runs in the reverse order: disable, then unregister.

use crate::clock::{PhcClock, PtpClock};
use crate::registry::{ClockId, ClockService};
use ptp_common::config::ClockConfig;
use ptp_common::error::PtpResult;
use ptp_common::time::wall_clock_ns;
use ptp_hw::{ClockVariant, RateSource};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Disables the hardware on drop unless disarmed.
struct EnableGuard<'a, V: ClockVariant> {
    clock: &'a PtpClock<V>,
    armed: bool,
}

impl<V: ClockVariant> EnableGuard<'_, V> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<V: ClockVariant> Drop for EnableGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.clock.disable_hardware() {
                warn!(name = %self.clock.name(), error = %e, "Failed to disarm PTP hardware");
            }
        }
    }
}

/// Attach a clock anchored to the current wall-clock time.
///
/// # Errors
///
/// Returns [`ptp_common::PtpError::InvalidClockRate`] for a zero fixed
/// rate, or the service's error if registration is refused. The hardware
/// enable bit is clear whenever an error is returned.
pub fn attach<V: ClockVariant + 'static>(
    variant: V,
    rate: RateSource<'_>,
    service: Arc<dyn ClockService>,
    config: &ClockConfig,
) -> PtpResult<AttachedClock<V>> {
    attach_at(variant, rate, service, config, wall_clock_ns())
}

/// Attach a clock anchored at `start_ns`.
///
/// # Errors
///
/// Same as [`attach`].
pub fn attach_at<V: ClockVariant + 'static>(
    variant: V,
    rate: RateSource<'_>,
    service: Arc<dyn ClockService>,
    config: &ClockConfig,
    start_ns: u64,
) -> PtpResult<AttachedClock<V>> {
    // Resolve the rate before any compensation is derived from it
    let clock_rate_hz = rate.resolve();
    let clock = Arc::new(PtpClock::new(variant, clock_rate_hz, config)?);

    clock.enable_hardware(start_ns)?;
    let guard = EnableGuard {
        clock: &clock,
        armed: true,
    };

    let handle: Arc<dyn PhcClock> = clock.clone();
    let id = service.register(handle)?;
    guard.disarm();

    info!(
        %id,
        name = %clock.name(),
        clock_rate_hz,
        comp = clock.base_compensation(),
        "PTP clock attached"
    );

    Ok(AttachedClock {
        clock,
        id,
        service,
        detached: false,
    })
}

/// An enabled clock registered with a [`ClockService`].
///
/// Dropping it detaches.
pub struct AttachedClock<V: ClockVariant + 'static> {
    clock: Arc<PtpClock<V>>,
    id: ClockId,
    service: Arc<dyn ClockService>,
    detached: bool,
}

impl<V: ClockVariant + 'static> AttachedClock<V> {
    /// The engine.
    pub fn clock(&self) -> &Arc<PtpClock<V>> {
        &self.clock
    }

    /// Id assigned by the clock service.
    pub fn id(&self) -> ClockId {
        self.id
    }

    /// Disable the hardware, then unregister.
    ///
    /// Both steps are attempted; the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns the disable or unregister error.
    pub fn detach(mut self) -> PtpResult<()> {
        self.release()
    }

    fn release(&mut self) -> PtpResult<()> {
        if self.detached {
            return Ok(());
        }
        self.detached = true;

        let disabled = self.clock.disable_hardware();
        let unregistered = self.service.unregister(self.id);

        info!(id = %self.id, name = %self.clock.name(), "PTP clock detached");
        disabled.and(unregistered)
    }
}

impl<V: ClockVariant + 'static> Drop for AttachedClock<V> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(id = %self.id, error = %e, "Detach on drop failed");
        }
    }
}

impl<V: ClockVariant + 'static> fmt::Debug for AttachedClock<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedClock")
            .field("id", &self.id)
            .field("name", &self.clock.name())
            .field("state", &self.clock.state())
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}
