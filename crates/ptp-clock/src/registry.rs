//! Clock service registry.
//!
//! Collaborators that need "the" PTP clock (a packet engine correlating
//! hardware timestamps, for instance) are handed a [`ClockRegistry`] at
//! construction and look the clock up there. Multiple clocks and fake
//! services in tests work the same way.

use crate::clock::PhcClock;
use ptp_common::error::{PtpError, PtpResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of clocks a registry accepts.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 8;

/// Index of a registered clock, rendered like a PHC device (`ptp0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockId(pub u32);

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ptp{}", self.0)
    }
}

/// Hosting clock service a hardware clock registers with at attach.
pub trait ClockService: Send + Sync {
    /// Publish `clock`, returning the id it is reachable under.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::RegistrationFailed`] if the service refuses it.
    fn register(&self, clock: Arc<dyn PhcClock>) -> PtpResult<ClockId>;

    /// Withdraw a previously registered clock.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::NotRegistered`] for an unknown id.
    fn unregister(&self, id: ClockId) -> PtpResult<()>;
}

struct Slots {
    clocks: BTreeMap<ClockId, Arc<dyn PhcClock>>,
    next_id: u32,
}

/// In-process [`ClockService`].
pub struct ClockRegistry {
    capacity: usize,
    slots: spin::RwLock<Slots>,
}

impl ClockRegistry {
    /// Create a registry with [`DEFAULT_REGISTRY_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }

    /// Create a registry accepting at most `capacity` clocks.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            slots: spin::RwLock::new(Slots {
                clocks: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Clock registered under `id`.
    pub fn lookup(&self, id: ClockId) -> Option<Arc<dyn PhcClock>> {
        self.slots.read().clocks.get(&id).cloned()
    }

    /// Clock registered under `name`.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<dyn PhcClock>> {
        self.slots
            .read()
            .clocks
            .values()
            .find(|clock| clock.name() == name)
            .cloned()
    }

    /// Lowest-numbered registered clock, the usual answer to "the" clock.
    pub fn first(&self) -> Option<Arc<dyn PhcClock>> {
        self.slots.read().clocks.values().next().cloned()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<ClockId> {
        self.slots.read().clocks.keys().copied().collect()
    }

    /// Number of registered clocks.
    pub fn len(&self) -> usize {
        self.slots.read().clocks.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of clocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ClockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockService for ClockRegistry {
    fn register(&self, clock: Arc<dyn PhcClock>) -> PtpResult<ClockId> {
        let mut slots = self.slots.write();

        if slots.clocks.len() >= self.capacity {
            return Err(PtpError::RegistrationFailed(format!(
                "registry full ({} clocks)",
                self.capacity
            )));
        }
        if slots.clocks.values().any(|c| c.name() == clock.name()) {
            return Err(PtpError::RegistrationFailed(format!(
                "clock '{}' already registered",
                clock.name()
            )));
        }

        let id = ClockId(slots.next_id);
        slots.next_id += 1;
        let name = clock.name().to_string();
        slots.clocks.insert(id, clock);
        drop(slots);

        info!(%id, name = %name, "Clock registered");
        Ok(id)
    }

    fn unregister(&self, id: ClockId) -> PtpResult<()> {
        let removed = self.slots.write().clocks.remove(&id);
        match removed {
            Some(clock) => {
                info!(%id, name = %clock.name(), "Clock unregistered");
                Ok(())
            }
            None => {
                debug!(%id, "Unregister of unknown clock");
                Err(PtpError::NotRegistered(id.to_string()))
            }
        }
    }
}

impl fmt::Debug for ClockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        let names: Vec<(String, &str)> = slots
            .clocks
            .iter()
            .map(|(id, clock)| (id.to_string(), clock.name()))
            .collect();
        f.debug_struct("ClockRegistry")
            .field("capacity", &self.capacity)
            .field("clocks", &names)
            .finish()
    }
}
