//! Lifecycle state machine for a hardware clock instance.
//!
//! State transitions follow the attach/detach lifecycle:
//! UNINITIALIZED → ENABLED → DISABLED
//!
//! DISABLED is terminal; a detached clock is never re-enabled; a new
//! instance is attached instead.

use crate::error::{PtpError, PtpResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a hardware clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockState {
    /// Created but hardware counter not yet armed.
    #[default]
    Uninitialized,
    /// Hardware enable bit set and compensation programmed.
    Enabled,
    /// Hardware enable bit cleared; no further operations are valid.
    Disabled,
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Enabled => write!(f, "ENABLED"),
            Self::Disabled => write!(f, "DISABLED"),
        }
    }
}

impl ClockState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: ClockState) -> bool {
        use ClockState::{Disabled, Enabled, Uninitialized};

        matches!(
            (self, target),
            (Uninitialized, Enabled)
                | (Enabled, Disabled)
                // Attach failed before the counter was armed
                | (Uninitialized, Disabled)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: ClockState) -> PtpResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(PtpError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Returns true if clock operations are permitted.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Fail with [`PtpError::InvalidState`] unless the clock is enabled.
    pub fn require_enabled(&self, op: &'static str) -> PtpResult<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(PtpError::InvalidState {
                op,
                state: self.to_string(),
            })
        }
    }
}
