//! Hardware clock engine for the ThunderX PTP block.
//!
//! This crate provides:
//! - [`timecounter`] module turning a free-running counter into nanoseconds
//! - [`compensation`] module with the Q32.32 frequency arithmetic
//! - [`PtpClock`] engine with get/set/step/trim under a spin lock
//! - [`PhcClock`] object-safe surface handed to collaborators
//! - [`registry`] module replacing a global clock pointer
//! - [`attach`] module owning the enable/register/unregister lifecycle

pub mod attach;
pub mod clock;
pub mod compensation;
pub mod registry;
pub mod stats;
pub mod timecounter;

pub use attach::*;
pub use clock::*;
pub use compensation::*;
pub use registry::*;
pub use stats::*;
pub use timecounter::*;
