#![doc = "Common types shared across the thunder-ptp workspace."]

pub mod config;
pub mod error;
pub mod state;
pub mod time;

pub use config::*;
pub use error::*;
pub use state::*;
pub use time::*;
