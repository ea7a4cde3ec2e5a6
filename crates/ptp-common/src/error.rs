use thiserror::Error;

/// PTP clock error types covering configuration, lifecycle, and hardware access failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PtpError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Nominal clock rate unusable for compensation math.
    #[error("invalid clock rate: {0} Hz")]
    InvalidClockRate(u64),

    /// Invalid lifecycle transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Operation invoked while the clock is not enabled.
    #[error("{op} not permitted in state {state}")]
    InvalidState {
        /// Name of the rejected operation.
        op: &'static str,
        /// State the clock was in.
        state: String,
    },

    /// Frequency adjustment outside the supported range.
    #[error("frequency adjustment {ppb} ppb exceeds max_adj {max}")]
    FrequencyOutOfRange {
        /// Requested adjustment in parts per billion.
        ppb: i32,
        /// Largest accepted magnitude.
        max: u32,
    },

    /// Operation not supported by the hardware.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The clock service refused to register the clock.
    #[error("clock registration failed: {0}")]
    RegistrationFailed(String),

    /// No clock with the requested identity is registered.
    #[error("clock not registered: {0}")]
    NotRegistered(String),

    /// Timespec cannot be represented in the nanosecond domain.
    #[error("invalid timespec: {sec}s {nsec}ns")]
    InvalidTimespec {
        /// Seconds field.
        sec: i64,
        /// Nanoseconds field.
        nsec: u32,
    },

    /// Register window could not be mapped or is too small.
    #[error("register mapping error: {0}")]
    Mapping(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Convenience type alias for PTP clock operations.
pub type PtpResult<T> = Result<T, PtpError>;
