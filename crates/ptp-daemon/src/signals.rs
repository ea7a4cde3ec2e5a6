//! Signal handling for graceful detach.
//!
//! SIGTERM and SIGINT request shutdown so the clock is detached (hardware
//! disabled, registration withdrawn) before the process exits. SIGHUP asks
//! for an immediate status report of the adjustment counters.
//!
//! The handlers only store into static atomics; the main loop drains them
//! into [`SignalState`] when it polls.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

static TERMINATE_FLAG: AtomicBool = AtomicBool::new(false);
static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(false);
static HANGUP_FLAG: AtomicBool = AtomicBool::new(false);

/// Signal types that the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - Graceful termination request.
    Terminate = 1,
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt = 2,
    /// SIGHUP - Status report request.
    Hangup = 3,
}

impl SignalKind {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Terminate),
            2 => Some(Self::Interrupt),
            3 => Some(Self::Hangup),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// Shared state between the signal poller and the main loop.
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    report_requested: AtomicBool,
    signal_count: AtomicU32,
    /// Code of the most recent [`SignalKind`], 0 if none.
    last_signal: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Check if a status report has been requested (and clear the flag).
    #[inline]
    pub fn take_report_request(&self) -> bool {
        self.report_requested.swap(false, Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
    }

    /// Request a status report (can be called from any thread).
    pub fn request_report(&self) {
        self.report_requested.store(true, Ordering::Relaxed);
    }

    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        self.last_signal.store(kind as u32, Ordering::Relaxed);
        match kind {
            SignalKind::Terminate | SignalKind::Interrupt => self.request_shutdown(),
            SignalKind::Hangup => self.request_report(),
        }
    }

    /// Total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }

    /// Most recent signal, if any.
    pub fn last_signal(&self) -> Option<SignalKind> {
        SignalKind::from_code(self.last_signal.load(Ordering::Relaxed))
    }
}

/// Handle for signal management.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a handler and install SIGTERM, SIGINT and SIGHUP handlers.
    ///
    /// On non-Unix platforms only manual shutdown is available.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self {
            state: Arc::new(SignalState::new()),
        };

        #[cfg(unix)]
        install_unix_handlers()?;

        Ok(handler)
    }

    /// Move pending signal flags into the shared state.
    pub fn poll(&self) {
        for (flag, kind) in [
            (&TERMINATE_FLAG, SignalKind::Terminate),
            (&INTERRUPT_FLAG, SignalKind::Interrupt),
            (&HANGUP_FLAG, SignalKind::Hangup),
        ] {
            if flag.swap(false, Ordering::Relaxed) {
                info!(signal = %kind, "Signal received");
                self.state.record_signal(kind);
            }
        }
    }

    /// Check if shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.poll();
        self.state.shutdown_requested()
    }

    /// Check if a status report has been requested (clears the flag).
    pub fn take_report_request(&self) -> bool {
        self.poll();
        self.state.take_report_request()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request_shutdown();
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn install_unix_handlers() -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn on_sigterm(_: c_int) {
        TERMINATE_FLAG.store(true, Ordering::Relaxed);
    }

    extern "C" fn on_sigint(_: c_int) {
        INTERRUPT_FLAG.store(true, Ordering::Relaxed);
    }

    extern "C" fn on_sighup(_: c_int) {
        HANGUP_FLAG.store(true, Ordering::Relaxed);
    }

    let handlers: [(c_int, extern "C" fn(c_int)); 3] = [
        (libc::SIGTERM, on_sigterm),
        (libc::SIGINT, on_sigint),
        (libc::SIGHUP, on_sighup),
    ];

    for (signum, handler) in handlers {
        // SAFETY: the handlers only store into static atomics, which is
        // async-signal-safe.
        let previous = unsafe { libc::signal(signum, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }

    debug!("Unix signal handlers registered");
    Ok(())
}

/// Sleep until shutdown is requested or `timeout` expires.
///
/// Returns `true` if shutdown was signaled.
pub fn wait_for_shutdown(handler: &SignalHandler, timeout: Duration) -> bool {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(50);

    loop {
        if handler.shutdown_requested() {
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return false;
        }
        std::thread::sleep(poll_interval.min(timeout - elapsed));
    }
}
