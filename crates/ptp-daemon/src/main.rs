//! PTP daemon entry point.
//!
//! Attaches a ThunderX PTP clock (simulated or through memory-mapped BAR
//! resources), applies an optional offset step and frequency trim, then
//! logs time samples until a shutdown signal or the sample limit.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use ptp_clock::{attach, AttachedClock, ClockRegistry, PhcClock, PtpClock};
use ptp_common::config::{DaemonConfig, DeviceDriver, RateConfig, RateSourceKind};
use ptp_common::time::{wall_clock_ns, NSEC_PER_SEC};
use ptp_hw::{ClockVariant, RateSource, RegisterAccess, SimulatedRegisters, SimulatedRst};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::signals::{wait_for_shutdown, SignalHandler};

/// PTP daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "ptp-daemon",
    about = "ThunderX PTP clock daemon - attaches a hardware clock and reports its time",
    version,
    long_about = None
)]
struct Args {
    /// Path to a daemon configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use simulated PTP and RST blocks (no hardware).
    #[arg(long, short = 's')]
    simulated: bool,

    /// Stop after this many samples (0 = until signaled).
    #[arg(long)]
    max_samples: Option<u64>,

    /// Step the clock by this many nanoseconds after attach.
    #[arg(long, allow_negative_numbers = true, value_name = "NS")]
    step_ns: Option<i64>,

    /// Trim the clock frequency by this many parts per billion after attach.
    #[arg(long, allow_negative_numbers = true, value_name = "PPB")]
    adjfreq_ppb: Option<i32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting PTP daemon");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        name = %config.clock.name,
        driver = ?config.device.driver,
        rate_source = ?config.rate.source,
        interval = ?config.monitor.interval,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;
    let registry = Arc::new(ClockRegistry::new());

    match config.device.driver {
        DeviceDriver::Simulated => run_simulated(&config, &args, registry, &signal_handler),
        DeviceDriver::Mmio => run_mmio(&config, &args, registry, &signal_handler),
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("ptp_daemon={level},ptp_clock={level},ptp_hw={level},ptp_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `PTP_CONFIG_PATH` environment variable
/// 3. `/etc/thunder-ptp/config.toml` (system path)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<DaemonConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return DaemonConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("PTP_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from PTP_CONFIG_PATH");
            return DaemonConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from PTP_CONFIG_PATH={env_path}"));
        }
        warn!(
            path = %env_path,
            "PTP_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from("/etc/thunder-ptp/config.toml");
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return DaemonConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {}", system_path.display()));
    }

    info!("No config file found, using built-in defaults");
    Ok(DaemonConfig::default())
}

/// Command-line arguments take precedence over the file.
fn apply_overrides(config: &mut DaemonConfig, args: &Args) {
    if args.simulated {
        config.device.driver = DeviceDriver::Simulated;
    }
    if let Some(max_samples) = args.max_samples {
        config.monitor.max_samples = max_samples;
    }
}

fn rate_source<'a>(rate: &RateConfig, rst: Option<&'a dyn RegisterAccess>) -> RateSource<'a> {
    match rate.source {
        RateSourceKind::Rst => RateSource::Rst(rst),
        RateSourceKind::Fixed => RateSource::Fixed(rate.fixed_hz),
    }
}

/// Coprocessor cycles elapsing in `interval` at `clock_rate_hz`.
fn cycles_in(interval: Duration, clock_rate_hz: u64) -> u64 {
    let cycles = interval.as_nanos() * u128::from(clock_rate_hz) / u128::from(NSEC_PER_SEC);
    u64::try_from(cycles).unwrap_or(u64::MAX)
}

fn run_simulated(
    config: &DaemonConfig,
    args: &Args,
    registry: Arc<ClockRegistry>,
    signals: &SignalHandler,
) -> Result<()> {
    let hw = SimulatedRegisters::new(config.clock.name.clone());
    let rst = config
        .device
        .sim_rst_present
        .then(|| SimulatedRst::with_multiplier(config.device.sim_sclk_multiplier));
    let rate = rate_source(
        &config.rate,
        rst.as_ref().map(|rst| rst as &dyn RegisterAccess),
    );

    info!(rst_present = rst.is_some(), "Using simulated PTP hardware");
    let attached = attach(hw.clone(), rate, registry, &config.clock)
        .context("Failed to attach simulated PTP clock")?;

    let cycles = cycles_in(config.monitor.interval, attached.clock().clock_rate_hz());
    run_clock(attached, config, args, signals, || hw.advance_cycles(cycles))
}

#[cfg(target_os = "linux")]
fn run_mmio(
    config: &DaemonConfig,
    args: &Args,
    registry: Arc<ClockRegistry>,
    signals: &SignalHandler,
) -> Result<()> {
    use ptp_hw::{regs, MmioClock, MmioWindow};

    let ptp_path = config
        .device
        .ptp_resource
        .as_ref()
        .context("device.ptp_resource is required for the mmio driver")?;
    let window = MmioWindow::map_resource(ptp_path, regs::PTP_WINDOW_SIZE)
        .with_context(|| format!("Failed to map PTP registers from {}", ptp_path.display()))?;
    let variant = MmioClock::new(config.clock.name.clone(), window)?;

    // The clock still works without RST; the resolver falls back to the default rate
    let rst = match &config.device.rst_resource {
        Some(path) => match MmioWindow::map_resource(path, regs::RST_WINDOW_SIZE) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "RST block unavailable");
                None
            }
        },
        None => None,
    };
    let rate = rate_source(
        &config.rate,
        rst.as_ref().map(|rst| rst as &dyn RegisterAccess),
    );

    let attached =
        attach(variant, rate, registry, &config.clock).context("Failed to attach PTP clock")?;
    run_clock(attached, config, args, signals, || {})
}

#[cfg(not(target_os = "linux"))]
fn run_mmio(
    _config: &DaemonConfig,
    _args: &Args,
    _registry: Arc<ClockRegistry>,
    _signals: &SignalHandler,
) -> Result<()> {
    anyhow::bail!("the mmio driver requires Linux")
}

/// Steer the attached clock, then sample it until shutdown.
///
/// `tick` runs once per interval before each sample.
fn run_clock<V: ClockVariant + 'static>(
    attached: AttachedClock<V>,
    config: &DaemonConfig,
    args: &Args,
    signals: &SignalHandler,
    mut tick: impl FnMut(),
) -> Result<()> {
    let clock = Arc::clone(attached.clock());

    if let Some(step_ns) = args.step_ns {
        clock.adjust_time(step_ns).context("Failed to step clock")?;
    }
    if let Some(ppb) = args.adjfreq_ppb {
        clock
            .adjust_frequency(ppb)
            .context("Failed to trim clock frequency")?;
    }

    info!(
        id = %attached.id(),
        state = %clock.state(),
        "Clock attached, entering sample loop"
    );

    let max_samples = config.monitor.max_samples;
    let mut samples = 0u64;

    while !wait_for_shutdown(signals, config.monitor.interval) {
        tick();

        if signals.take_report_request() {
            report_stats(&clock);
        }

        match clock.gettime64() {
            Ok(ts) => {
                samples += 1;
                let now = ts.to_nanos().unwrap_or(0);
                let drift_ns = i128::from(now) - i128::from(wall_clock_ns());
                info!(
                    sample = samples,
                    time = %ts,
                    drift_ns = i64::try_from(drift_ns).unwrap_or(i64::MAX),
                    offset_ns = clock.adjust_offset(),
                    comp = clock.compensation(),
                    "PTP time"
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to read PTP time");
                break;
            }
        }

        if max_samples > 0 && samples >= max_samples {
            info!(samples, "Maximum sample count reached");
            break;
        }
    }

    info!("Shutting down...");
    report_stats(&clock);
    attached.detach().context("Failed to detach PTP clock")?;

    info!(
        samples,
        signals = signals.state().signal_count(),
        final_state = %clock.state(),
        "Daemon shutdown complete"
    );
    Ok(())
}

fn report_stats<V: ClockVariant>(clock: &PtpClock<V>) {
    match serde_json::to_string(&clock.stats()) {
        Ok(stats) => info!(%stats, "Adjustment statistics"),
        Err(e) => warn!(error = %e, "Failed to encode adjustment statistics"),
    }
}
