//! Reset and fuses (RST) block and the clock rate resolver.
//!
//! The SCLK multiplier is fused at manufacturing time, so the nominal
//! tick frequency is read once at attach and never again.

use crate::regs;
use crate::RegisterAccess;
use tracing::{debug, warn};

/// Reference oscillator rate the SCLK multiplier applies to.
pub const CLOCK_BASE_RATE: u64 = 50_000_000;

/// Nominal rate assumed when the RST block is unavailable.
pub const CLOCK_RATE_DEFAULT: u64 = 16 * CLOCK_BASE_RATE;

/// Handle to a mapped reset/fuses block.
#[derive(Debug)]
pub struct RstBlock<R> {
    regs: R,
}

impl<R: RegisterAccess> RstBlock<R> {
    /// Wrap the register window of an RST block.
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Raw `RST_BOOT` register value.
    pub fn boot_register(&self) -> u64 {
        self.regs.read(regs::RST_BOOT)
    }

    /// The fused SCLK multiplier (`RST_BOOT[38:33]`).
    pub fn sclk_multiplier(&self) -> u64 {
        (self.boot_register() >> regs::RST_BOOT_PNR_MUL_SHIFT) & regs::RST_BOOT_PNR_MUL_MASK
    }

    /// Nominal core clock rate in Hz. May be zero on unfused parts.
    pub fn clock_rate(&self) -> u64 {
        self.sclk_multiplier() * CLOCK_BASE_RATE
    }
}

/// Resolve the nominal tick frequency of the PTP block.
///
/// Never fails: a missing RST block, or one reporting a zero multiplier,
/// degrades to [`CLOCK_RATE_DEFAULT`].
pub fn resolve_clock_rate<R: RegisterAccess>(rst: Option<&RstBlock<R>>) -> u64 {
    let Some(rst) = rst else {
        warn!(
            default_hz = CLOCK_RATE_DEFAULT,
            "RST block not present, using default clock rate"
        );
        return CLOCK_RATE_DEFAULT;
    };

    let multiplier = rst.sclk_multiplier();
    if multiplier == 0 {
        warn!(
            default_hz = CLOCK_RATE_DEFAULT,
            "RST block reports zero SCLK multiplier, using default clock rate"
        );
        return CLOCK_RATE_DEFAULT;
    }

    let rate = multiplier * CLOCK_BASE_RATE;
    debug!(multiplier, rate_hz = rate, "Resolved clock rate from RST block");
    rate
}

/// Where the clock engine takes its nominal frequency from at attach.
#[derive(Clone, Copy)]
pub enum RateSource<'a> {
    /// Read the SCLK multiplier from an RST block, if one is mapped.
    Rst(Option<&'a dyn RegisterAccess>),
    /// Use a caller-supplied rate.
    Fixed(u64),
}

impl RateSource<'_> {
    /// Resolve the nominal tick frequency in Hz.
    ///
    /// A fixed rate is returned verbatim (zero included) so the engine
    /// can reject it; the RST path never yields zero.
    pub fn resolve(&self) -> u64 {
        match self {
            Self::Rst(regs) => {
                let rst = regs.map(RstBlock::new);
                resolve_clock_rate(rst.as_ref())
            }
            Self::Fixed(hz) => *hz,
        }
    }
}

impl std::fmt::Debug for RateSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rst(regs) => write!(f, "Rst(present: {})", regs.is_some()),
            Self::Fixed(hz) => write!(f, "Fixed({hz} Hz)"),
        }
    }
}
