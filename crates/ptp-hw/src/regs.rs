//! Register maps shared by every chip variant.

/// PTP clock configuration register.
pub const PTP_CLOCK_CFG: u64 = 0xF00;
/// PTP hardware enable bit in [`PTP_CLOCK_CFG`].
pub const PTP_CLOCK_CFG_PTP_EN: u64 = 1 << 0;
/// Low word of the raw counter (fractional nanoseconds).
pub const PTP_CLOCK_LO: u64 = 0xF08;
/// Free-running nanosecond counter, the cycle counter read source.
pub const PTP_CLOCK_HI: u64 = 0xF10;
/// Q32.32 compensation added to the counter every coprocessor cycle.
pub const PTP_CLOCK_COMP: u64 = 0xF18;

/// Smallest register window that covers the PTP block.
pub const PTP_WINDOW_SIZE: usize = 0xF20;

/// Reset/fuses boot configuration register.
pub const RST_BOOT: u64 = 0x1600;
/// Bit position of the SCLK multiplier in [`RST_BOOT`].
pub const RST_BOOT_PNR_MUL_SHIFT: u32 = 33;
/// Width mask of the SCLK multiplier in [`RST_BOOT`].
pub const RST_BOOT_PNR_MUL_MASK: u64 = 0x3F;

/// Smallest register window that covers the RST block.
pub const RST_WINDOW_SIZE: usize = 0x1608;
