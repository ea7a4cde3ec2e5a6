//! Memory-mapped register windows.
//!
//! A [`MmioWindow`] wraps a base pointer plus length and performs
//! volatile, naturally aligned 64-bit accesses. On Linux a window can
//! be created by mapping a PCI BAR resource file
//! (`/sys/bus/pci/devices/<bdf>/resourceN`), which is how a user-space
//! driver reaches the PTP and RST blocks.
//!
//! ThunderX device registers are strongly ordered with respect to
//! memory accesses, so no extra barriers are issued around reads or
//! writes.

use crate::{ClockVariant, RegisterAccess};
use ptp_common::error::{PtpError, PtpResult};
use std::ptr::NonNull;
use tracing::{debug, info};

/// A bounds-checked window of 64-bit device registers.
#[derive(Debug)]
pub struct MmioWindow {
    base: NonNull<u8>,
    len: usize,
    /// Whether `base..base+len` is an mmap that must be unmapped on drop.
    owns_mapping: bool,
}

// SAFETY: the window only performs volatile accesses to device memory,
// which the hardware serializes; no Rust-visible data lives behind it.
unsafe impl Send for MmioWindow {}
// SAFETY: see above; `&self` accesses never create references into the window.
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// Wrap an already-mapped register region.
    ///
    /// # Safety
    ///
    /// `base` must point to a mapping of at least `len` bytes of device
    /// registers that stays valid for the lifetime of the window, and must
    /// be 8-byte aligned.
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> PtpResult<Self> {
        let base = NonNull::new(base)
            .ok_or_else(|| PtpError::Mapping("null register base".into()))?;
        if base.as_ptr() as usize % 8 != 0 {
            return Err(PtpError::Mapping(format!(
                "register base {:p} is not 8-byte aligned",
                base.as_ptr()
            )));
        }
        Ok(Self {
            base,
            len,
            owns_mapping: false,
        })
    }

    /// Map `len` bytes of a PCI BAR resource file.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::IoError`] if the file cannot be opened and
    /// [`PtpError::Mapping`] if it is smaller than `len` or mmap fails.
    #[cfg(target_os = "linux")]
    pub fn map_resource(path: &std::path::Path, len: usize) -> PtpResult<Self> {
        use nix::sys::mman::{mmap, MapFlags, ProtFlags};
        use std::num::NonZeroUsize;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| PtpError::IoError(format!("open {}: {e}", path.display())))?;

        let file_len = file
            .metadata()
            .map_err(|e| PtpError::IoError(format!("stat {}: {e}", path.display())))?
            .len();
        if file_len < len as u64 {
            return Err(PtpError::Mapping(format!(
                "{} is {file_len} bytes, need {len}",
                path.display()
            )));
        }

        let length = NonZeroUsize::new(len)
            .ok_or_else(|| PtpError::Mapping("zero-length register window".into()))?;

        debug!(path = %path.display(), len, "Mapping register window");

        // SAFETY: fresh shared mapping of a device resource file; the kernel
        // picks the address and the file descriptor outlives the call.
        let base = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
        }
        .map_err(|e| PtpError::Mapping(format!("mmap {}: {e}", path.display())))?;

        info!(path = %path.display(), len, "Register window mapped");

        Ok(Self {
            base: base.cast::<u8>(),
            len,
            owns_mapping: true,
        })
    }

    /// Window length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Validate an access and return its byte offset.
    ///
    /// Out-of-window or misaligned offsets are programming errors in the
    /// register map and abort immediately.
    fn checked_offset(&self, offset: u64) -> usize {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        assert!(
            offset % 8 == 0 && offset.checked_add(8).is_some_and(|end| end <= self.len),
            "register offset {offset:#x} outside {:#x}-byte window",
            self.len
        );
        offset
    }
}

impl RegisterAccess for MmioWindow {
    fn read(&self, offset: u64) -> u64 {
        let offset = self.checked_offset(offset);
        // SAFETY: offset is aligned and inside the mapping (checked above).
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().read_volatile() }
    }

    fn write(&self, offset: u64, value: u64) {
        let offset = self.checked_offset(offset);
        // SAFETY: offset is aligned and inside the mapping (checked above).
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().write_volatile(value) }
    }
}

impl Drop for MmioWindow {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if self.owns_mapping {
            // SAFETY: base/len describe the mapping created in `map_resource`.
            if let Err(e) = unsafe { nix::sys::mman::munmap(self.base.cast(), self.len) } {
                tracing::warn!(error = %e, "munmap of register window failed");
            }
        }
    }
}

/// A PTP block reached through a memory-mapped BAR.
#[derive(Debug)]
pub struct MmioClock {
    name: String,
    window: MmioWindow,
}

impl MmioClock {
    /// Bind a PTP register window to a clock name.
    ///
    /// # Errors
    ///
    /// Returns [`PtpError::Mapping`] if the window does not cover the
    /// PTP register block.
    pub fn new(name: impl Into<String>, window: MmioWindow) -> PtpResult<Self> {
        if window.len() < crate::regs::PTP_WINDOW_SIZE {
            return Err(PtpError::Mapping(format!(
                "PTP window is {:#x} bytes, need {:#x}",
                window.len(),
                crate::regs::PTP_WINDOW_SIZE
            )));
        }
        Ok(Self {
            name: name.into(),
            window,
        })
    }
}

impl RegisterAccess for MmioClock {
    fn read(&self, offset: u64) -> u64 {
        self.window.read(offset)
    }

    fn write(&self, offset: u64, value: u64) {
        self.window.write(offset, value);
    }
}

impl ClockVariant for MmioClock {
    fn name(&self) -> &str {
        &self.name
    }
}
