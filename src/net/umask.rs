//! Scoped override of the process file-creation mask.

use nix::libc::mode_t;
use nix::sys::stat::{umask, Mode};

/// Sets the process umask on construction and restores the previous value
/// when dropped, on every exit path.
///
/// The umask is process-wide: two guards alive on different threads at the
/// same time will restore each other's values out of order.
#[must_use = "the previous umask is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    /// Install `mask` (permission bits only, higher bits are ignored).
    pub fn set(mask: u32) -> Self {
        let previous = umask(Mode::from_bits_truncate(mask as mode_t));
        Self { previous }
    }

    /// The value that will be restored.
    pub fn previous(&self) -> u32 {
        self.previous.bits() as u32
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        umask(self.previous);
    }
}

/// Read the current umask.
///
/// There is no read-only syscall, so this briefly sets and restores it.
pub fn current() -> u32 {
    UmaskGuard::set(0).previous()
}

#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
