/*!
 * Critical Sections
 * RAII guard over the host's interrupt disable/enable pair
 */

use super::traits::HostKernel;
use super::types::IrqLevel;

/// Interrupts stay masked for the lifetime of the guard
///
/// Nests: inner guards restore the level saved by their own entry. The
/// guard also restores on unwind, so a thread torn down inside a critical
/// section does not leave interrupts masked.
#[must_use = "the critical section ends when the guard is dropped"]
pub struct CriticalSection<'a, H: HostKernel + ?Sized> {
    host: &'a H,
    level: IrqLevel,
}

impl<'a, H: HostKernel + ?Sized> CriticalSection<'a, H> {
    #[inline]
    pub fn enter(host: &'a H) -> Self {
        let level = host.interrupt_disable();
        Self { host, level }
    }
}

impl<H: HostKernel + ?Sized> Drop for CriticalSection<'_, H> {
    #[inline]
    fn drop(&mut self) {
        self.host.interrupt_enable(self.level);
    }
}
