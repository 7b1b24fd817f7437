//! Interrupt-safe sharing of channel bookkeeping.

use core::cell::RefCell;
use critical_section::Mutex;

/// State shared between caller threads and the PDMA interrupt handlers
///
/// Every access runs inside a critical section, so the dispatcher never
/// observes a channel table or actor mask half-updated.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Wrap `value`; usable in statics
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` on the value with interrupts masked
    ///
    /// # Panics
    ///
    /// Panics if called again from inside `f` on the same cell.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}

// SAFETY: the value is only reached through `with`, inside a critical section
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}
