//! Register backends.
//!
//! The engine never touches memory-mapped I/O directly; every access goes
//! through [`PdmaRegisters`] at an offset from the controller base.

use crate::driver::channel::ControllerId;
use crate::internal::register::{read_reg, write_reg};

/// Word access to one controller's register block
pub trait PdmaRegisters: Sync {
    /// Read the register at `offset`
    fn read(&self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    fn write(&self, offset: usize, value: u32);

    /// Read-modify-write inside a critical section
    ///
    /// Per-channel enable registers are shared by every channel of the
    /// controller, including the interrupt handler's re-arm path.
    fn modify<F>(&self, offset: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        critical_section::with(|_| {
            let value = self.read(offset);
            self.write(offset, f(value));
        });
    }

    /// Set `bits` in the register at `offset`
    fn set_bits(&self, offset: usize, bits: u32) {
        self.modify(offset, |v| v | bits);
    }

    /// Clear `bits` in the register at `offset`
    fn clear_bits(&self, offset: usize, bits: u32) {
        self.modify(offset, |v| v & !bits);
    }
}

/// Volatile MMIO access at a fixed base address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioPdma {
    base: usize,
}

impl MmioPdma {
    /// Register block at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the start of a PDMA-compatible register block and no
    /// other driver may program it.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Register block of `controller` at its documented base address
    ///
    /// # Safety
    ///
    /// See [`MmioPdma::new`].
    pub unsafe fn for_controller(controller: ControllerId) -> Self {
        unsafe { Self::new(controller.info().base) }
    }

    /// All three register blocks in [`ControllerId::ALL`] order
    ///
    /// # Safety
    ///
    /// See [`MmioPdma::new`].
    pub unsafe fn all() -> [Self; 3] {
        ControllerId::ALL.map(|id| unsafe { Self::for_controller(id) })
    }

    /// Base address of the register block
    pub const fn base(&self) -> usize {
        self.base
    }
}

impl PdmaRegisters for MmioPdma {
    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: base validity is the constructor's contract
        unsafe { read_reg(self.base + offset) }
    }

    #[inline(always)]
    fn write(&self, offset: usize, value: u32) {
        // SAFETY: base validity is the constructor's contract
        unsafe { write_reg(self.base + offset, value) }
    }
}
