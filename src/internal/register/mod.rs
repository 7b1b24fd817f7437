//! Memory-mapped register definitions for the M55M1 PDMA controllers.
//!
//! All register access is volatile to ensure proper hardware interaction.

pub mod pdma;

/// PDMA0 register block base address
pub const PDMA0_BASE: usize = 0x4008_0000;

/// PDMA1 register block base address
pub const PDMA1_BASE: usize = 0x4009_0000;

/// LPPDMA register block base address
pub const LPPDMA_BASE: usize = 0x4058_0000;

// Module reset ids are (SYS reset register offset << 24) | bit

/// PDMA0 module reset id
pub const PDMA0_RESET_ID: u32 = (0x20 << 24) | 2;

/// PDMA1 module reset id
pub const PDMA1_RESET_ID: u32 = (0x20 << 24) | 3;

/// LPPDMA module reset id
pub const LPPDMA_RESET_ID: u32 = 0x80 << 24;

/// PDMA0 interrupt line
pub const PDMA0_IRQ: u16 = 98;

/// PDMA1 interrupt line
pub const PDMA1_IRQ: u16 = 99;

/// LPPDMA interrupt line
pub const LPPDMA_IRQ: u16 = 150;

/// Read a 32-bit register at the given address
///
/// # Safety
/// The caller must ensure the address is valid and properly aligned.
#[inline(always)]
pub unsafe fn read_reg(addr: usize) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// Write a 32-bit value to a register at the given address
///
/// # Safety
/// The caller must ensure the address is valid and properly aligned.
#[inline(always)]
pub unsafe fn write_reg(addr: usize, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}
