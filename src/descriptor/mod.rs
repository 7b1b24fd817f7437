//! Hardware transfer descriptors.
//!
//! A [`Descriptor`] has the exact layout of one DSCT slot: control word,
//! source, destination and next-link. Chains are built from descriptors
//! living in a [`DescriptorTable`]; a basic transfer is encoded into a
//! stack descriptor and copied into the channel's live slot.

pub mod table;

pub use table::DescriptorTable;

use crate::driver::channel::Peripheral;
use crate::driver::config::{MemControl, Width};
use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::MAX_TRANSFER_COUNT;
use crate::internal::register::pdma::ctl;

/// Volatile cell wrapper for descriptor fields
///
/// Ensures all accesses are volatile so the compiler never caches a field
/// the DMA engine may rewrite.
#[repr(transparent)]
pub(crate) struct VolatileCell<T: Copy> {
    value: core::cell::UnsafeCell<T>,
}

// Safety: all access is through volatile operations, which are single-copy
// atomic for aligned u32 on Cortex-M.
unsafe impl<T: Copy> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Create a new volatile cell with the given initial value
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self {
            value: core::cell::UnsafeCell::new(value),
        }
    }

    /// Read the value (volatile read)
    #[inline(always)]
    pub fn get(&self) -> T {
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Write a value (volatile write)
    #[inline(always)]
    pub fn set(&self, value: T) {
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }
}

/// One hardware transfer descriptor
#[repr(C)]
pub struct Descriptor {
    ctl: VolatileCell<u32>,
    src: VolatileCell<u32>,
    dst: VolatileCell<u32>,
    next: VolatileCell<u32>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptor {
    /// An idle, zeroed descriptor
    pub const fn new() -> Self {
        Self {
            ctl: VolatileCell::new(0),
            src: VolatileCell::new(0),
            dst: VolatileCell::new(0),
            next: VolatileCell::new(0),
        }
    }

    /// Bus address of this descriptor, as written into a next-link
    pub fn address(&self) -> u32 {
        core::ptr::from_ref(self) as usize as u32
    }

    /// Raw control word
    pub fn control(&self) -> u32 {
        self.ctl.get()
    }

    /// Source address
    pub fn source(&self) -> u32 {
        self.src.get()
    }

    /// Destination address
    pub fn destination(&self) -> u32 {
        self.dst.get()
    }

    /// Next-link address, zero when this descriptor ends the chain
    pub fn next(&self) -> u32 {
        self.next.get()
    }

    /// Element count encoded in TXCNT
    pub fn count(&self) -> u32 {
        ((self.control() & ctl::TXCNT_MASK) >> ctl::TXCNT_SHIFT) + 1
    }

    /// Element width, `None` for the reserved encoding
    pub fn width(&self) -> Option<Width> {
        Width::from_ctl(self.control())
    }

    /// Whether completion of this descriptor raises no interrupt
    pub fn is_silent(&self) -> bool {
        self.control() & ctl::TBINTDIS != 0
    }

    /// Whether the descriptor links to another one
    pub fn is_scatter(&self) -> bool {
        self.control() & ctl::OPMODE_MASK == ctl::OPMODE_SCATTER
    }

    /// Whether the source address advances per element
    pub fn source_increments(&self) -> bool {
        self.control() & ctl::SAINC_MASK != ctl::SAINC_FIX
    }

    /// Whether the destination address advances per element
    pub fn destination_increments(&self) -> bool {
        self.control() & ctl::DAINC_MASK != ctl::DAINC_FIX
    }

    /// Bytes covered by one side of this descriptor
    pub fn span(&self) -> usize {
        let width = self.width().map_or(1, Width::bytes);
        (self.count() * width) as usize
    }

    /// Return the descriptor to the idle state
    pub fn clear(&self) {
        self.ctl.set(0);
        self.src.set(0);
        self.dst.set(0);
        self.next.set(0);
    }

    pub(crate) fn words(&self) -> [u32; 4] {
        [self.control(), self.source(), self.destination(), self.next()]
    }

    #[cfg(test)]
    pub(crate) fn set_words(&self, words: [u32; 4]) {
        self.ctl.set(words[0]);
        self.src.set(words[1]);
        self.dst.set(words[2]);
        self.next.set(words[3]);
    }

    /// Encode a transfer into this descriptor
    ///
    /// Memory requests move in 32-transfer bursts, peripheral requests in
    /// single handshakes. A non-zero `next` turns the descriptor into a
    /// scatter-gather link.
    pub(crate) fn program(
        &self,
        peripheral: Peripheral,
        mode: MemControl,
        width: Width,
        src: u32,
        dst: u32,
        count: u32,
        next: u32,
        silent: bool,
    ) -> ConfigResult<()> {
        check_transfer(width, src, dst, count)?;
        if count > MAX_TRANSFER_COUNT {
            return Err(ConfigError::CountTooLarge);
        }

        let mut word = ((count - 1) << ctl::TXCNT_SHIFT) | width.ctl_bits() | mode.ctl_bits();
        word |= if peripheral.is_memory() {
            ctl::TXTYPE_BURST | ctl::BURSIZE_32
        } else {
            ctl::TXTYPE_SINGLE
        };
        word |= if next == 0 {
            ctl::OPMODE_BASIC
        } else {
            ctl::OPMODE_SCATTER
        };
        if silent {
            word |= ctl::TBINTDIS;
        }

        self.src.set(src);
        self.dst.set(dst);
        self.next.set(next);
        self.ctl.set(word);
        Ok(())
    }
}

impl core::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descriptor")
            .field("ctl", &format_args!("{:#010x}", self.control()))
            .field("src", &format_args!("{:#010x}", self.source()))
            .field("dst", &format_args!("{:#010x}", self.destination()))
            .field("next", &format_args!("{:#010x}", self.next()))
            .finish()
    }
}

/// Validate the address/count arguments shared by every transfer entry point
pub(crate) fn check_transfer(width: Width, src: u32, dst: u32, count: u32) -> ConfigResult<()> {
    if !width.is_aligned(src) || !width.is_aligned(dst) {
        return Err(ConfigError::MisalignedAddress);
    }
    if count == 0 {
        return Err(ConfigError::ZeroCount);
    }
    Ok(())
}
