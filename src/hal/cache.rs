//! Data-cache maintenance hook.

/// Data-cache line size of the Cortex-M55
pub const DCACHE_LINE_SIZE: usize = 32;

/// Clean and invalidate data-cache lines covering a bus address range
///
/// Called for every descriptor and every incrementing buffer before a
/// transfer is armed.
pub trait CacheMaintenance: Sync {
    /// Clean then invalidate `len` bytes starting at `addr`
    fn clean_invalidate(&self, addr: u32, len: usize);
}

/// Maintenance for cache-coherent targets: does nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoCache;

impl CacheMaintenance for NoCache {
    #[inline(always)]
    fn clean_invalidate(&self, _addr: u32, _len: usize) {}
}

/// Widen `[addr, addr + len)` to whole cache lines
///
/// Returns the line-aligned start and the length in bytes, zero for an
/// empty range.
pub const fn line_span(addr: u32, len: usize) -> (usize, usize) {
    if len == 0 {
        return (addr as usize, 0);
    }
    let start = addr as usize & !(DCACHE_LINE_SIZE - 1);
    let end = (addr as usize + len).next_multiple_of(DCACHE_LINE_SIZE);
    (start, end - start)
}

/// SCB maintenance by address for the Cortex-M55 data cache
///
/// Lines are cleaned and invalidated in one operation so CPU writes that
/// share a line with a DMA buffer are never discarded.
#[cfg(feature = "cortex-m")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CortexMCache;

#[cfg(feature = "cortex-m")]
impl CacheMaintenance for CortexMCache {
    fn clean_invalidate(&self, addr: u32, len: usize) {
        let (start, size) = line_span(addr, len);
        if size == 0 {
            return;
        }
        // SAFETY: only SCB by-address maintenance is performed, which does
        // not conflict with other users of the SCB
        let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
        scb.clean_invalidate_dcache_by_address(start, size);
    }
}
