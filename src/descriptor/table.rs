//! Heap-allocated descriptor tables for scatter-gather chains.

use core::alloc::Layout;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::descriptor::Descriptor;
use crate::driver::error::{AllocError, AllocResult};
use crate::hal::heap::TableHeap;
use crate::internal::constants::{DESCRIPTOR_SIZE, DESCRIPTOR_TABLE_ALIGN};

/// A zeroed, 32-byte aligned run of descriptors
///
/// The memory comes from the heap serving the owning controller's address
/// space and goes back to it on drop. The engine never frees a table a
/// transfer may still be reading; keep it alive until the chain completes.
pub struct DescriptorTable {
    ptr: NonNull<Descriptor>,
    len: usize,
    heap: &'static dyn TableHeap,
}

// SAFETY: the table exclusively owns its allocation and descriptors are
// accessed through volatile cells only.
unsafe impl Send for DescriptorTable {}
// SAFETY: see above
unsafe impl Sync for DescriptorTable {}

impl DescriptorTable {
    fn layout(len: usize) -> Option<Layout> {
        let size = len
            .checked_mul(DESCRIPTOR_SIZE)?
            .checked_next_multiple_of(DESCRIPTOR_TABLE_ALIGN)?;
        Layout::from_size_align(size, DESCRIPTOR_TABLE_ALIGN).ok()
    }

    /// Allocate `len` idle descriptors from `heap`
    pub(crate) fn allocate(heap: &'static dyn TableHeap, len: usize) -> AllocResult<Self> {
        if len == 0 {
            return Err(AllocError::DescriptorTable);
        }
        let layout = Self::layout(len).ok_or(AllocError::DescriptorTable)?;
        let ptr = heap.allocate(layout).ok_or(AllocError::DescriptorTable)?;
        Ok(Self {
            ptr: ptr.cast(),
            len,
            heap,
        })
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; tables hold at least one descriptor
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of the descriptor at bus address `addr`
    pub fn index_of(&self, addr: u32) -> Option<usize> {
        self.iter().position(|desc| desc.address() == addr)
    }

    /// Follow next-links from `head`
    ///
    /// Stops after a descriptor whose next-link is zero, that loops back to
    /// `head`, or that leaves the table. Each descriptor is yielded once.
    pub fn chain(&self, head: usize) -> impl Iterator<Item = &Descriptor> {
        let head_addr = self.get(head).map(Descriptor::address);
        let mut cursor = self.get(head);
        let mut budget = self.len;
        core::iter::from_fn(move || {
            let desc = cursor.take()?;
            budget = budget.checked_sub(1)?;
            let next = desc.next();
            if next != 0 && Some(next) != head_addr {
                cursor = self.index_of(next).and_then(|i| self.get(i));
            }
            Some(desc)
        })
    }
}

impl Deref for DescriptorTable {
    type Target = [Descriptor];

    fn deref(&self) -> &[Descriptor] {
        // SAFETY: ptr covers len zero-initialized descriptors (all-zero is
        // a valid idle descriptor) for the lifetime of self
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for DescriptorTable {
    fn drop(&mut self) {
        if let Some(layout) = Self::layout(self.len) {
            // SAFETY: allocated from this heap with this layout
            unsafe { self.heap.deallocate(self.ptr.cast(), layout) };
        }
    }
}

impl core::fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
