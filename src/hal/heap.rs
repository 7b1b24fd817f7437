//! Descriptor table allocators.
//!
//! General controllers may read tables from anywhere in system RAM, so they
//! use the global allocator. LPPDMA can only reach low-power SRAM, so its
//! tables come from a [`RegionHeap`] placed over that memory.

use alloc::alloc::{alloc_zeroed, dealloc};
use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;

use critical_section::Mutex;
use linked_list_allocator::Heap;

/// Allocator for one address space reachable by a controller
pub trait TableHeap: Sync {
    /// Allocate `layout`, zeroed
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory obtained from [`TableHeap::allocate`]
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this heap with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Tables from the global allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalHeap;

/// Shared instance for [`crate::Pdma::new`]
pub static GLOBAL_HEAP: GlobalHeap = GlobalHeap;

impl TableHeap for GlobalHeap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has non-zero size
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }
}

/// First-fit heap over a fixed memory region
///
/// ```ignore
/// static LPSRAM_TABLES: RegionHeap = RegionHeap::empty();
///
/// unsafe { LPSRAM_TABLES.init(LPSRAM_POOL.as_mut_ptr(), LPSRAM_POOL.len()) };
/// ```
pub struct RegionHeap {
    heap: Mutex<RefCell<Option<Heap>>>,
}

impl Default for RegionHeap {
    fn default() -> Self {
        Self::empty()
    }
}

impl RegionHeap {
    /// A heap with no memory; every allocation fails until [`RegionHeap::init`]
    pub const fn empty() -> Self {
        Self {
            heap: Mutex::new(RefCell::new(None)),
        }
    }

    /// Hand the region `[bottom, bottom + size)` to the heap
    ///
    /// Calling this again replaces the region.
    ///
    /// # Safety
    ///
    /// - The region must be available for the entire program (`'static`).
    /// - The region must be used exclusively by this heap, no aliasing.
    /// - `size > 0`.
    pub unsafe fn init(&self, bottom: *mut u8, size: usize) {
        critical_section::with(|cs| {
            let mut heap = Heap::empty();
            unsafe { heap.init(bottom, size) };
            self.heap.borrow_ref_mut(cs).replace(heap);
        });
    }

    /// Bytes currently handed out
    pub fn used(&self) -> usize {
        critical_section::with(|cs| self.heap.borrow_ref(cs).as_ref().map_or(0, Heap::used))
    }

    /// Bytes still available
    pub fn free(&self) -> usize {
        critical_section::with(|cs| self.heap.borrow_ref(cs).as_ref().map_or(0, Heap::free))
    }
}

impl TableHeap for RegionHeap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = critical_section::with(|cs| {
            self.heap
                .borrow_ref_mut(cs)
                .as_mut()?
                .allocate_first_fit(layout)
                .ok()
        })?;
        // SAFETY: the allocation spans layout.size() writable bytes
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        critical_section::with(|cs| {
            if let Some(heap) = self.heap.borrow_ref_mut(cs).as_mut() {
                unsafe { heap.deallocate(ptr, layout) };
            }
        });
    }
}
