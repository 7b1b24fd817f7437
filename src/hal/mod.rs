//! Hardware Abstraction Layer
//!
//! Platform seams the driver is generic over, so the same engine runs on
//! silicon and against the host mocks.
//!
//! # Modules
//!
//! - [`registers`]: Register backend trait and the MMIO implementation
//! - [`cache`]: Data-cache maintenance before a transfer is armed
//! - [`heap`]: Allocators for descriptor tables, one per address space
//! - [`poll`]: Deadline-bounded busy waiting
//! - [`system`]: Module reset and interrupt enable at controller bring-up
//!
//! # Delay Integration
//!
//! Polling uses `embedded_hal::delay::DelayNs` directly.
//! Pass any delay implementation from your HAL.

pub mod cache;
pub mod heap;
pub mod poll;
pub mod registers;
pub mod system;

// Re-export commonly used types
pub use cache::{CacheMaintenance, DCACHE_LINE_SIZE, NoCache, line_span};
#[cfg(feature = "cortex-m")]
pub use cache::CortexMCache;
pub use heap::{GlobalHeap, RegionHeap, TableHeap};
pub use poll::poll_until;
pub use registers::{MmioPdma, PdmaRegisters};
pub use system::{NO_SYSTEM_CONTROL, NoSystemControl, SystemControl};
