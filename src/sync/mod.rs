//! Synchronization Support
//!
//! - **Primitives** (`primitives`): [`CriticalSectionCell`] for ISR-safe
//!   interior mutability of the channel tables and the actor bitmask
//! - **Semaphores** (`semaphore`): the [`Semaphore`] seam used by the
//!   memory-function actor pool, with a spinning default
//!
//! An RTOS port implements [`Semaphore`] over its kernel objects so a
//! blocked copier sleeps instead of spinning.

pub mod primitives;
pub mod semaphore;

pub use primitives::CriticalSectionCell;
pub use semaphore::{Relax, Semaphore, SpinLoop, SpinSemaphore};
