//! Nuvoton M55M1 PDMA Driver
//!
//! A `no_std` channel-pool driver for the M55M1 peripheral DMA controllers:
//! PDMA0 and PDMA1 with 16 channels each, and the low-power LPPDMA with 4.
//!
//! # Architecture
//!
//! 1. **Engine** ([`driver::pdma`]): channel allocation, descriptor
//!    encoding, transfers with automatic chaining, idle timeouts and
//!    cancellation
//! 2. **Dispatcher** ([`driver::interrupt`]): per-controller interrupt
//!    service routing status to per-channel callbacks
//! 3. **Memory functions** ([`memfun`]): a pool of memory-to-memory actors
//!    offering blocking `memcpy`/`mempush`
//! 4. **HAL Layer** ([`hal`]): register backends, cache maintenance,
//!    system-controller hooks, descriptor-table heaps and bounded polling
//!
//! The engine is generic over its register backend, delay and cache hooks,
//! so it runs on silicon through [`hal::MmioPdma`] and on the host against
//! mocks.
//!
//! # Features
//!
//! - `log` (default): Driver diagnostics through the `log` facade
//! - `defmt`: Enable defmt formatting for error types
//! - `cortex-m`: [`hal::CortexMCache`], SCB data-cache maintenance by address
//!
//! # Example
//!
//! ```ignore
//! use nu_pdma::{Pdma, PdmaConfig, TableHeaps, Peripheral, Events, CallbackKind, Width, handler};
//! use nu_pdma::hal::{MmioPdma, NoCache};
//!
//! static PDMA: StaticCell<Pdma<MmioPdma, Delay>> = StaticCell::new();
//! let pdma = PDMA.init(
//!     Pdma::new(
//!         unsafe { MmioPdma::all() },
//!         delay,
//!         NoCache,
//!         TableHeaps::global(),
//!         PdmaConfig::new(),
//!     )?
//!     .with_system_control(&BOARD_SYS),
//! );
//!
//! let ch = pdma.allocate(Peripheral::Memory)?;
//! pdma.set_event_filter(ch, Events::TRANSFER_DONE)?;
//! pdma.register_callback(ch, CallbackKind::Event, handler(|events| {
//!     // runs in interrupt context
//! }))?;
//! unsafe { pdma.transfer(ch, Width::Bits32, src, dst, 256, 0)? };
//!
//! #[interrupt]
//! fn PDMA0() {
//!     PDMA.get().handle_interrupt(ControllerId::Pdma0);
//! }
//! ```
//!
//! # Memory Requirements
//!
//! Channel bookkeeping is static. Descriptor tables (16 bytes per entry,
//! 32-byte aligned) come from the [`TableHeaps`] given at construction;
//! LPPDMA tables must come from low-power SRAM.

#![no_std]
#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future
)]

extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

// =============================================================================
// Modules
// =============================================================================

pub mod descriptor;
pub mod driver;
pub mod hal;
pub mod memfun;
pub mod sync;

// Internal implementation details (pub(crate) only)
mod internal;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use descriptor::{Descriptor, DescriptorTable};
pub use driver::callback::{CallbackKind, Handler, handler};
pub use driver::channel::{ChannelId, ControllerId, ControllerInfo, Direction, Peripheral};
pub use driver::config::{MemControl, PdmaConfig, Width};
pub use driver::error::{
    AllocError, AllocResult, ChannelError, ChannelResult, ConfigError, ConfigResult, Error,
    IoError, IoResult, Result,
};
pub use driver::interrupt::{Events, InterruptStatus};
pub use driver::pdma::{Pdma, TableHeaps};
pub use driver::timeout::TimeoutSetting;
pub use memfun::{ActorPool, Employment};

/// Hardware limits
pub mod constants {
    pub use crate::internal::constants::{
        DESCRIPTOR_SIZE, DESCRIPTOR_TABLE_ALIGN, LPPDMA_CHANNELS, MAX_TRANSFER_COUNT,
        PDMA_CHANNELS,
    };
}

/// Low-level register offsets and bit fields for advanced use.
///
/// These are intentionally separated from the primary facade. Most users should
/// prefer the driver APIs instead of touching registers directly.
///
/// # Safety
///
/// Direct register access bypasses driver invariants. Use only if you fully
/// understand the PDMA hardware and accept responsibility for correct
/// sequencing and synchronization with the engine.
pub mod unsafe_registers {
    pub use crate::internal::register::pdma::*;
    pub use crate::internal::register::{LPPDMA_BASE, PDMA0_BASE, PDMA1_BASE};
}
