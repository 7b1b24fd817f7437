//! Core driver components for the PDMA controllers.
//!
//! - [`channel`] - Controller and channel identities, request sources
//! - [`config`] - Transfer widths, addressing modes and engine configuration
//! - [`error`] - Error types and result aliases
//! - [`pdma`] - The channel engine: allocation, transfers, cancellation
//! - [`interrupt`] - Event flags and the interrupt dispatcher
//! - [`callback`] - Per-channel callback slots
//! - [`timeout`] - Idle timeout encoding
//!
//! # Example
//!
//! ```ignore
//! use nu_pdma::driver::{Peripheral, Direction, PdmaConfig};
//!
//! let config = PdmaConfig::new().with_hclk_hz(180_000_000);
//! let ch = pdma.allocate(Peripheral::Uart(1, Direction::Tx))?;
//! ```

// Submodules
pub mod callback;
pub mod channel;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod pdma;
pub mod timeout;

// Re-exports for convenience
pub use callback::{CallbackKind, Handler, handler};
pub use channel::{ChannelId, ControllerId, ControllerInfo, Direction, Peripheral};
pub use config::{MemControl, PdmaConfig, Width};
pub use error::{
    AllocError, AllocResult, ChannelError, ChannelResult, ConfigError, ConfigResult, Error,
    IoError, IoResult, Result,
};
pub use interrupt::{Events, InterruptStatus};
pub use pdma::{Pdma, TableHeaps};
pub use timeout::TimeoutSetting;
