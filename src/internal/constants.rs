//! Driver constants and hardware limits.

// =============================================================================
// Controller Topology
// =============================================================================

/// Number of DMA controllers managed by the driver (PDMA0, PDMA1, LPPDMA)
pub const CONTROLLER_COUNT: usize = 3;

/// Channels implemented by each general-purpose PDMA controller
pub const PDMA_CHANNELS: u8 = 16;

/// Channels implemented by the low-power LPPDMA controller
pub const LPPDMA_CHANNELS: u8 = 4;

/// Widest channel file of any controller
pub const MAX_CHANNELS: usize = PDMA_CHANNELS as usize;

// =============================================================================
// Transfer Limits
// =============================================================================

/// Maximum element count a single descriptor can move (TXCNT holds count - 1)
pub const MAX_TRANSFER_COUNT: u32 = 65_536;

/// Alignment of descriptor tables handed to the scatter-gather engine
pub const DESCRIPTOR_TABLE_ALIGN: usize = 32;

/// Size of one hardware descriptor in bytes
pub const DESCRIPTOR_SIZE: usize = 16;

// =============================================================================
// Idle Timeout
// =============================================================================

/// Largest count the per-channel timeout counter accepts
pub const TIMEOUT_COUNT_MAX: u32 = 0xFFFF;

/// Largest timeout prescaler selection (HCLK / 2^(8 + p))
pub const TIMEOUT_PRESCALER_MAX: u8 = 7;

/// Fixed shift applied by the timeout prescaler before the selected divider
pub const TIMEOUT_PRESCALER_BASE_SHIFT: u32 = 8;

// =============================================================================
// Defaults
// =============================================================================

/// Default HCLK frequency feeding the DMA timeout counters
pub const DEFAULT_HCLK_HZ: u32 = 220_000_000;

/// Default bound on a channel reset handshake
pub const CHANNEL_RESET_TIMEOUT_US: u32 = 1_000;

/// Poll interval while waiting for a channel reset to complete
pub const RESET_POLL_INTERVAL_US: u32 = 1;

/// Default number of actors in the memory-function pool
pub const DEFAULT_ACTOR_POOL_SIZE: usize = 4;

/// Upper bound on the memory-function actor pool
pub const MAX_ACTORS: usize = 32;
