//! Configuration types for the PDMA driver

use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::{
    CHANNEL_RESET_TIMEOUT_US, DEFAULT_ACTOR_POOL_SIZE, DEFAULT_HCLK_HZ, MAX_ACTORS,
    RESET_POLL_INTERVAL_US,
};
use crate::internal::register::pdma::ctl;

/// Element width of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Width {
    /// 8-bit elements
    Bits8,
    /// 16-bit elements
    Bits16,
    /// 32-bit elements
    #[default]
    Bits32,
}

impl Width {
    /// Element size in bytes
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Bits8 => 1,
            Width::Bits16 => 2,
            Width::Bits32 => 4,
        }
    }

    /// Element size in bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    /// TXWIDTH field encoding
    pub(crate) const fn ctl_bits(self) -> u32 {
        match self {
            Width::Bits8 => ctl::TXWIDTH_8,
            Width::Bits16 => ctl::TXWIDTH_16,
            Width::Bits32 => ctl::TXWIDTH_32,
        }
    }

    /// Decode a TXWIDTH field; the reserved encoding yields `None`
    pub(crate) const fn from_ctl(ctl_word: u32) -> Option<Self> {
        match (ctl_word & ctl::TXWIDTH_MASK) >> ctl::TXWIDTH_SHIFT {
            0 => Some(Width::Bits8),
            1 => Some(Width::Bits16),
            2 => Some(Width::Bits32),
            _ => None,
        }
    }

    /// Whether `addr` is aligned to this width
    #[must_use]
    pub const fn is_aligned(self, addr: u32) -> bool {
        addr % self.bytes() == 0
    }
}

impl TryFrom<u32> for Width {
    type Error = ConfigError;

    /// Accepts 8, 16 or 32 bits
    fn try_from(bits: u32) -> ConfigResult<Self> {
        match bits {
            8 => Ok(Width::Bits8),
            16 => Ok(Width::Bits16),
            32 => Ok(Width::Bits32),
            _ => Err(ConfigError::InvalidWidth),
        }
    }
}

/// Source/destination addressing mode of a channel
///
/// The discriminant is the two-bit mode code: bit 1 set means the source
/// increments, bit 0 set means the destination increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MemControl {
    /// Both addresses fixed (register to register)
    SrcFixDstFix = 0,
    /// Fixed source, incrementing destination (peripheral RX)
    SrcFixDstInc = 1,
    /// Incrementing source, fixed destination (peripheral TX)
    SrcIncDstFix = 2,
    /// Both addresses increment (memory copy)
    #[default]
    SrcIncDstInc = 3,
}

impl MemControl {
    /// Whether the source address advances per element
    #[must_use]
    pub const fn source_increments(self) -> bool {
        (self as u8) & 0b10 != 0
    }

    /// Whether the destination address advances per element
    #[must_use]
    pub const fn destination_increments(self) -> bool {
        (self as u8) & 0b01 != 0
    }

    /// SAINC/DAINC encoding
    pub(crate) const fn ctl_bits(self) -> u32 {
        let src = if self.source_increments() {
            ctl::SAINC_INC
        } else {
            ctl::SAINC_FIX
        };
        let dst = if self.destination_increments() {
            ctl::DAINC_INC
        } else {
            ctl::DAINC_FIX
        };
        src | dst
    }
}

/// Driver configuration
///
/// # Example
///
/// ```ignore
/// let config = PdmaConfig::new()
///     .with_hclk_hz(180_000_000)
///     .with_actor_pool_size(2);
/// config.validate()?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdmaConfig {
    /// Bus clock feeding the idle-timeout prescaler
    pub hclk_hz: u32,
    /// Deadline for a channel reset handshake
    pub reset_timeout_us: u32,
    /// Poll interval while waiting for a channel reset
    pub reset_poll_interval_us: u32,
    /// Number of memory-function actors to reserve
    pub actor_pool_size: usize,
}

impl Default for PdmaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PdmaConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hclk_hz: DEFAULT_HCLK_HZ,
            reset_timeout_us: CHANNEL_RESET_TIMEOUT_US,
            reset_poll_interval_us: RESET_POLL_INTERVAL_US,
            actor_pool_size: DEFAULT_ACTOR_POOL_SIZE,
        }
    }

    /// Set the bus clock frequency
    #[must_use]
    pub const fn with_hclk_hz(mut self, hclk_hz: u32) -> Self {
        self.hclk_hz = hclk_hz;
        self
    }

    /// Set the channel reset deadline
    #[must_use]
    pub const fn with_reset_timeout_us(mut self, timeout_us: u32) -> Self {
        self.reset_timeout_us = timeout_us;
        self
    }

    /// Set the reset poll interval
    #[must_use]
    pub const fn with_reset_poll_interval_us(mut self, interval_us: u32) -> Self {
        self.reset_poll_interval_us = interval_us;
        self
    }

    /// Set the actor pool size
    #[must_use]
    pub const fn with_actor_pool_size(mut self, size: usize) -> Self {
        self.actor_pool_size = size;
        self
    }

    /// Check the configuration for values the driver cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.hclk_hz == 0 || self.reset_poll_interval_us == 0 {
            return Err(ConfigError::InvalidConfig);
        }
        if self.actor_pool_size == 0 || self.actor_pool_size > MAX_ACTORS {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(())
    }
}
