//! Error types for the PDMA driver
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Rejected arguments and configuration
//! - [`ChannelError`]: Channel ownership and availability
//! - [`IoError`]: Runtime transfer failures
//! - [`AllocError`]: Descriptor table and actor pool allocation
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most driver methods.

// =============================================================================
// Configuration Errors
// =============================================================================

/// Argument and configuration errors
///
/// Nothing is programmed into hardware when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Transfer width is not 8, 16 or 32 bits
    InvalidWidth,
    /// Source or destination is not aligned to the transfer width
    MisalignedAddress,
    /// Transfer count is zero
    ZeroCount,
    /// Transfer count does not fit a single descriptor
    CountTooLarge,
    /// Memory-access mode not supported by this channel's request source
    UnsupportedMemControl,
    /// Invalid configuration parameter
    InvalidConfig,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidWidth => "invalid transfer width",
            ConfigError::MisalignedAddress => "address not aligned to transfer width",
            ConfigError::ZeroCount => "zero transfer count",
            ConfigError::CountTooLarge => "transfer count exceeds descriptor limit",
            ConfigError::UnsupportedMemControl => "unsupported memory-access mode",
            ConfigError::InvalidConfig => "invalid configuration",
        }
    }
}

// =============================================================================
// Channel Errors
// =============================================================================

/// Channel ownership errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelError {
    /// Every channel of the eligible controllers is allocated
    Unavailable,
    /// Channel is not currently allocated
    NotAllocated,
    /// Channel still has a live descriptor
    Busy,
}

impl core::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChannelError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChannelError::Unavailable => "no channel available",
            ChannelError::NotAllocated => "channel not allocated",
            ChannelError::Busy => "channel busy",
        }
    }
}

// =============================================================================
// I/O Errors
// =============================================================================

/// Runtime transfer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// Hardware did not acknowledge within the poll deadline
    Timeout,
    /// A copy moved fewer elements than requested
    PartialTransfer,
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IoError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IoError::Timeout => "operation timed out",
            IoError::PartialTransfer => "partial transfer",
        }
    }
}

// =============================================================================
// Allocation Errors
// =============================================================================

/// Allocation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocError {
    /// Descriptor table memory could not be obtained
    DescriptorTable,
    /// No channel could be reserved for the actor pool
    ActorPool,
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AllocError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocError::DescriptorTable => "descriptor table allocation failed",
            AllocError::ActorPool => "actor pool has no channels",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match result {
///     Err(Error::Channel(ChannelError::Busy)) => { /* retry later */ }
///     Err(Error::Config(ConfigError::MisalignedAddress)) => { /* ... */ }
///     Err(Error::Io(IoError::Timeout)) => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// Channel error
    Channel(ChannelError),
    /// I/O error
    Io(IoError),
    /// Allocation error
    Alloc(AllocError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Channel(e) => write!(f, "channel: {}", e.as_str()),
            Error::Io(e) => write!(f, "io: {}", e.as_str()),
            Error::Alloc(e) => write!(f, "alloc: {}", e.as_str()),
        }
    }
}

// From impls for automatic conversion
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Channel(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<AllocError> for Error {
    fn from(e: AllocError) -> Self {
        Error::Alloc(e)
    }
}

/// Result type alias for driver operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for channel operations
pub type ChannelResult<T> = core::result::Result<T, ChannelError>;

/// Result type alias for I/O operations
pub type IoResult<T> = core::result::Result<T, IoError>;

/// Result type alias for allocations
pub type AllocResult<T> = core::result::Result<T, AllocError>;

// =============================================================================
// Unit Tests
// =============================================================================
