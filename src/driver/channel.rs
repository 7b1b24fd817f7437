//! Controllers, channel identities and peripheral request sources.

use crate::driver::config::MemControl;
use crate::internal::bitset::ChannelMask;
use crate::internal::constants::{CONTROLLER_COUNT, LPPDMA_CHANNELS, PDMA_CHANNELS};
use crate::internal::register::{
    LPPDMA_BASE, LPPDMA_IRQ, LPPDMA_RESET_ID, PDMA0_BASE, PDMA0_IRQ, PDMA0_RESET_ID, PDMA1_BASE,
    PDMA1_IRQ, PDMA1_RESET_ID,
};

// =============================================================================
// Controllers
// =============================================================================

/// One of the three DMA controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerId {
    /// General-purpose PDMA0
    Pdma0,
    /// General-purpose PDMA1
    Pdma1,
    /// Low-power LPPDMA
    LpPdma,
}

/// Static facts about a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerInfo {
    /// Display name
    pub name: &'static str,
    /// Register block base address
    pub base: usize,
    /// Module reset id handed to [`crate::hal::SystemControl::reset_module`]
    pub reset_id: u32,
    /// NVIC interrupt line
    pub irq: u16,
    /// Number of implemented channels
    pub channels: u8,
    /// Whether the controller lives in the low-power domain
    pub low_power: bool,
}

static CONTROLLERS: [ControllerInfo; CONTROLLER_COUNT] = [
    ControllerInfo {
        name: "pdma0",
        base: PDMA0_BASE,
        reset_id: PDMA0_RESET_ID,
        irq: PDMA0_IRQ,
        channels: PDMA_CHANNELS,
        low_power: false,
    },
    ControllerInfo {
        name: "pdma1",
        base: PDMA1_BASE,
        reset_id: PDMA1_RESET_ID,
        irq: PDMA1_IRQ,
        channels: PDMA_CHANNELS,
        low_power: false,
    },
    ControllerInfo {
        name: "lppdma",
        base: LPPDMA_BASE,
        reset_id: LPPDMA_RESET_ID,
        irq: LPPDMA_IRQ,
        channels: LPPDMA_CHANNELS,
        low_power: true,
    },
];

impl ControllerId {
    /// All controllers in allocation order
    pub const ALL: [ControllerId; CONTROLLER_COUNT] =
        [ControllerId::Pdma0, ControllerId::Pdma1, ControllerId::LpPdma];

    /// Controllers serving general (non low-power) requests, in fallback order
    pub const GENERAL: [ControllerId; 2] = [ControllerId::Pdma0, ControllerId::Pdma1];

    /// Position in [`ControllerId::ALL`]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            ControllerId::Pdma0 => 0,
            ControllerId::Pdma1 => 1,
            ControllerId::LpPdma => 2,
        }
    }

    /// Static facts for this controller
    #[must_use]
    pub fn info(self) -> &'static ControllerInfo {
        &CONTROLLERS[self.index()]
    }

    /// Number of implemented channels
    #[must_use]
    pub const fn channel_count(self) -> u8 {
        match self {
            ControllerId::Pdma0 | ControllerId::Pdma1 => PDMA_CHANNELS,
            ControllerId::LpPdma => LPPDMA_CHANNELS,
        }
    }

    /// Whether this is the low-power controller
    #[must_use]
    pub const fn is_low_power(self) -> bool {
        matches!(self, ControllerId::LpPdma)
    }

    /// Mask covering every implemented channel
    pub(crate) const fn channel_mask(self) -> ChannelMask {
        ChannelMask::from_bits((1u32 << self.channel_count()) - 1)
    }
}

// =============================================================================
// Channels
// =============================================================================

/// A channel address: controller plus channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId {
    controller: ControllerId,
    index: u8,
}

impl ChannelId {
    /// Create a channel id
    ///
    /// # Panics
    ///
    /// Panics if `index` is not implemented by `controller`.
    #[must_use]
    pub const fn new(controller: ControllerId, index: u8) -> Self {
        assert!(index < controller.channel_count(), "channel index out of range");
        Self { controller, index }
    }

    /// Owning controller
    #[must_use]
    pub const fn controller(self) -> ControllerId {
        self.controller
    }

    /// Channel index inside the controller
    #[must_use]
    pub const fn index(self) -> u8 {
        self.index
    }

    /// Single-bit mask for this channel in the controller's per-channel registers
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self.index
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.ch{}", self.controller.info().name, self.index)
    }
}

// =============================================================================
// Peripheral Request Sources
// =============================================================================

/// Transfer direction of a peripheral request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Memory to peripheral
    Tx,
    /// Peripheral to memory
    Rx,
}

/// A request source a channel can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Peripheral {
    /// Software-triggered memory-to-memory on PDMA0/1
    Memory,
    /// UART0..=9
    Uart(u8, Direction),
    /// USCI0
    Usci0(Direction),
    /// QSPI0..=1
    Qspi(u8, Direction),
    /// SPI0..=3
    Spi(u8, Direction),
    /// I2S0..=1
    I2s(u8, Direction),
    /// Software-triggered memory-to-memory on LPPDMA
    LpMemory,
    /// LPUART0
    LpUart0(Direction),
    /// LPSPI0
    LpSpi0(Direction),
    /// DMIC0 capture
    Dmic0Rx,
}

impl Peripheral {
    /// Whether the instance number exists on the device
    #[must_use]
    pub const fn is_valid(self) -> bool {
        match self {
            Peripheral::Uart(n, _) => n <= 9,
            Peripheral::Qspi(n, _) | Peripheral::I2s(n, _) => n <= 1,
            Peripheral::Spi(n, _) => n <= 3,
            _ => true,
        }
    }

    /// Whether requests are served by the low-power controller
    #[must_use]
    pub const fn is_low_power(self) -> bool {
        matches!(
            self,
            Peripheral::LpMemory
                | Peripheral::LpUart0(_)
                | Peripheral::LpSpi0(_)
                | Peripheral::Dmic0Rx
        )
    }

    /// Whether this is a software-triggered memory-to-memory source
    #[must_use]
    pub const fn is_memory(self) -> bool {
        matches!(self, Peripheral::Memory | Peripheral::LpMemory)
    }

    /// Controllers eligible to serve this request, in preference order
    #[must_use]
    pub const fn controllers(self) -> &'static [ControllerId] {
        if self.is_low_power() {
            &[ControllerId::LpPdma]
        } else {
            &ControllerId::GENERAL
        }
    }

    /// REQSEL value for this source
    #[must_use]
    pub const fn request_source(self) -> u8 {
        const fn pair(base: u8, n: u8, dir: Direction) -> u8 {
            let rx = match dir {
                Direction::Tx => 0,
                Direction::Rx => 1,
            };
            base.wrapping_add(n.wrapping_mul(2)).wrapping_add(rx)
        }

        match self {
            Peripheral::Memory | Peripheral::LpMemory => 0,
            Peripheral::Uart(n, dir) => pair(4, n, dir),
            Peripheral::Usci0(dir) => pair(24, 0, dir),
            Peripheral::Qspi(n, dir) => pair(26, n, dir),
            Peripheral::Spi(n, dir) => pair(30, n, dir),
            Peripheral::I2s(n, dir) => pair(38, n, dir),
            Peripheral::LpUart0(dir) => pair(4, 0, dir),
            Peripheral::LpSpi0(dir) => pair(6, 0, dir),
            Peripheral::Dmic0Rx => 15,
        }
    }

    /// Addressing mode a freshly allocated channel starts with
    #[must_use]
    pub const fn default_mem_control(self) -> MemControl {
        match self {
            Peripheral::Memory | Peripheral::LpMemory => MemControl::SrcIncDstInc,
            Peripheral::Uart(_, Direction::Tx)
            | Peripheral::Usci0(Direction::Tx)
            | Peripheral::Qspi(_, Direction::Tx)
            | Peripheral::Spi(_, Direction::Tx)
            | Peripheral::I2s(_, Direction::Tx)
            | Peripheral::LpUart0(Direction::Tx)
            | Peripheral::LpSpi0(Direction::Tx) => MemControl::SrcIncDstFix,
            _ => MemControl::SrcFixDstInc,
        }
    }

    /// Whether `mode` may be used on a channel bound to this source
    ///
    /// Memory-to-memory channels never read from a fixed source.
    #[must_use]
    pub const fn supports(self, mode: MemControl) -> bool {
        !(self.is_memory() && !mode.source_increments())
    }
}
