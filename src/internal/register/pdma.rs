//! PDMA / LPPDMA register offsets and bit fields.
//!
//! PDMA0, PDMA1 and LPPDMA share one layout; LPPDMA simply implements
//! fewer channels and no timeout counters.

// =============================================================================
// Register Offsets
// =============================================================================

/// First channel descriptor (DSCT0), one 16-byte slot per channel
pub const DSCT_BASE: usize = 0x000;
/// Stride between channel descriptor slots
pub const DSCT_STRIDE: usize = 0x10;
/// Descriptor control word
pub const DSCT_CTL: usize = 0x0;
/// Descriptor source address
pub const DSCT_SA: usize = 0x4;
/// Descriptor destination address
pub const DSCT_DA: usize = 0x8;
/// Descriptor next-link address
pub const DSCT_NEXT: usize = 0xC;

/// Channel enable
pub const CHCTL: usize = 0x400;
/// Transfer pause
pub const PAUSE: usize = 0x404;
/// Software request trigger
pub const SWREQ: usize = 0x408;
/// Request status
pub const TRGSTS: usize = 0x40C;
/// Interrupt enable (per channel)
pub const INTEN: usize = 0x418;
/// Interrupt status summary
pub const INTSTS: usize = 0x41C;
/// Abort status (per channel, write 1 to clear)
pub const ABTSTS: usize = 0x420;
/// Transfer done status (per channel, write 1 to clear)
pub const TDSTS: usize = 0x424;
/// Alignment status (per channel, write 1 to clear)
pub const ALIGN: usize = 0x428;
/// Timeout prescaler, channels 0..=7
pub const TOUTPSC0_7: usize = 0x430;
/// Timeout counter enable
pub const TOUTEN: usize = 0x434;
/// Timeout interrupt enable
pub const TOUTIEN: usize = 0x438;
/// Timeout counters, two channels per word starting at channel 0/1
pub const TOC0_1: usize = 0x440;
/// Channel reset
pub const CHRST: usize = 0x460;
/// Timeout prescaler, channels 8..=15
pub const TOUTPSC8_15: usize = 0x464;
/// Request source select, four channels per word
pub const REQSEL0_3: usize = 0x480;

/// Offset of a field inside channel `ch`'s descriptor slot
#[inline]
pub const fn dsct(ch: u8, field: usize) -> usize {
    DSCT_BASE + ch as usize * DSCT_STRIDE + field
}

/// Word and shift holding channel `ch`'s 16-bit timeout count
#[inline]
pub const fn toc(ch: u8) -> (usize, u32) {
    (TOC0_1 + (ch as usize / 2) * 4, (ch as u32 % 2) * 16)
}

/// Word and shift holding channel `ch`'s 4-bit timeout prescaler lane
#[inline]
pub const fn toutpsc(ch: u8) -> (usize, u32) {
    if ch < 8 {
        (TOUTPSC0_7, ch as u32 * 4)
    } else {
        (TOUTPSC8_15, (ch as u32 - 8) * 4)
    }
}

/// Word and shift holding channel `ch`'s request source byte
#[inline]
pub const fn reqsel(ch: u8) -> (usize, u32) {
    (REQSEL0_3 + (ch as usize / 4) * 4, (ch as u32 % 4) * 8)
}

// =============================================================================
// Descriptor Control Word
// =============================================================================

/// Bit fields of the DSCT control word
pub mod ctl {
    /// Operation mode field
    pub const OPMODE_MASK: u32 = 0x3;
    /// Idle: channel has no live work
    pub const OPMODE_IDLE: u32 = 0x0;
    /// Basic: single descriptor
    pub const OPMODE_BASIC: u32 = 0x1;
    /// Scatter-gather: follow NEXT after this descriptor
    pub const OPMODE_SCATTER: u32 = 0x2;

    /// Single request transfer type (peripheral handshake)
    pub const TXTYPE_SINGLE: u32 = 1 << 2;
    /// Burst transfer type (memory-to-memory)
    pub const TXTYPE_BURST: u32 = 0;

    /// Burst size field
    pub const BURSIZE_MASK: u32 = 0x7 << 4;
    /// 32-transfer bursts
    pub const BURSIZE_32: u32 = 2 << 4;

    /// Table interrupt disable: completion of this descriptor raises nothing
    pub const TBINTDIS: u32 = 1 << 7;

    /// Source address mode field
    pub const SAINC_MASK: u32 = 0x3 << 8;
    /// Source address increments
    pub const SAINC_INC: u32 = 0;
    /// Source address fixed
    pub const SAINC_FIX: u32 = 0x3 << 8;

    /// Destination address mode field
    pub const DAINC_MASK: u32 = 0x3 << 10;
    /// Destination address increments
    pub const DAINC_INC: u32 = 0;
    /// Destination address fixed
    pub const DAINC_FIX: u32 = 0x3 << 10;

    /// Transfer width field
    pub const TXWIDTH_MASK: u32 = 0x3 << 12;
    /// Transfer width field shift
    pub const TXWIDTH_SHIFT: u32 = 12;
    /// 8-bit elements
    pub const TXWIDTH_8: u32 = 0 << 12;
    /// 16-bit elements
    pub const TXWIDTH_16: u32 = 1 << 12;
    /// 32-bit elements
    pub const TXWIDTH_32: u32 = 2 << 12;

    /// Transfer count field (holds count - 1)
    pub const TXCNT_MASK: u32 = 0xFFFF << 16;
    /// Transfer count field shift
    pub const TXCNT_SHIFT: u32 = 16;
}

// =============================================================================
// Interrupt Status
// =============================================================================

/// Bit fields of INTSTS
pub mod intsts {
    /// Some channel aborted (see ABTSTS)
    pub const ABTIF: u32 = 1 << 0;
    /// Some channel finished (see TDSTS)
    pub const TDIF: u32 = 1 << 1;
    /// Some channel hit an alignment fault (see ALIGN)
    pub const ALIGNF: u32 = 1 << 2;
    /// Per-channel request timeout flags
    pub const REQTOF_MASK: u32 = 0xFFFF << 8;
    /// Shift of the request timeout flags
    pub const REQTOF_SHIFT: u32 = 8;
}

/// Width of one timeout prescaler lane
pub const TOUTPSC_LANE_MASK: u32 = 0xF;

/// Width of one request source lane
pub const REQSEL_LANE_MASK: u32 = 0x7F;
