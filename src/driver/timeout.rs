//! Idle-timeout counter programming.
//!
//! Each general PDMA channel has a 16-bit counter clocked from HCLK through
//! a per-channel prescaler (HCLK / 2^(8 + p)). LPPDMA has no counters.

use crate::hal::registers::PdmaRegisters;
use crate::internal::constants::{
    TIMEOUT_COUNT_MAX, TIMEOUT_PRESCALER_BASE_SHIFT, TIMEOUT_PRESCALER_MAX,
};
use crate::internal::register::pdma::{TOUTEN, TOUTIEN, TOUTPSC_LANE_MASK, toc, toutpsc};

/// Prescaler selection and counter value for one idle timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeoutSetting {
    /// Prescaler selection `p`, tick = HCLK / 2^(8 + p)
    pub prescaler: u8,
    /// Ticks before the timeout fires
    pub count: u16,
}

impl TimeoutSetting {
    /// Smallest prescaler that represents `timeout_us` in 16 bits
    ///
    /// Returns `None` for zero (timeout disabled). Durations beyond the
    /// slowest prescaler clamp to its longest count.
    pub fn for_duration(hclk_hz: u32, timeout_us: u32) -> Option<Self> {
        if timeout_us == 0 {
            return None;
        }
        for prescaler in 0..=TIMEOUT_PRESCALER_MAX {
            let tick_hz = u64::from(Self::tick_hz(hclk_hz, prescaler));
            let ticks = (u64::from(timeout_us) * tick_hz).div_ceil(1_000_000).max(1);
            if ticks <= u64::from(TIMEOUT_COUNT_MAX) {
                return Some(Self {
                    prescaler,
                    count: ticks as u16,
                });
            }
        }
        Some(Self {
            prescaler: TIMEOUT_PRESCALER_MAX,
            count: TIMEOUT_COUNT_MAX as u16,
        })
    }

    /// Counter clock for prescaler `p`
    pub const fn tick_hz(hclk_hz: u32, prescaler: u8) -> u32 {
        hclk_hz >> (TIMEOUT_PRESCALER_BASE_SHIFT + prescaler as u32)
    }
}

/// Stop the counter of channel `ch` without touching its configuration
pub(crate) fn stop<H: PdmaRegisters>(regs: &H, ch: u8) {
    regs.clear_bits(TOUTEN, 1 << ch);
}

/// Disable, then reprogram channel `ch`'s idle timeout
pub(crate) fn apply<H: PdmaRegisters>(regs: &H, ch: u8, setting: Option<TimeoutSetting>) {
    let bit = 1u32 << ch;
    regs.clear_bits(TOUTIEN, bit);
    regs.clear_bits(TOUTEN, bit);

    let Some(setting) = setting else {
        return;
    };

    let (psc_offset, psc_shift) = toutpsc(ch);
    regs.modify(psc_offset, |v| {
        (v & !(TOUTPSC_LANE_MASK << psc_shift)) | (u32::from(setting.prescaler) << psc_shift)
    });

    let (toc_offset, toc_shift) = toc(ch);
    regs.modify(toc_offset, |v| {
        (v & !(0xFFFF << toc_shift)) | (u32::from(setting.count) << toc_shift)
    });

    regs.set_bits(TOUTEN, bit);
    regs.set_bits(TOUTIEN, bit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::register::pdma::{TOC0_1, TOUTPSC0_7, TOUTPSC8_15};
    use crate::testing::MockPdma;

    const HCLK: u32 = 220_000_000;

    #[test]
    fn zero_disables() {
        assert_eq!(TimeoutSetting::for_duration(HCLK, 0), None);
    }

    #[test]
    fn short_timeout_uses_fastest_prescaler() {
        let setting = TimeoutSetting::for_duration(HCLK, 1_000).unwrap();
        assert_eq!(setting.prescaler, 0);
        assert_eq!(setting.count, 860);
    }

    #[test]
    fn picks_smallest_prescaler_that_fits() {
        let setting = TimeoutSetting::for_duration(HCLK, 100_000).unwrap();
        assert_eq!(setting.prescaler, 1);
        assert_eq!(setting.count, 42_969);
    }

    #[test]
    fn tiny_timeout_counts_at_least_one_tick() {
        let setting = TimeoutSetting::for_duration(HCLK, 1).unwrap();
        assert_eq!(setting.prescaler, 0);
        assert_eq!(setting.count, 1);
    }

    #[test]
    fn unrepresentable_timeout_clamps() {
        let setting = TimeoutSetting::for_duration(HCLK, 10_000_000).unwrap();
        assert_eq!(setting.prescaler, TIMEOUT_PRESCALER_MAX);
        assert_eq!(u32::from(setting.count), TIMEOUT_COUNT_MAX);
    }

    #[test]
    fn apply_programs_lanes_of_the_right_channel() {
        let regs = MockPdma::new();
        regs.poke(TOC0_1, 0x1234_5678);

        apply(
            &regs,
            1,
            Some(TimeoutSetting {
                prescaler: 5,
                count: 0xABCD,
            }),
        );
        assert_eq!(regs.peek(TOC0_1), 0xABCD_5678);
        assert_eq!(regs.peek(TOUTPSC0_7), 5 << 4);
        assert_eq!(regs.peek(TOUTEN), 1 << 1);
        assert_eq!(regs.peek(TOUTIEN), 1 << 1);

        apply(
            &regs,
            10,
            Some(TimeoutSetting {
                prescaler: 7,
                count: 3,
            }),
        );
        assert_eq!(regs.peek(TOUTPSC8_15), 7 << 8);
        assert_eq!(regs.peek(TOC0_1 + 5 * 4), 3);
    }

    #[test]
    fn apply_none_disables_counter_and_interrupt() {
        let regs = MockPdma::new();
        apply(
            &regs,
            3,
            Some(TimeoutSetting {
                prescaler: 0,
                count: 10,
            }),
        );
        apply(&regs, 3, None);
        assert_eq!(regs.peek(TOUTEN), 0);
        assert_eq!(regs.peek(TOUTIEN), 0);
    }
}
