//! Fixed-width bitsets for channel and actor bookkeeping.

/// A 32-bit occupancy mask.
///
/// Bit `n` set means slot `n` is taken. Wide enough for the largest
/// controller channel file and for the actor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask(u32);

impl ChannelMask {
    /// Mask with no slots taken
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap a raw register or status value
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit pattern
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Single-bit mask for slot `index`
    pub const fn bit(index: u8) -> u32 {
        1 << index
    }

    /// Whether slot `index` is taken
    pub const fn contains(self, index: u8) -> bool {
        index < 32 && self.0 & (1 << index) != 0
    }

    /// Mark slot `index` as taken
    pub fn set(&mut self, index: u8) {
        self.0 |= Self::bit(index);
    }

    /// Mark slot `index` as free
    pub fn clear(&mut self, index: u8) {
        self.0 &= !Self::bit(index);
    }

    /// Lowest free slot below `limit`, if any
    pub fn first_clear(self, limit: u8) -> Option<u8> {
        let index = self.0.trailing_ones() as u8;
        (index < limit).then_some(index)
    }

    /// Lowest taken slot, if any
    pub fn first_set(self) -> Option<u8> {
        (self.0 != 0).then(|| self.0.trailing_zeros() as u8)
    }

    /// Number of taken slots
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Whether no slot is taken
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over taken slots, lowest first
    pub fn iter(self) -> impl Iterator<Item = u8> {
        let mut rest = self;
        core::iter::from_fn(move || {
            let index = rest.first_set()?;
            rest.clear(index);
            Some(index)
        })
    }
}
