//! Interrupt status handling and completion dispatch.
//!
//! [`InterruptStatus`] snapshots the four per-channel status sources in one
//! pass; [`Pdma::handle_interrupt`] turns the snapshot into per-channel
//! [`Events`] and runs the registered callbacks.

use embedded_hal::delay::DelayNs;

use crate::driver::callback::CallbackKind;
use crate::driver::channel::ControllerId;
use crate::driver::pdma::Pdma;
use crate::driver::timeout::{self, TimeoutSetting};
use crate::hal::cache::CacheMaintenance;
use crate::hal::registers::PdmaRegisters;
use crate::internal::bitset::ChannelMask;
use crate::internal::register::pdma::{ABTSTS, ALIGN, INTSTS, TDSTS, intsts};

// =============================================================================
// Events
// =============================================================================

/// Per-channel completion events
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Events(u32);

impl Events {
    /// Transfer aborted by a bus error
    pub const ABORT: Events = Events(1 << 0);
    /// Descriptor (or whole chain) completed
    pub const TRANSFER_DONE: Events = Events(1 << 1);
    /// Address alignment fault
    pub const ALIGNMENT: Events = Events(1 << 2);
    /// Peripheral idle timeout fired
    pub const TIMEOUT: Events = Events(1 << 3);

    /// No events
    pub const fn empty() -> Self {
        Events(0)
    }

    /// Every event
    pub const fn all() -> Self {
        Events(0xF)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Keep only known event bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Events(bits & Self::all().0)
    }

    /// Whether no event is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every event in `other` is set
    pub const fn contains(self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any event in `other` is set
    pub const fn intersects(self, other: Events) -> bool {
        self.0 & other.0 != 0
    }
}

impl core::ops::BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

impl core::fmt::Debug for Events {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const NAMES: [(Events, &str); 4] = [
            (Events::ABORT, "ABORT"),
            (Events::TRANSFER_DONE, "TRANSFER_DONE"),
            (Events::ALIGNMENT, "ALIGNMENT"),
            (Events::TIMEOUT, "TIMEOUT"),
        ];
        let mut first = true;
        f.write_str("Events(")?;
        for (event, name) in NAMES {
            if self.contains(event) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str(")")
    }
}

// =============================================================================
// Interrupt Status
// =============================================================================

/// One snapshot of a controller's per-channel status registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptStatus {
    /// Channels that aborted (ABTSTS)
    pub abort: u32,
    /// Channels that completed (TDSTS)
    pub done: u32,
    /// Channels with an alignment fault (ALIGN)
    pub alignment: u32,
    /// Channels whose idle timeout fired (INTSTS.REQTOF)
    pub timeout: u32,
}

impl InterruptStatus {
    /// Build from raw register values
    #[inline]
    pub fn from_raw(intsts_value: u32, abtsts: u32, tdsts: u32, align: u32) -> Self {
        Self {
            abort: abtsts,
            done: tdsts,
            alignment: align,
            timeout: (intsts_value & intsts::REQTOF_MASK) >> intsts::REQTOF_SHIFT,
        }
    }

    /// Read every status source once, then write the snapshot back (write-1-to-clear)
    pub fn read_and_clear<H: PdmaRegisters>(regs: &H) -> Self {
        let status = Self::from_raw(
            regs.read(INTSTS),
            regs.read(ABTSTS),
            regs.read(TDSTS),
            regs.read(ALIGN),
        );

        if status.abort != 0 {
            regs.write(ABTSTS, status.abort);
        }
        if status.done != 0 {
            regs.write(TDSTS, status.done);
        }
        if status.alignment != 0 {
            regs.write(ALIGN, status.alignment);
        }
        if status.timeout != 0 {
            regs.write(INTSTS, status.timeout << intsts::REQTOF_SHIFT);
        }
        status
    }

    /// Channels with at least one pending event
    #[inline]
    pub fn pending(&self) -> u32 {
        self.abort | self.done | self.alignment | self.timeout
    }

    /// Events recorded for channel `ch`
    pub fn events(&self, ch: u8) -> Events {
        let bit = 1u32 << ch;
        let mut events = Events::empty();
        if self.abort & bit != 0 {
            events |= Events::ABORT;
        }
        if self.done & bit != 0 {
            events |= Events::TRANSFER_DONE;
        }
        if self.alignment & bit != 0 {
            events |= Events::ALIGNMENT;
        }
        if self.timeout & bit != 0 {
            events |= Events::TIMEOUT;
        }
        events
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

impl<H, D, C> Pdma<H, D, C>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
{
    /// Service one controller's interrupt
    ///
    /// Call this from the controller's interrupt handler. Status is
    /// snapshotted and cleared first; then every channel with a pending
    /// event is serviced, lowest index first. For an allocated channel the
    /// Disable callback runs, then the Event callback runs once with the
    /// combined mask if it passes the channel's filter, then a fired idle
    /// timeout is re-armed. Bits of unallocated channels are dropped.
    pub fn handle_interrupt(&self, controller: ControllerId) {
        let ctrl = self.controller(controller);
        let status = InterruptStatus::read_and_clear(&ctrl.regs);

        let implemented = controller.channel_mask().bits();
        let stray = status.pending() & !implemented;
        if stray != 0 {
            warn!("{:?}: status for unimplemented channels {:#x}", controller, stray);
        }

        for ch in ChannelMask::from_bits(status.pending() & implemented).iter() {
            let events = status.events(ch);
            let dispatch = ctrl.state.with(|state| {
                if !state.allocated.contains(ch) {
                    return None;
                }
                let channel = &state.channels[ch as usize];
                let event = if channel.event_filter.intersects(events) {
                    channel.callbacks.get(CallbackKind::Event)
                } else {
                    None
                };
                Some((
                    channel.callbacks.get(CallbackKind::Disable),
                    event,
                    channel.idle_timeout_us,
                ))
            });

            let Some((disable, event, idle_timeout_us)) = dispatch else {
                trace!("{:?}: dropped {:?} on free channel {}", controller, events, ch);
                continue;
            };

            let timed_out = events.contains(Events::TIMEOUT) && !controller.is_low_power();
            if timed_out {
                timeout::stop(&ctrl.regs, ch);
            }

            if let Some(disable) = disable {
                disable(events);
            }
            if let Some(event) = event {
                event(events);
            }

            if timed_out {
                let setting = TimeoutSetting::for_duration(self.config().hclk_hz, idle_timeout_us);
                timeout::apply(&ctrl.regs, ch, setting);
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
