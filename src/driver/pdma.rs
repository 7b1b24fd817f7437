//! The PDMA channel engine.
//!
//! [`Pdma`] owns the three controllers' register backends and channel
//! tables. Every public operation takes `&self`; channel bookkeeping lives
//! in critical-section cells shared with [`Pdma::handle_interrupt`].

use embedded_hal::delay::DelayNs;

use crate::descriptor::{Descriptor, DescriptorTable, check_transfer};
use crate::driver::callback::{CallbackKind, CallbackSet, Handler};
use crate::driver::channel::{ChannelId, ControllerId, Peripheral};
use crate::driver::config::{MemControl, PdmaConfig, Width};
use crate::driver::error::{ChannelError, ChannelResult, ConfigError, IoResult, Result};
use crate::driver::interrupt::Events;
use crate::driver::timeout::{self, TimeoutSetting};
use crate::hal::cache::{CacheMaintenance, NoCache};
use crate::hal::heap::{GLOBAL_HEAP, TableHeap};
use crate::hal::poll::poll_until;
use crate::hal::registers::PdmaRegisters;
use crate::hal::system::{NO_SYSTEM_CONTROL, SystemControl};
use crate::internal::bitset::ChannelMask;
use crate::internal::constants::{CONTROLLER_COUNT, DESCRIPTOR_SIZE, MAX_CHANNELS, MAX_TRANSFER_COUNT};
use crate::internal::register::pdma::{
    ABTSTS, ALIGN, CHCTL, CHRST, DSCT_CTL, DSCT_DA, DSCT_NEXT, DSCT_SA, INTEN, INTSTS,
    REQSEL_LANE_MASK, SWREQ, TDSTS, TOUTEN, TOUTIEN, ctl, dsct, intsts, reqsel,
};
use crate::sync::primitives::CriticalSectionCell;

// =============================================================================
// Channel Bookkeeping
// =============================================================================

pub(crate) struct ChannelState {
    pub(crate) peripheral: Peripheral,
    pub(crate) mem_control: MemControl,
    pub(crate) callbacks: CallbackSet,
    pub(crate) event_filter: Events,
    pub(crate) idle_timeout_us: u32,
    pub(crate) scatter: Option<DescriptorTable>,
}

impl ChannelState {
    const fn idle() -> Self {
        Self {
            peripheral: Peripheral::Memory,
            mem_control: MemControl::SrcIncDstInc,
            callbacks: CallbackSet::new(),
            event_filter: Events::empty(),
            idle_timeout_us: 0,
            scatter: None,
        }
    }

    fn bound(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            mem_control: peripheral.default_mem_control(),
            ..Self::idle()
        }
    }
}

pub(crate) struct ControllerState {
    pub(crate) initialized: bool,
    pub(crate) allocated: ChannelMask,
    pub(crate) channels: [ChannelState; MAX_CHANNELS],
}

impl ControllerState {
    const fn new() -> Self {
        Self {
            initialized: false,
            allocated: ChannelMask::empty(),
            channels: [const { ChannelState::idle() }; MAX_CHANNELS],
        }
    }
}

pub(crate) struct Controller<H> {
    pub(crate) regs: H,
    pub(crate) state: CriticalSectionCell<ControllerState>,
}

/// Descriptor tables for each address space
///
/// LPPDMA can only fetch descriptors from low-power SRAM, so its tables
/// usually come from a [`crate::hal::RegionHeap`] over that memory.
#[derive(Clone, Copy)]
pub struct TableHeaps {
    /// Heap for PDMA0 and PDMA1 tables
    pub general: &'static dyn TableHeap,
    /// Heap for LPPDMA tables
    pub low_power: &'static dyn TableHeap,
}

impl TableHeaps {
    /// Separate heaps for general and low-power tables
    pub fn new(general: &'static dyn TableHeap, low_power: &'static dyn TableHeap) -> Self {
        Self { general, low_power }
    }

    /// Both address spaces served by the global allocator
    pub fn global() -> Self {
        Self::new(&GLOBAL_HEAP, &GLOBAL_HEAP)
    }
}

/// How the live descriptor slot is loaded when a channel is armed
enum Live<'a> {
    Basic(&'a Descriptor),
    Scatter(u32),
}

// =============================================================================
// Engine
// =============================================================================

/// Channel pool over PDMA0, PDMA1 and LPPDMA
///
/// # Example
///
/// ```ignore
/// let pdma = Pdma::new(
///     unsafe { MmioPdma::all() },
///     delay,
///     NoCache,
///     TableHeaps::new(&GLOBAL_HEAP, &LPSRAM_TABLES),
///     PdmaConfig::new(),
/// )?;
///
/// let ch = pdma.allocate(Peripheral::Memory)?;
/// pdma.set_event_filter(ch, Events::TRANSFER_DONE)?;
/// pdma.register_callback(ch, CallbackKind::Event, handler(|ev| { /* ... */ }))?;
/// unsafe { pdma.transfer(ch, Width::Bits32, src, dst, 1024, 0)? };
/// ```
pub struct Pdma<H, D, C = NoCache> {
    controllers: [Controller<H>; CONTROLLER_COUNT],
    delay: D,
    cache: C,
    heaps: TableHeaps,
    system: &'static dyn SystemControl,
    config: PdmaConfig,
}

impl<H, D, C> Pdma<H, D, C>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
{
    /// Create the engine over one register backend per controller
    ///
    /// `registers` is in [`ControllerId::ALL`] order. Controllers are left
    /// untouched until their first channel is allocated.
    pub fn new(
        registers: [H; CONTROLLER_COUNT],
        delay: D,
        cache: C,
        heaps: TableHeaps,
        config: PdmaConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            controllers: registers.map(|regs| Controller {
                regs,
                state: CriticalSectionCell::new(ControllerState::new()),
            }),
            delay,
            cache,
            heaps,
            system: &NO_SYSTEM_CONTROL,
            config,
        })
    }

    /// Use `system` to reset and unmask each controller on its first allocation
    #[must_use]
    pub fn with_system_control(mut self, system: &'static dyn SystemControl) -> Self {
        self.system = system;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PdmaConfig {
        &self.config
    }

    /// Register backend of `controller`
    pub fn registers(&self, controller: ControllerId) -> &H {
        &self.controller(controller).regs
    }

    pub(crate) fn controller(&self, controller: ControllerId) -> &Controller<H> {
        &self.controllers[controller.index()]
    }

    fn heap(&self, controller: ControllerId) -> &'static dyn TableHeap {
        if controller.is_low_power() {
            self.heaps.low_power
        } else {
            self.heaps.general
        }
    }

    /// Run `f` on an allocated channel's bookkeeping
    pub(crate) fn with_channel<R, F>(&self, id: ChannelId, f: F) -> ChannelResult<R>
    where
        F: FnOnce(&mut ChannelState) -> R,
    {
        self.controller(id.controller()).state.with(|state| {
            if !state.allocated.contains(id.index()) {
                return Err(ChannelError::NotAllocated);
            }
            Ok(f(&mut state.channels[id.index() as usize]))
        })
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Whether `id` is currently allocated
    pub fn is_allocated(&self, id: ChannelId) -> bool {
        self.controller(id.controller())
            .state
            .with(|state| state.allocated.contains(id.index()))
    }

    /// Reserve the lowest free channel able to serve `peripheral`
    ///
    /// General requests try PDMA0 first and fall back to PDMA1. The channel
    /// is reset and enabled with the peripheral's default addressing mode,
    /// no callbacks, an empty event filter and no idle timeout.
    pub fn allocate(&self, peripheral: Peripheral) -> Result<ChannelId> {
        if !peripheral.is_valid() {
            return Err(ConfigError::InvalidConfig.into());
        }

        for &controller in peripheral.controllers() {
            let ctrl = self.controller(controller);
            let claimed = ctrl.state.with(|state| {
                let index = state.allocated.first_clear(controller.channel_count())?;
                if !state.initialized {
                    self.init_controller(controller);
                    state.initialized = true;
                    debug!("{:?}: initialized", controller);
                }
                state.allocated.set(index);
                state.channels[index as usize] = ChannelState::bound(peripheral);
                Some(index)
            });

            let Some(index) = claimed else {
                debug!("{:?}: no free channel for {:?}", controller, peripheral);
                continue;
            };

            let id = ChannelId::new(controller, index);
            if let Err(err) = self.reset_and_enable(id) {
                ctrl.state.with(|state| {
                    state.allocated.clear(index);
                    state.channels[index as usize] = ChannelState::idle();
                });
                warn!("{}: reset failed during allocation", id);
                return Err(err.into());
            }

            debug!("{}: allocated for {:?}", id, peripheral);
            return Ok(id);
        }

        Err(ChannelError::Unavailable.into())
    }

    /// Release `id`
    ///
    /// The live descriptor and next-link are cleared, the channel and its
    /// interrupts are disabled and the engine-owned chain table is freed.
    pub fn free(&self, id: ChannelId) -> Result<()> {
        let regs = &self.controller(id.controller()).regs;
        let ch = id.index();
        let bit = id.bit();

        let table = self.controller(id.controller()).state.with(|state| {
            if !state.allocated.contains(ch) {
                return Err(ChannelError::NotAllocated);
            }
            regs.write(dsct(ch, DSCT_CTL), 0);
            regs.write(dsct(ch, DSCT_NEXT), 0);
            regs.clear_bits(CHCTL, bit);
            regs.clear_bits(INTEN, bit);
            timeout::apply(regs, ch, None);

            let slot = &mut state.channels[ch as usize];
            let table = slot.scatter.take();
            *slot = ChannelState::idle();
            state.allocated.clear(ch);
            Ok(table)
        })?;

        drop(table);
        debug!("{}: freed", id);
        Ok(())
    }

    fn init_controller(&self, controller: ControllerId) {
        let info = controller.info();
        let regs = &self.controller(controller).regs;

        self.system.reset_module(info.reset_id);
        regs.write(CHCTL, 0);
        regs.write(INTEN, 0);
        regs.write(TOUTEN, 0);
        regs.write(TOUTIEN, 0);
        regs.write(ABTSTS, u32::MAX);
        regs.write(TDSTS, u32::MAX);
        regs.write(ALIGN, u32::MAX);
        regs.write(INTSTS, intsts::REQTOF_MASK);
        self.system.enable_irq(info.irq);
    }

    // =========================================================================
    // Channel Settings
    // =========================================================================

    /// Request source bound to `id`
    pub fn peripheral(&self, id: ChannelId) -> Result<Peripheral> {
        Ok(self.with_channel(id, |ch| ch.peripheral)?)
    }

    /// Events that reach the channel's Event callback
    pub fn set_event_filter(&self, id: ChannelId, filter: Events) -> Result<()> {
        Ok(self.with_channel(id, |ch| ch.event_filter = filter)?)
    }

    /// Current event filter of `id`
    pub fn event_filter(&self, id: ChannelId) -> Result<Events> {
        Ok(self.with_channel(id, |ch| ch.event_filter)?)
    }

    /// Addressing mode used by the next transfer on `id`
    pub fn memory_control(&self, id: ChannelId) -> Result<MemControl> {
        Ok(self.with_channel(id, |ch| ch.mem_control)?)
    }

    /// Change the addressing mode of `id`
    ///
    /// Memory-to-memory channels reject fixed-source modes.
    pub fn set_memory_control(&self, id: ChannelId, mode: MemControl) -> Result<()> {
        self.with_channel(id, |ch| -> Result<()> {
            if !ch.peripheral.supports(mode) {
                return Err(ConfigError::UnsupportedMemControl.into());
            }
            ch.mem_control = mode;
            Ok(())
        })?
    }

    /// Install `handler` in the `kind` slot of `id`, replacing any previous one
    pub fn register_callback(&self, id: ChannelId, kind: CallbackKind, handler: Handler) -> Result<()> {
        self.with_channel(id, |ch| {
            ch.callbacks.replace(kind, Some(handler));
        })?;
        Ok(())
    }

    /// Swap the `kind` slot of `id` in one critical section
    ///
    /// Returns the evicted handler so the caller can chain to it and later
    /// restore it with a second hijack.
    pub fn hijack_callback(
        &self,
        id: ChannelId,
        kind: CallbackKind,
        handler: Option<Handler>,
    ) -> Result<Option<Handler>> {
        Ok(self.with_channel(id, |ch| ch.callbacks.replace(kind, handler))?)
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    /// Encode a transfer into `desc` using `id`'s request source and mode
    ///
    /// A non-zero `next` links `desc` to the descriptor at that address;
    /// `silent` suppresses its completion interrupt.
    pub fn build_descriptor(
        &self,
        id: ChannelId,
        desc: &Descriptor,
        width: Width,
        src: u32,
        dst: u32,
        count: u32,
        next: u32,
        silent: bool,
    ) -> Result<()> {
        let (peripheral, mode) = self.with_channel(id, |ch| (ch.peripheral, ch.mem_control))?;
        desc.program(peripheral, mode, width, src, dst, count, next, silent)?;
        Ok(())
    }

    /// Allocate a zeroed table reachable by `id`'s controller
    pub fn allocate_scatter_table(&self, id: ChannelId, len: usize) -> Result<DescriptorTable> {
        if !self.is_allocated(id) {
            return Err(ChannelError::NotAllocated.into());
        }
        Ok(DescriptorTable::allocate(self.heap(id.controller()), len)?)
    }

    /// Return a table obtained from [`Pdma::allocate_scatter_table`]
    pub fn free_scatter_table(&self, table: DescriptorTable) {
        drop(table);
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Start a transfer of `count` elements from `src` to `dst`
    ///
    /// Counts above the single-descriptor limit are split over an
    /// engine-owned chain. `idle_timeout_us` of zero disables the idle
    /// timeout. Fails with [`ChannelError::Busy`] if the channel still has
    /// a live descriptor.
    ///
    /// # Safety
    ///
    /// Both ranges must be valid for DMA access and stay valid, and not be
    /// otherwise accessed, until the transfer completes or is terminated.
    pub unsafe fn transfer(
        &self,
        id: ChannelId,
        width: Width,
        src: u32,
        dst: u32,
        count: u32,
        idle_timeout_us: u32,
    ) -> Result<()> {
        check_transfer(width, src, dst, count)?;
        let (peripheral, mode) = self.with_channel(id, |ch| (ch.peripheral, ch.mem_control))?;
        self.ensure_idle(id)?;

        if count > MAX_TRANSFER_COUNT {
            return self.transfer_chain(id, peripheral, mode, width, src, dst, count, idle_timeout_us);
        }

        let desc = Descriptor::new();
        desc.program(peripheral, mode, width, src, dst, count, 0, false)?;
        self.flush_buffers(&desc);
        self.arm(id, peripheral, Live::Basic(&desc), idle_timeout_us);
        Ok(())
    }

    /// Start the chain in `table` at descriptor `head`
    ///
    /// # Safety
    ///
    /// `table` and every buffer it references must stay valid until the
    /// chain completes or the channel is terminated.
    pub unsafe fn scatter_gather_transfer(
        &self,
        id: ChannelId,
        table: &DescriptorTable,
        head: usize,
        idle_timeout_us: u32,
    ) -> Result<()> {
        let peripheral = self.with_channel(id, |ch| ch.peripheral)?;
        if head >= table.len() {
            return Err(ConfigError::InvalidConfig.into());
        }
        self.ensure_idle(id)?;
        self.start_chain(id, peripheral, table, head, idle_timeout_us);
        Ok(())
    }

    fn transfer_chain(
        &self,
        id: ChannelId,
        peripheral: Peripheral,
        mode: MemControl,
        width: Width,
        src: u32,
        dst: u32,
        count: u32,
        idle_timeout_us: u32,
    ) -> Result<()> {
        let slices = count.div_ceil(MAX_TRANSFER_COUNT) as usize;
        let table = self.take_scatter_table(id, slices)?;

        let result = Self::fill_chain(&table, peripheral, mode, width, src, dst, count);
        if result.is_ok() {
            debug!("{}: {} elements over {} descriptors", id, count, slices);
            self.start_chain(id, peripheral, &table, 0, idle_timeout_us);
        }

        // Freed meanwhile: the closure is dropped and the table with it
        let _ = self.with_channel(id, move |ch| ch.scatter = Some(table));
        result
    }

    fn fill_chain(
        table: &DescriptorTable,
        peripheral: Peripheral,
        mode: MemControl,
        width: Width,
        mut src: u32,
        mut dst: u32,
        count: u32,
    ) -> Result<()> {
        let step = MAX_TRANSFER_COUNT.wrapping_mul(width.bytes());
        let mut remaining = count;

        for (i, desc) in table.iter().enumerate() {
            let slice = remaining.min(MAX_TRANSFER_COUNT);
            let next = table.get(i + 1).map_or(0, Descriptor::address);
            desc.program(peripheral, mode, width, src, dst, slice, next, next != 0)?;

            remaining -= slice;
            if mode.source_increments() {
                src = src.wrapping_add(step);
            }
            if mode.destination_increments() {
                dst = dst.wrapping_add(step);
            }
        }
        Ok(())
    }

    /// Reuse the channel's chain table when it already has `len` entries
    fn take_scatter_table(&self, id: ChannelId, len: usize) -> Result<DescriptorTable> {
        let existing = self.with_channel(id, |ch| ch.scatter.take())?;
        if let Some(table) = existing.filter(|table| table.len() == len) {
            return Ok(table);
        }
        Ok(DescriptorTable::allocate(self.heap(id.controller()), len)?)
    }

    fn ensure_idle(&self, id: ChannelId) -> ChannelResult<()> {
        if self.live_control(id) & ctl::OPMODE_MASK != ctl::OPMODE_IDLE {
            return Err(ChannelError::Busy);
        }
        Ok(())
    }

    fn live_control(&self, id: ChannelId) -> u32 {
        self.registers(id.controller()).read(dsct(id.index(), DSCT_CTL))
    }

    fn start_chain(
        &self,
        id: ChannelId,
        peripheral: Peripheral,
        table: &DescriptorTable,
        head: usize,
        idle_timeout_us: u32,
    ) {
        for desc in table.chain(head) {
            self.cache.clean_invalidate(desc.address(), DESCRIPTOR_SIZE);
            self.flush_buffers(desc);
        }
        self.arm(id, peripheral, Live::Scatter(table[head].address()), idle_timeout_us);
    }

    fn flush_buffers(&self, desc: &Descriptor) {
        let span = desc.span();
        if desc.source_increments() {
            self.cache.clean_invalidate(desc.source(), span);
        }
        if desc.destination_increments() {
            self.cache.clean_invalidate(desc.destination(), span);
        }
    }

    /// Program everything but the descriptors and start the channel
    fn arm(&self, id: ChannelId, peripheral: Peripheral, live: Live<'_>, idle_timeout_us: u32) {
        let regs = self.registers(id.controller());
        let ch = id.index();

        let trigger = self
            .with_channel(id, |state| {
                state.idle_timeout_us = idle_timeout_us;
                state.callbacks.get(CallbackKind::Trigger)
            })
            .ok()
            .flatten();
        self.program_idle_timeout(id, idle_timeout_us);

        regs.set_bits(INTEN, id.bit());

        let (offset, shift) = reqsel(ch);
        regs.modify(offset, |v| {
            (v & !(REQSEL_LANE_MASK << shift)) | (u32::from(peripheral.request_source()) << shift)
        });

        match live {
            Live::Basic(desc) => {
                let [word, src, dst, next] = desc.words();
                regs.write(dsct(ch, DSCT_SA), src);
                regs.write(dsct(ch, DSCT_DA), dst);
                regs.write(dsct(ch, DSCT_NEXT), next);
                regs.write(dsct(ch, DSCT_CTL), word);
            }
            Live::Scatter(head) => {
                regs.write(dsct(ch, DSCT_NEXT), head);
                regs.write(dsct(ch, DSCT_CTL), ctl::OPMODE_SCATTER);
            }
        }

        if peripheral.is_memory() {
            regs.write(SWREQ, id.bit());
        } else if let Some(trigger) = trigger {
            trigger(Events::empty());
        }
        trace!("{}: armed", id);
    }

    // =========================================================================
    // Idle Timeout
    // =========================================================================

    /// Set the idle timeout of `id`; zero disables it
    ///
    /// Accepted but without effect on LPPDMA channels.
    pub fn set_idle_timeout(&self, id: ChannelId, timeout_us: u32) -> Result<()> {
        self.with_channel(id, |ch| ch.idle_timeout_us = timeout_us)?;
        self.program_idle_timeout(id, timeout_us);
        Ok(())
    }

    fn program_idle_timeout(&self, id: ChannelId, timeout_us: u32) {
        if id.controller().is_low_power() {
            return;
        }
        let setting = TimeoutSetting::for_duration(self.config.hclk_hz, timeout_us);
        timeout::apply(self.registers(id.controller()), id.index(), setting);
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Abandon whatever `id` is doing: reset it, then re-enable it
    pub fn terminate(&self, id: ChannelId) -> Result<()> {
        if !self.is_allocated(id) {
            return Err(ChannelError::NotAllocated.into());
        }
        self.reset_and_enable(id)?;
        info!("{}: terminated", id);
        Ok(())
    }

    /// Reset `id` and leave it disabled
    pub fn reset_channel(&self, id: ChannelId) -> Result<()> {
        if !self.is_allocated(id) {
            return Err(ChannelError::NotAllocated.into());
        }
        Ok(self.reset(id)?)
    }

    fn reset(&self, id: ChannelId) -> IoResult<()> {
        let regs = self.registers(id.controller());
        let bit = id.bit();
        regs.write(CHRST, bit);

        let mut delay = self.delay.clone();
        poll_until(
            &mut delay,
            self.config.reset_timeout_us,
            self.config.reset_poll_interval_us,
            || regs.read(CHCTL) & bit == 0,
        )
        .inspect_err(|_| warn!("{}: reset did not complete", id))
    }

    fn reset_and_enable(&self, id: ChannelId) -> IoResult<()> {
        self.reset(id)?;
        let regs = self.registers(id.controller());
        regs.write(dsct(id.index(), DSCT_CTL), 0);
        regs.set_bits(CHCTL, id.bit());
        Ok(())
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Whether `id` still has a live descriptor
    pub fn is_busy(&self, id: ChannelId) -> Result<bool> {
        if !self.is_allocated(id) {
            return Err(ChannelError::NotAllocated.into());
        }
        Ok(self.ensure_idle(id).is_err())
    }

    /// Elements the live descriptor has yet to move
    pub fn remaining_count(&self, id: ChannelId) -> Result<u32> {
        if !self.is_allocated(id) {
            return Err(ChannelError::NotAllocated.into());
        }
        let word = self.live_control(id);
        Ok(((word & ctl::TXCNT_MASK) >> ctl::TXCNT_SHIFT) + 1)
    }

    /// Bytes moved so far out of `requested_bytes`
    pub fn transferred_bytes(&self, id: ChannelId, requested_bytes: u32) -> Result<u32> {
        let remaining = self.remaining_count(id)?;
        let width = Width::from_ctl(self.live_control(id)).map_or(1, Width::bytes);
        Ok(requested_bytes.saturating_sub(remaining * width))
    }

    /// Raw next-link of `id`'s live descriptor
    pub fn descriptor_pointer(&self, id: ChannelId) -> u32 {
        self.registers(id.controller())
            .read(dsct(id.index(), DSCT_NEXT))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]
mod tests {
    extern crate std;

    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;
    use crate::driver::callback::handler;
    use crate::driver::channel::Direction;
    use crate::driver::error::{AllocError, Error, IoError};
    use crate::internal::register::pdma::{TOC0_1, toc};
    use crate::testing::{
        Completion, RecordingSystem, SystemCall, TestPdma, leak_region_heap, mock_pdma,
        mock_pdma_with, mock_pdma_with_heaps,
    };

    const SRC: u32 = 0x2000_1000;
    const DST: u32 = 0x2000_8000;

    fn regs(pdma: &TestPdma, id: ChannelId) -> &crate::testing::MockPdma {
        pdma.registers(id.controller())
    }

    fn recorder() -> (Handler, Arc<Mutex<Vec<Events>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (handler(move |events| sink.lock().unwrap().push(events)), seen)
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    #[test]
    fn allocate_hands_out_lowest_channel_then_falls_back_to_pdma1() {
        let pdma = mock_pdma();
        for i in 0..16 {
            let id = pdma.allocate(Peripheral::Memory).unwrap();
            assert_eq!(id, ChannelId::new(ControllerId::Pdma0, i));
        }
        let id = pdma.allocate(Peripheral::Uart(2, Direction::Rx)).unwrap();
        assert_eq!(id, ChannelId::new(ControllerId::Pdma1, 0));
        assert_eq!(pdma.peripheral(id).unwrap(), Peripheral::Uart(2, Direction::Rx));
    }

    #[test]
    fn allocate_reports_unavailable_when_exhausted() {
        let pdma = mock_pdma();
        for _ in 0..32 {
            pdma.allocate(Peripheral::Memory).unwrap();
        }
        assert_eq!(
            pdma.allocate(Peripheral::Memory),
            Err(Error::Channel(ChannelError::Unavailable))
        );
        // LPPDMA is a separate pool
        assert!(pdma.allocate(Peripheral::LpMemory).is_ok());
    }

    #[test]
    fn low_power_requests_use_only_lppdma() {
        let pdma = mock_pdma();
        for i in 0..4 {
            let id = pdma.allocate(Peripheral::LpUart0(Direction::Tx)).unwrap();
            assert_eq!(id, ChannelId::new(ControllerId::LpPdma, i));
        }
        assert_eq!(
            pdma.allocate(Peripheral::Dmic0Rx),
            Err(Error::Channel(ChannelError::Unavailable))
        );
    }

    #[test]
    fn allocate_rejects_unknown_request_source() {
        let pdma = mock_pdma();
        assert_eq!(
            pdma.allocate(Peripheral::Uart(12, Direction::Tx)),
            Err(Error::Config(ConfigError::InvalidConfig))
        );
    }

    #[test]
    fn allocate_enables_channel_with_defaults() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Spi(1, Direction::Tx)).unwrap();
        assert_ne!(regs(&pdma, id).peek(CHCTL) & id.bit(), 0);
        assert_eq!(pdma.memory_control(id).unwrap(), MemControl::SrcIncDstFix);
        assert_eq!(pdma.event_filter(id).unwrap(), Events::empty());
        assert!(!pdma.is_busy(id).unwrap());
    }

    #[test]
    fn allocate_rolls_back_when_reset_hangs() {
        let pdma = mock_pdma();
        let first = pdma.allocate(Peripheral::Memory).unwrap();
        let regs = regs(&pdma, first);
        regs.set_reset_stuck(true);
        // Channel 0 stays enabled; a CHRST of channel 1 is ignored too, but
        // its CHCTL bit was never set, so allocation still succeeds
        let second = pdma.allocate(Peripheral::Memory).unwrap();
        assert_eq!(second.index(), 1);

        pdma.free(first).unwrap();
        regs.poke(CHCTL, regs.peek(CHCTL) | first.bit());
        assert_eq!(
            pdma.allocate(Peripheral::Memory),
            Err(Error::Io(IoError::Timeout))
        );
        assert!(!pdma.is_allocated(first));
    }

    #[test]
    fn first_allocation_resets_and_unmasks_the_controller_once() {
        let system = RecordingSystem::leak();
        let pdma = mock_pdma().with_system_control(system);

        pdma.allocate(Peripheral::Memory).unwrap();
        pdma.allocate(Peripheral::Memory).unwrap();
        let pdma0 = ControllerId::Pdma0.info();
        assert_eq!(
            system.calls(),
            [SystemCall::Reset(pdma0.reset_id), SystemCall::EnableIrq(pdma0.irq)]
        );

        pdma.allocate(Peripheral::Dmic0Rx).unwrap();
        let lp = ControllerId::LpPdma.info();
        assert_eq!(
            system.calls()[2..],
            [SystemCall::Reset(lp.reset_id), SystemCall::EnableIrq(lp.irq)]
        );
        // PDMA1 has not been touched yet
        assert!(!system.calls().contains(&SystemCall::EnableIrq(ControllerId::Pdma1.info().irq)));
    }

    #[test]
    fn second_controller_is_brought_up_on_fallback() {
        let system = RecordingSystem::leak();
        let pdma = mock_pdma().with_system_control(system);
        let regs = pdma.registers(ControllerId::Pdma1);
        regs.poke(INTEN, 0xFFFF);

        for _ in 0..16 {
            pdma.allocate(Peripheral::Memory).unwrap();
        }
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        assert_eq!(id.controller(), ControllerId::Pdma1);
        assert_eq!(regs.peek(INTEN), 0);
        assert_eq!(system.calls().len(), 4);
    }

    #[test]
    fn free_clears_live_slot_and_channel_is_reusable() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let regs = regs(&pdma, id);
        regs.poke(dsct(id.index(), DSCT_NEXT), 0x2000_0040);
        pdma.set_idle_timeout(id, 500).unwrap();

        pdma.free(id).unwrap();
        assert_eq!(pdma.descriptor_pointer(id), 0);
        assert_eq!(regs.peek(CHCTL) & id.bit(), 0);
        assert_eq!(regs.peek(INTEN) & id.bit(), 0);
        assert_eq!(regs.peek(TOUTEN) & id.bit(), 0);
        assert!(!pdma.is_allocated(id));

        assert_eq!(pdma.allocate(Peripheral::Memory).unwrap(), id);
    }

    #[test]
    fn operations_on_free_channel_fail() {
        let pdma = mock_pdma();
        let id = ChannelId::new(ControllerId::Pdma1, 3);
        let not_allocated = Err(Error::Channel(ChannelError::NotAllocated));
        assert_eq!(pdma.free(id), not_allocated);
        assert_eq!(pdma.terminate(id), not_allocated);
        assert_eq!(pdma.set_event_filter(id, Events::all()), not_allocated);
        assert_eq!(
            unsafe { pdma.transfer(id, Width::Bits8, SRC, DST, 4, 0) },
            not_allocated
        );
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    #[test]
    fn memory_channels_reject_fixed_source_modes() {
        let pdma = mock_pdma();
        let mem = pdma.allocate(Peripheral::Memory).unwrap();
        assert_eq!(
            pdma.set_memory_control(mem, MemControl::SrcFixDstInc),
            Err(Error::Config(ConfigError::UnsupportedMemControl))
        );
        pdma.set_memory_control(mem, MemControl::SrcIncDstFix).unwrap();
        assert_eq!(pdma.memory_control(mem).unwrap(), MemControl::SrcIncDstFix);

        let rx = pdma.allocate(Peripheral::Uart(0, Direction::Rx)).unwrap();
        pdma.set_memory_control(rx, MemControl::SrcFixDstFix).unwrap();
    }

    #[test]
    fn hijack_returns_previous_handler_for_restore() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let (original, original_seen) = recorder();
        let (thief, thief_seen) = recorder();

        pdma.register_callback(id, CallbackKind::Event, original).unwrap();
        let evicted = pdma
            .hijack_callback(id, CallbackKind::Event, Some(thief))
            .unwrap();
        assert!(evicted.is_some());

        pdma.set_event_filter(id, Events::TRANSFER_DONE).unwrap();
        regs(&pdma, id).raise(id.index(), Events::TRANSFER_DONE);
        pdma.handle_interrupt(id.controller());
        assert_eq!(thief_seen.lock().unwrap().len(), 1);
        assert!(original_seen.lock().unwrap().is_empty());

        let restored = pdma.hijack_callback(id, CallbackKind::Event, evicted).unwrap();
        assert!(restored.is_some());
        regs(&pdma, id).raise(id.index(), Events::TRANSFER_DONE);
        pdma.handle_interrupt(id.controller());
        assert_eq!(original_seen.lock().unwrap().len(), 1);
        assert_eq!(thief_seen.lock().unwrap().len(), 1);
    }

    // -------------------------------------------------------------------------
    // Transfers
    // -------------------------------------------------------------------------

    #[test]
    fn transfer_rejects_bad_requests_before_touching_hardware() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let regs = regs(&pdma, id);

        assert_eq!(
            unsafe { pdma.transfer(id, Width::Bits32, SRC + 2, DST, 4, 0) },
            Err(Error::Config(ConfigError::MisalignedAddress))
        );
        assert_eq!(
            unsafe { pdma.transfer(id, Width::Bits16, SRC, DST, 0, 0) },
            Err(Error::Config(ConfigError::ZeroCount))
        );
        assert!(!regs.wrote(SWREQ));
    }

    #[test]
    fn basic_transfer_loads_live_slot_and_triggers() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let regs = regs(&pdma, id);
        regs.set_completion(id.index(), Completion::Hold);

        unsafe { pdma.transfer(id, Width::Bits32, SRC, DST, 64, 0).unwrap() };

        let ch = id.index();
        assert_eq!(regs.peek(dsct(ch, DSCT_SA)), SRC);
        assert_eq!(regs.peek(dsct(ch, DSCT_DA)), DST);
        assert_eq!(regs.peek(dsct(ch, DSCT_NEXT)), 0);
        let word = regs.peek(dsct(ch, DSCT_CTL));
        assert_eq!(word & ctl::OPMODE_MASK, ctl::OPMODE_BASIC);
        assert_eq!(word & ctl::TXWIDTH_MASK, ctl::TXWIDTH_32);
        assert_eq!((word & ctl::TXCNT_MASK) >> ctl::TXCNT_SHIFT, 63);
        assert_ne!(regs.peek(INTEN) & id.bit(), 0);
        assert_eq!(regs.triggers(), [ch]);
        assert_eq!(pdma.remaining_count(id).unwrap(), 64);
    }

    #[test]
    fn transfer_on_live_channel_is_busy() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        regs(&pdma, id).set_completion(id.index(), Completion::Hold);

        unsafe { pdma.transfer(id, Width::Bits8, SRC, DST, 16, 0).unwrap() };
        assert!(pdma.is_busy(id).unwrap());
        assert_eq!(
            unsafe { pdma.transfer(id, Width::Bits8, SRC, DST, 16, 0) },
            Err(Error::Channel(ChannelError::Busy))
        );

        pdma.terminate(id).unwrap();
        assert!(!pdma.is_busy(id).unwrap());
        unsafe { pdma.transfer(id, Width::Bits8, SRC, DST, 16, 0).unwrap() };
    }

    #[test]
    fn peripheral_transfer_selects_request_and_calls_trigger() {
        let pdma = mock_pdma();
        let tx = Peripheral::Uart(3, Direction::Tx);
        let id = pdma.allocate(tx).unwrap();
        let regs = regs(&pdma, id);
        let (trigger, seen) = recorder();
        pdma.register_callback(id, CallbackKind::Trigger, trigger).unwrap();

        unsafe { pdma.transfer(id, Width::Bits8, SRC, 0x4007_3020, 32, 0).unwrap() };

        let (offset, shift) = reqsel(id.index());
        assert_eq!(
            (regs.peek(offset) >> shift) & REQSEL_LANE_MASK,
            u32::from(tx.request_source())
        );
        assert!(!regs.wrote(SWREQ));
        assert_eq!(*seen.lock().unwrap(), [Events::empty()]);
    }

    #[test]
    fn large_transfer_is_split_over_a_chain() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let count = MAX_TRANSFER_COUNT * 2 + 10;

        unsafe { pdma.transfer(id, Width::Bits8, SRC, DST, count, 0).unwrap() };

        let (slices, head) = pdma
            .with_channel(id, |ch| {
                let table = ch.scatter.as_ref().unwrap();
                let slices: Vec<_> = table
                    .iter()
                    .map(|d| (d.count(), d.is_silent(), d.source(), d.destination()))
                    .collect();
                assert_eq!(table[0].next(), table[1].address());
                assert_eq!(table[1].next(), table[2].address());
                assert_eq!(table[2].next(), 0);
                (slices, table[0].address())
            })
            .unwrap();

        let step = MAX_TRANSFER_COUNT;
        assert_eq!(
            slices,
            [
                (MAX_TRANSFER_COUNT, true, SRC, DST),
                (MAX_TRANSFER_COUNT, true, SRC + step, DST + step),
                (10, false, SRC + 2 * step, DST + 2 * step),
            ]
        );
        assert_eq!(pdma.descriptor_pointer(id), head);
    }

    fn chain_links(pdma: &TestPdma, id: ChannelId) -> Vec<(u32, u32, u32)> {
        pdma.with_channel(id, |ch| {
            ch.scatter
                .as_ref()
                .unwrap()
                .iter()
                .map(|d| (d.source(), d.destination(), d.count()))
                .collect()
        })
        .unwrap()
    }

    #[test]
    fn chain_keeps_fixed_source_across_slices() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Uart(1, Direction::Rx)).unwrap();
        assert_eq!(pdma.memory_control(id).unwrap(), MemControl::SrcFixDstInc);
        let fifo = 0x4007_1000;
        let count = MAX_TRANSFER_COUNT * 2 + 3;

        unsafe { pdma.transfer(id, Width::Bits16, fifo, DST, count, 0).unwrap() };

        let step = MAX_TRANSFER_COUNT * 2;
        assert_eq!(
            chain_links(&pdma, id),
            [
                (fifo, DST, MAX_TRANSFER_COUNT),
                (fifo, DST + step, MAX_TRANSFER_COUNT),
                (fifo, DST + 2 * step, 3),
            ]
        );
    }

    #[test]
    fn chain_keeps_fixed_destination_across_slices() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Spi(0, Direction::Tx)).unwrap();
        assert_eq!(pdma.memory_control(id).unwrap(), MemControl::SrcIncDstFix);
        let fifo = 0x4006_0020;
        let count = MAX_TRANSFER_COUNT + 7;

        unsafe { pdma.transfer(id, Width::Bits32, SRC, fifo, count, 0).unwrap() };

        let step = MAX_TRANSFER_COUNT * 4;
        assert_eq!(
            chain_links(&pdma, id),
            [(SRC, fifo, MAX_TRANSFER_COUNT), (SRC + step, fifo, 7)]
        );
        // Only the incrementing side is cache-maintained
        assert!(pdma.cache.ranges().iter().all(|&(addr, _)| addr != fifo));
    }

    #[test]
    fn low_power_chains_come_from_the_low_power_heap() {
        let general = leak_region_heap(4096);
        let low_power = leak_region_heap(4096);
        let pdma = mock_pdma_with_heaps(PdmaConfig::new(), TableHeaps::new(general, low_power));

        let lp = pdma.allocate(Peripheral::LpUart0(Direction::Rx)).unwrap();
        assert_eq!(lp.controller(), ControllerId::LpPdma);
        unsafe {
            pdma.transfer(lp, Width::Bits8, 0x4058_4000, DST, MAX_TRANSFER_COUNT * 2 + 3, 0)
                .unwrap();
        };
        let lp_used = low_power.used();
        assert!(lp_used >= 3 * DESCRIPTOR_SIZE);
        assert_eq!(general.used(), 0);

        let table = pdma.allocate_scatter_table(lp, 2).unwrap();
        assert!(low_power.used() > lp_used);
        assert_eq!(general.used(), 0);
        pdma.free_scatter_table(table);
        assert_eq!(low_power.used(), lp_used);

        let mem = pdma.allocate(Peripheral::Memory).unwrap();
        unsafe { pdma.transfer(mem, Width::Bits8, SRC, DST, MAX_TRANSFER_COUNT + 1, 0).unwrap() };
        assert!(general.used() >= 2 * DESCRIPTOR_SIZE);
        assert_eq!(low_power.used(), lp_used);

        pdma.free(lp).unwrap();
        assert_eq!(low_power.used(), 0);
    }

    #[test]
    fn chain_table_is_reused_for_the_same_length() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let count = MAX_TRANSFER_COUNT + 1;
        let head = |pdma: &TestPdma| {
            pdma.with_channel(id, |ch| ch.scatter.as_ref().map(|t| t[0].address()))
                .unwrap()
        };

        unsafe { pdma.transfer(id, Width::Bits16, SRC, DST, count, 0).unwrap() };
        let first = head(&pdma);
        unsafe { pdma.transfer(id, Width::Bits16, SRC, DST, count, 0).unwrap() };
        assert_eq!(head(&pdma), first);
    }

    #[test]
    fn scatter_gather_starts_at_head_and_checks_bounds() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        let table = pdma.allocate_scatter_table(id, 2).unwrap();
        pdma.build_descriptor(id, &table[0], Width::Bits32, SRC, DST, 8, table[1].address(), true)
            .unwrap();
        pdma.build_descriptor(id, &table[1], Width::Bits32, SRC + 32, DST + 32, 8, 0, false)
            .unwrap();

        assert_eq!(
            unsafe { pdma.scatter_gather_transfer(id, &table, 2, 0) },
            Err(Error::Config(ConfigError::InvalidConfig))
        );

        regs(&pdma, id).set_completion(id.index(), Completion::Hold);
        unsafe { pdma.scatter_gather_transfer(id, &table, 0, 0).unwrap() };
        let word = regs(&pdma, id).peek(dsct(id.index(), DSCT_CTL));
        assert_eq!(word & ctl::OPMODE_MASK, ctl::OPMODE_SCATTER);
        assert_eq!(pdma.descriptor_pointer(id), table[0].address());

        pdma.terminate(id).unwrap();
        pdma.free_scatter_table(table);
    }

    #[test]
    fn scatter_table_requires_entries() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        assert_eq!(
            pdma.allocate_scatter_table(id, 0).err(),
            Some(Error::Alloc(AllocError::DescriptorTable))
        );
    }

    #[test]
    fn buffers_and_descriptors_are_cleaned_before_arming() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        unsafe { pdma.transfer(id, Width::Bits32, SRC, DST, 64, 0).unwrap() };
        assert_eq!(pdma.cache.ranges(), [(SRC, 256), (DST, 256)]);

        pdma.cache.clear();
        pdma.set_memory_control(id, MemControl::SrcIncDstFix).unwrap();
        unsafe { pdma.transfer(id, Width::Bits32, SRC, DST, 64, 0).unwrap() };
        assert_eq!(pdma.cache.ranges(), [(SRC, 256)]);

        pdma.cache.clear();
        pdma.set_memory_control(id, MemControl::SrcIncDstInc).unwrap();
        unsafe { pdma.transfer(id, Width::Bits8, SRC, DST, MAX_TRANSFER_COUNT + 4, 0).unwrap() };
        let table_ranges = pdma
            .cache
            .ranges()
            .iter()
            .filter(|&&(_, len)| len == DESCRIPTOR_SIZE)
            .count();
        assert_eq!(table_ranges, 2);
    }

    // -------------------------------------------------------------------------
    // Timeouts, cancellation, status
    // -------------------------------------------------------------------------

    #[test]
    fn idle_timeout_programs_general_controllers_only() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        pdma.set_idle_timeout(id, 1_000).unwrap();
        let regs = regs(&pdma, id);
        let (offset, shift) = toc(id.index());
        assert_eq!(offset, TOC0_1);
        assert_eq!((regs.peek(offset) >> shift) & 0xFFFF, 860);
        assert_ne!(regs.peek(TOUTEN) & id.bit(), 0);

        let lp = pdma.allocate(Peripheral::LpMemory).unwrap();
        pdma.set_idle_timeout(lp, 1_000).unwrap();
        let lp_regs = pdma.registers(ControllerId::LpPdma);
        assert_eq!(lp_regs.peek(TOUTEN), 0);
        assert_eq!(lp_regs.peek(TOC0_1), 0);
    }

    #[test]
    fn terminate_times_out_on_stuck_reset() {
        let pdma = mock_pdma_with(PdmaConfig::new().with_reset_timeout_us(50));
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        regs(&pdma, id).set_reset_stuck(true);

        assert_eq!(pdma.terminate(id), Err(Error::Io(IoError::Timeout)));
        assert!(pdma.delay.total_us() >= 50);
        assert!(pdma.is_allocated(id));
    }

    #[test]
    fn reset_channel_leaves_channel_disabled() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        pdma.reset_channel(id).unwrap();
        assert_eq!(regs(&pdma, id).peek(CHCTL) & id.bit(), 0);
        pdma.terminate(id).unwrap();
        assert_ne!(regs(&pdma, id).peek(CHCTL) & id.bit(), 0);
    }

    #[test]
    fn aborted_transfer_reports_progress() {
        let pdma = mock_pdma();
        let id = pdma.allocate(Peripheral::Memory).unwrap();
        regs(&pdma, id).set_completion(id.index(), Completion::Abort { remaining: 100 });

        unsafe { pdma.transfer(id, Width::Bits32, SRC, DST, 1024, 0).unwrap() };
        assert_eq!(pdma.remaining_count(id).unwrap(), 100);
        assert_eq!(pdma.transferred_bytes(id, 4096).unwrap(), 4096 - 400);
    }
}
