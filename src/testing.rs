//! Host-side mocks shared by the unit tests.
//!
//! [`MockPdma`] models one controller's register file closely enough for
//! the engine and dispatcher to run on the host: status registers are
//! write-one-to-clear, INTSTS summarizes them, CHRST completes immediately
//! and a software request finishes (or aborts, or hangs) the channel.
//! Nothing is copied: buffers are only addresses to the mock.

#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use std::boxed::Box;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::vec;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::driver::channel::ControllerId;
use crate::driver::config::PdmaConfig;
use crate::driver::interrupt::Events;
use crate::driver::pdma::{Pdma, TableHeaps};
use crate::hal::cache::CacheMaintenance;
use crate::hal::heap::{GLOBAL_HEAP, RegionHeap};
use crate::hal::registers::PdmaRegisters;
use crate::hal::system::SystemControl;
use crate::internal::register::pdma::{
    ABTSTS, ALIGN, CHCTL, CHRST, DSCT_CTL, INTSTS, SWREQ, TDSTS, ctl, dsct, intsts,
};

// =============================================================================
// Register File
// =============================================================================

/// What a channel does when software-triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Runs to the end and raises transfer-done
    Done,
    /// Stops with `remaining` elements left and raises abort
    Abort { remaining: u32 },
    /// Stays live; nothing is raised
    Hold,
}

#[derive(Default)]
struct MockState {
    regs: HashMap<usize, u32>,
    timeouts: u32,
    completions: HashMap<u8, Completion>,
    triggers: Vec<u8>,
    writes: Vec<(usize, u32)>,
    reset_stuck: bool,
}

impl MockState {
    fn get(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn set(&mut self, offset: usize, value: u32) {
        self.regs.insert(offset, value);
    }

    fn complete(&mut self, ch: u8) {
        let bit = 1u32 << ch;
        let word = self.get(dsct(ch, DSCT_CTL));
        let idle = word & !(ctl::OPMODE_MASK | ctl::TXCNT_MASK);

        match self.completions.get(&ch).copied().unwrap_or(Completion::Done) {
            Completion::Done => {
                self.set(dsct(ch, DSCT_CTL), idle);
                let scatter = word & ctl::OPMODE_MASK == ctl::OPMODE_SCATTER;
                if scatter || word & ctl::TBINTDIS == 0 {
                    let done = self.get(TDSTS) | bit;
                    self.set(TDSTS, done);
                }
            }
            Completion::Abort { remaining } => {
                let left = remaining.saturating_sub(1) << ctl::TXCNT_SHIFT;
                self.set(dsct(ch, DSCT_CTL), idle | (left & ctl::TXCNT_MASK));
                let abort = self.get(ABTSTS) | bit;
                self.set(ABTSTS, abort);
            }
            Completion::Hold => {}
        }
    }
}

/// One controller's register file
#[derive(Default)]
pub struct MockPdma {
    state: Mutex<MockState>,
}

impl MockPdma {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Store a raw value, bypassing register semantics
    pub fn poke(&self, offset: usize, value: u32) {
        self.lock().set(offset, value);
    }

    /// Raw stored value
    pub fn peek(&self, offset: usize) -> u32 {
        self.lock().get(offset)
    }

    pub fn set_completion(&self, ch: u8, completion: Completion) {
        self.lock().completions.insert(ch, completion);
    }

    /// Keep CHCTL bits set across CHRST writes
    pub fn set_reset_stuck(&self, stuck: bool) {
        self.lock().reset_stuck = stuck;
    }

    /// Raise status for `ch` as the hardware would
    pub fn raise(&self, ch: u8, events: Events) {
        let mut state = self.lock();
        let bit = 1u32 << ch;
        for (event, offset) in [
            (Events::ABORT, ABTSTS),
            (Events::TRANSFER_DONE, TDSTS),
            (Events::ALIGNMENT, ALIGN),
        ] {
            if events.contains(event) {
                let value = state.get(offset) | bit;
                state.set(offset, value);
            }
        }
        if events.contains(Events::TIMEOUT) {
            state.timeouts |= bit;
        }
    }

    /// Channels software-triggered so far, in order
    pub fn triggers(&self) -> Vec<u8> {
        self.lock().triggers.clone()
    }

    /// Every write seen, in order
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.lock().writes.clone()
    }

    pub fn wrote(&self, offset: usize) -> bool {
        self.lock().writes.iter().any(|&(o, _)| o == offset)
    }
}

impl PdmaRegisters for MockPdma {
    fn read(&self, offset: usize) -> u32 {
        let state = self.lock();
        if offset != INTSTS {
            return state.get(offset);
        }

        let mut value = state.timeouts << intsts::REQTOF_SHIFT;
        if state.get(ABTSTS) != 0 {
            value |= intsts::ABTIF;
        }
        if state.get(TDSTS) != 0 {
            value |= intsts::TDIF;
        }
        if state.get(ALIGN) != 0 {
            value |= intsts::ALIGNF;
        }
        value
    }

    fn write(&self, offset: usize, value: u32) {
        let mut state = self.lock();
        state.writes.push((offset, value));

        match offset {
            ABTSTS | TDSTS | ALIGN => {
                let cleared = state.get(offset) & !value;
                state.set(offset, cleared);
            }
            INTSTS => {
                state.timeouts &= !((value & intsts::REQTOF_MASK) >> intsts::REQTOF_SHIFT);
            }
            CHRST => {
                if state.reset_stuck {
                    return;
                }
                let enabled = state.get(CHCTL) & !value;
                state.set(CHCTL, enabled);
                for ch in (0..16u8).filter(|ch| value & (1 << ch) != 0) {
                    state.set(dsct(ch, DSCT_CTL), 0);
                }
            }
            SWREQ => {
                for ch in (0..16u8).filter(|ch| value & (1 << ch) != 0) {
                    state.triggers.push(ch);
                    state.complete(ch);
                }
            }
            _ => state.set(offset, value),
        }
    }
}

// =============================================================================
// Delay and Cache
// =============================================================================

/// Delay that only accumulates the time asked for
#[derive(Clone, Default)]
pub struct MockDelay {
    elapsed_ns: Arc<AtomicU64>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_us(&self) -> u64 {
        self.elapsed_ns.load(Ordering::Relaxed) / 1_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.fetch_add(u64::from(ns), Ordering::Relaxed);
    }
}

/// Records every maintained range
#[derive(Clone, Default)]
pub struct CountingCache {
    ranges: Arc<Mutex<Vec<(u32, usize)>>>,
}

impl CountingCache {
    pub fn ranges(&self) -> Vec<(u32, usize)> {
        self.ranges.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.ranges.lock().unwrap().clear();
    }
}

impl CacheMaintenance for CountingCache {
    fn clean_invalidate(&self, addr: u32, len: usize) {
        self.ranges.lock().unwrap().push((addr, len));
    }
}

/// A system-controller call seen by [`RecordingSystem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCall {
    Reset(u32),
    EnableIrq(u16),
}

/// Records every reset and interrupt enable, in order
#[derive(Default)]
pub struct RecordingSystem {
    calls: Mutex<Vec<SystemCall>>,
}

impl RecordingSystem {
    /// A recorder that lives for the rest of the test binary
    pub fn leak() -> &'static Self {
        Box::leak(Box::default())
    }

    pub fn calls(&self) -> Vec<SystemCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl SystemControl for RecordingSystem {
    fn reset_module(&self, reset_id: u32) {
        self.calls.lock().unwrap().push(SystemCall::Reset(reset_id));
    }

    fn enable_irq(&self, irq: u16) {
        self.calls.lock().unwrap().push(SystemCall::EnableIrq(irq));
    }
}

// =============================================================================
// Builders
// =============================================================================

/// A region heap over a leaked host buffer
pub fn leak_region_heap(size: usize) -> &'static RegionHeap {
    let heap: &'static RegionHeap = Box::leak(Box::new(RegionHeap::empty()));
    let memory: &'static mut [u8] = Box::leak(vec![0u8; size].into_boxed_slice());
    unsafe { heap.init(memory.as_mut_ptr(), size) };
    heap
}

pub type TestPdma = Pdma<MockPdma, MockDelay, CountingCache>;

pub fn mock_pdma_with_heaps(config: PdmaConfig, heaps: TableHeaps) -> TestPdma {
    Pdma::new(
        [MockPdma::new(), MockPdma::new(), MockPdma::new()],
        MockDelay::new(),
        CountingCache::default(),
        heaps,
        config,
    )
    .unwrap()
}

pub fn mock_pdma_with(config: PdmaConfig) -> TestPdma {
    mock_pdma_with_heaps(config, TableHeaps::new(&GLOBAL_HEAP, leak_region_heap(4096)))
}

pub fn mock_pdma() -> TestPdma {
    mock_pdma_with(PdmaConfig::new())
}

/// Service every controller until `stop` is set, standing in for the NVIC
pub fn pump_interrupts(pdma: &TestPdma, stop: &AtomicBool) {
    while !stop.load(Ordering::Acquire) {
        for controller in ControllerId::ALL {
            pdma.handle_interrupt(controller);
        }
        std::thread::yield_now();
    }
}
