//! Synchronous memory functions on a pool of dedicated channels.
//!
//! Each actor owns one memory-to-memory channel for the life of the pool.
//! A copy employs an actor, arms its channel and blocks on the actor's
//! semaphore until the completion interrupt gives it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;

use crate::driver::callback::{CallbackKind, handler};
use crate::driver::channel::{ChannelId, Peripheral};
use crate::driver::config::{MemControl, Width};
use crate::driver::error::{AllocError, ConfigError, IoError, Result};
use crate::driver::interrupt::Events;
use crate::driver::pdma::Pdma;
use crate::hal::cache::CacheMaintenance;
use crate::hal::registers::PdmaRegisters;
use crate::internal::bitset::ChannelMask;
use crate::sync::primitives::CriticalSectionCell;
use crate::sync::semaphore::{Semaphore, SpinSemaphore};

struct Actor<S> {
    channel: ChannelId,
    done: Arc<S>,
    events: Arc<AtomicU32>,
}

/// Pool of memory-to-memory actors
///
/// ```ignore
/// let pool: ActorPool<'_, _, _, _> = ActorPool::new(&pdma)?;
/// let copied = pool.memcpy(&mut frame, &staging)?;
/// ```
pub struct ActorPool<'a, H, D, C, S = SpinSemaphore>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
    S: Semaphore,
{
    pdma: &'a Pdma<H, D, C>,
    actors: Vec<Actor<S>>,
    permits: S,
    in_use: CriticalSectionCell<ChannelMask>,
}

/// An employed actor; returned to the pool on drop
pub struct Employment<'p, 'a, H, D, C, S>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
    S: Semaphore,
{
    pool: &'p ActorPool<'a, H, D, C, S>,
    index: u8,
}

impl<H, D, C, S> Employment<'_, '_, H, D, C, S>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
    S: Semaphore,
{
    /// Slot of the actor in the pool
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Channel owned by the actor
    pub fn channel(&self) -> ChannelId {
        self.pool.actors[self.index as usize].channel
    }
}

impl<H, D, C, S> Drop for Employment<'_, '_, H, D, C, S>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
    S: Semaphore,
{
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl<H, D, C, S> Drop for ActorPool<'_, H, D, C, S>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
    S: Semaphore,
{
    fn drop(&mut self) {
        for actor in &self.actors {
            if let Err(err) = self.pdma.free(actor.channel) {
                warn!("{}: release on pool drop failed: {}", actor.channel, err);
            }
        }
    }
}

impl<'a, H, D, C, S> ActorPool<'a, H, D, C, S>
where
    H: PdmaRegisters,
    D: DelayNs + Clone,
    C: CacheMaintenance,
    S: Semaphore,
{
    /// Reserve up to `actor_pool_size` memory channels
    ///
    /// Stops early when channels run out; the pool is as large as the
    /// number of channels it got, and fails only if it got none. Each
    /// channel gets its completion handler here, once, and keeps it until
    /// the pool is dropped, which frees every channel.
    pub fn new(pdma: &'a Pdma<H, D, C>) -> Result<Self> {
        let wanted = pdma.config().actor_pool_size;
        let mut pool = Self {
            pdma,
            actors: Vec::with_capacity(wanted),
            permits: S::new(0),
            in_use: CriticalSectionCell::new(ChannelMask::empty()),
        };

        for _ in 0..wanted {
            let channel = match pdma.allocate(Peripheral::Memory) {
                Ok(channel) => channel,
                Err(err) => {
                    warn!("actor pool stopped at {} of {}: {}", pool.actors.len(), wanted, err);
                    break;
                }
            };
            pool.actors.push(Actor {
                channel,
                done: Arc::new(S::new(0)),
                events: Arc::new(AtomicU32::new(0)),
            });
            Self::bind(pdma, &pool.actors[pool.actors.len() - 1])?;
        }

        if pool.actors.is_empty() {
            return Err(AllocError::ActorPool.into());
        }
        pool.permits = S::new(pool.actors.len() as u32);
        info!("actor pool ready with {} actors", pool.actors.len());
        Ok(pool)
    }

    fn bind(pdma: &Pdma<H, D, C>, actor: &Actor<S>) -> Result<()> {
        pdma.set_event_filter(actor.channel, Events::ABORT | Events::TRANSFER_DONE)?;

        let done = Arc::clone(&actor.done);
        let events = Arc::clone(&actor.events);
        pdma.register_callback(
            actor.channel,
            CallbackKind::Event,
            handler(move |fired| {
                events.store(fired.bits(), Ordering::Release);
                done.give();
            }),
        )
    }

    /// Number of actors
    pub fn size(&self) -> usize {
        self.actors.len()
    }

    /// Actors currently employed
    pub fn employed(&self) -> usize {
        self.in_use.with(|mask| mask.count() as usize)
    }

    fn release(&self, index: u8) {
        self.in_use.with(|mask| mask.clear(index));
        self.permits.give();
    }

    /// Claim the lowest free actor, blocking while all are employed
    pub fn employ(&self) -> Employment<'_, 'a, H, D, C, S> {
        let limit = self.actors.len() as u8;
        loop {
            self.permits.take();
            let claimed = self.in_use.with(|mask| {
                let index = mask.first_clear(limit)?;
                mask.set(index);
                Some(index)
            });
            match claimed {
                Some(index) => return Employment { pool: self, index },
                None => self.permits.give(),
            }
        }
    }

    /// Copy `count` elements and wait for completion
    ///
    /// Returns the number of elements moved: `count` on completion, fewer
    /// if the transfer aborted (the channel is then terminated).
    ///
    /// # Safety
    ///
    /// Both ranges must be valid for DMA access for the duration of the
    /// call and not be accessed by anything else meanwhile.
    pub unsafe fn sync_copy(
        &self,
        dst: u32,
        src: u32,
        width: Width,
        count: u32,
        mode: MemControl,
    ) -> Result<u32> {
        let employment = self.employ();
        let actor = &self.actors[employment.index()];
        let ch = actor.channel;

        while actor.done.try_take() {}

        self.pdma.set_memory_control(ch, mode)?;
        unsafe { self.pdma.transfer(ch, width, src, dst, count, 0)? };
        actor.done.take();

        let fired = Events::from_bits_truncate(actor.events.load(Ordering::Acquire));
        if fired.contains(Events::TRANSFER_DONE) {
            return Ok(count);
        }

        let moved = count.saturating_sub(self.pdma.remaining_count(ch)?);
        if fired.contains(Events::ABORT) {
            warn!("{}: copy aborted after {} of {} elements", ch, moved, count);
            if let Err(err) = self.pdma.terminate(ch) {
                warn!("{}: terminate after abort failed: {}", ch, err);
            }
        }
        Ok(moved)
    }

    /// Push `count` elements from incrementing `src` into fixed `dst`
    ///
    /// # Safety
    ///
    /// See [`ActorPool::sync_copy`].
    pub unsafe fn mempush(&self, dst: u32, src: u32, width: Width, count: u32) -> Result<u32> {
        unsafe { self.sync_copy(dst, src, width, count, MemControl::SrcIncDstFix) }
    }

    /// Copy `src` into `dst` with the widest transfers their alignment allows
    ///
    /// Returns the number of bytes copied.
    pub fn memcpy(&self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
        if dst.len() != src.len() {
            return Err(ConfigError::InvalidConfig.into());
        }

        let total = src.len();
        let src_base = src.as_ptr() as usize;
        let dst_base = dst.as_mut_ptr() as usize;
        let mut copied = 0usize;

        while copied < total {
            let s = src_base + copied;
            let d = dst_base + copied;
            let remaining = total - copied;

            let width = [Width::Bits32, Width::Bits16, Width::Bits8]
                .into_iter()
                .find(|w| {
                    let bytes = w.bytes() as usize;
                    s % bytes == 0 && d % bytes == 0 && remaining >= bytes
                })
                .unwrap_or(Width::Bits8);
            let bytes = width.bytes() as usize;
            let count = (remaining / bytes).min(u32::MAX as usize) as u32;

            // SAFETY: both ranges lie inside the borrowed slices
            let moved = unsafe {
                self.sync_copy(d as u32, s as u32, width, count, MemControl::SrcIncDstInc)?
            };
            if moved != count {
                return Err(IoError::PartialTransfer.into());
            }
            copied += count as usize * bytes;
        }

        Ok(total)
    }
}
