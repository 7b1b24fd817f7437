//! Counting semaphores for the actor pool.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

/// A counting semaphore
///
/// `give` may be called from interrupt context; `take` only from threads.
pub trait Semaphore: Send + Sync + 'static {
    /// A semaphore holding `initial` permits
    fn new(initial: u32) -> Self
    where
        Self: Sized;

    /// Block until a permit is available, then consume it
    fn take(&self);

    /// Consume a permit if one is available
    fn try_take(&self) -> bool;

    /// Return a permit
    fn give(&self);
}

/// What a [`SpinSemaphore`] does between failed attempts
pub trait Relax: Send + Sync + 'static {
    /// Called once per failed attempt
    fn relax();
}

/// Spin-loop hint only
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinLoop;

impl Relax for SpinLoop {
    #[inline(always)]
    fn relax() {
        core::hint::spin_loop();
    }
}

/// Busy-waiting semaphore on an atomic counter
///
/// With the default [`SpinLoop`] a waiter never gives up the CPU. Under a
/// priority-preemptive scheduler a high-priority waiter then starves the
/// lower-priority task that would give the permit back; supply a [`Relax`]
/// that yields to the scheduler, or use the RTOS semaphore instead.
///
/// ```ignore
/// struct Yield;
/// impl Relax for Yield {
///     fn relax() { rtos::thread::yield_now() }
/// }
/// type Pool<'a> = ActorPool<'a, MmioPdma, Delay, CortexMCache, SpinSemaphore<Yield>>;
/// ```
pub struct SpinSemaphore<R = SpinLoop> {
    permits: AtomicU32,
    _relax: PhantomData<fn() -> R>,
}

impl<R> SpinSemaphore<R> {
    /// Permits currently available
    pub fn available(&self) -> u32 {
        self.permits.load(Ordering::Acquire)
    }
}

impl<R> core::fmt::Debug for SpinSemaphore<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinSemaphore")
            .field("permits", &self.available())
            .finish()
    }
}

impl<R: Relax> Semaphore for SpinSemaphore<R> {
    fn new(initial: u32) -> Self {
        Self {
            permits: AtomicU32::new(initial),
            _relax: PhantomData,
        }
    }

    fn take(&self) {
        while !self.try_take() {
            R::relax();
        }
    }

    fn try_take(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn give(&self) {
        self.permits.fetch_add(1, Ordering::Release);
    }
}
