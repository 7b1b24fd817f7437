//! Deadline-bounded polling.

use embedded_hal::delay::DelayNs;

use crate::driver::error::{IoError, IoResult};

/// Poll `done` until it returns `true` or `timeout_us` elapses
///
/// `done` is always checked once before the first delay and once more
/// after the deadline is reached.
pub fn poll_until<D, F>(delay: &mut D, timeout_us: u32, interval_us: u32, mut done: F) -> IoResult<()>
where
    D: DelayNs,
    F: FnMut() -> bool,
{
    let interval_us = interval_us.max(1);
    let mut waited_us = 0u32;

    loop {
        if done() {
            return Ok(());
        }
        if waited_us >= timeout_us {
            return Err(IoError::Timeout);
        }
        delay.delay_us(interval_us);
        waited_us = waited_us.saturating_add(interval_us);
    }
}
