//! Per-channel callback registry.

use alloc::sync::Arc;

use crate::driver::interrupt::Events;

/// A channel callback
///
/// Event and Disable handlers run in interrupt context and receive the
/// channel's event mask. Trigger handlers run on the thread that armed the
/// transfer and receive an empty mask.
pub type Handler = Arc<dyn Fn(Events) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Events) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Callback slot of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallbackKind {
    /// Completion events that pass the channel's event filter
    Event,
    /// Start a peripheral-driven transfer once the channel is armed
    Trigger,
    /// Any interrupt on the channel, before the Event callback
    Disable,
}

#[derive(Clone, Default)]
pub(crate) struct CallbackSet {
    event: Option<Handler>,
    trigger: Option<Handler>,
    disable: Option<Handler>,
}

impl CallbackSet {
    pub(crate) const fn new() -> Self {
        Self {
            event: None,
            trigger: None,
            disable: None,
        }
    }

    fn slot(&mut self, kind: CallbackKind) -> &mut Option<Handler> {
        match kind {
            CallbackKind::Event => &mut self.event,
            CallbackKind::Trigger => &mut self.trigger,
            CallbackKind::Disable => &mut self.disable,
        }
    }

    pub(crate) fn get(&self, kind: CallbackKind) -> Option<Handler> {
        match kind {
            CallbackKind::Event => self.event.clone(),
            CallbackKind::Trigger => self.trigger.clone(),
            CallbackKind::Disable => self.disable.clone(),
        }
    }

    /// Install `handler`, returning whatever it evicted
    pub(crate) fn replace(&mut self, kind: CallbackKind, handler: Option<Handler>) -> Option<Handler> {
        core::mem::replace(self.slot(kind), handler)
    }
}
