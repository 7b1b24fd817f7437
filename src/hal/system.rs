//! System-controller hooks used when a controller is first brought up.
//!
//! Module reset and NVIC enable live outside the PDMA register block, in the
//! SoC's system controller and the core's interrupt controller. The board
//! crate supplies them; the engine calls them once per controller, on the
//! first allocation, with the values from [`crate::ControllerInfo`].

/// Module reset and interrupt enable for a DMA controller
pub trait SystemControl: Sync {
    /// Pulse the module reset line `reset_id`
    fn reset_module(&self, reset_id: u32);

    /// Unmask interrupt line `irq` in the NVIC
    fn enable_irq(&self, irq: u16);
}

/// Hooks for platforms that reset and unmask the controllers themselves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoSystemControl;

/// Shared instance used until [`crate::Pdma::with_system_control`] replaces it
pub static NO_SYSTEM_CONTROL: NoSystemControl = NoSystemControl;

impl SystemControl for NoSystemControl {
    #[inline(always)]
    fn reset_module(&self, _reset_id: u32) {}

    #[inline(always)]
    fn enable_irq(&self, _irq: u16) {}
}
