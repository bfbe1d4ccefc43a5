//! Host event-loop collaborator.
//!
//! While forwarding is armed the host must offer every platform event to
//! [`crate::manager::SessionManager::on_event`] before its own processing.

use std::cell::Cell;

use crate::protocol::WindowHandle;

pub trait EventSource {
    /// Arm or disarm event forwarding.
    fn set_forwarding(&self, enabled: bool);

    fn is_forwarding(&self) -> bool;

    /// Parent window for the source's UI and for manager open/close.
    fn window_handle(&self) -> WindowHandle;
}

/// Event source for hosts without a window (CLI, tests).
///
/// The host drives [`crate::manager::SessionManager::on_event`] itself,
/// typically with [`crate::protocol::RawEvent::idle`].
#[derive(Debug, Default)]
pub struct HeadlessEventSource {
    window: WindowHandle,
    forwarding: Cell<bool>,
}

impl HeadlessEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: WindowHandle) -> Self {
        Self {
            window,
            forwarding: Cell::new(false),
        }
    }
}

impl EventSource for HeadlessEventSource {
    fn set_forwarding(&self, enabled: bool) {
        if self.forwarding.replace(enabled) != enabled {
            tracing::debug!(enabled, "Event forwarding changed");
        }
    }

    fn is_forwarding(&self) -> bool {
        self.forwarding.get()
    }

    fn window_handle(&self) -> WindowHandle {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarding_toggle() {
        let hook = HeadlessEventSource::with_window(WindowHandle(0x1234));
        assert!(!hook.is_forwarding());
        hook.set_forwarding(true);
        assert!(hook.is_forwarding());
        hook.set_forwarding(false);
        assert!(!hook.is_forwarding());
        assert_eq!(hook.window_handle(), WindowHandle(0x1234));
    }
}
