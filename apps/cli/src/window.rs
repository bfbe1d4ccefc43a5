//! Message-only window and message pump for the platform source manager.

use std::cell::Cell;
use std::ptr;

use anyhow::{Result, bail};
use tracing::{debug, warn};
use twain_core::dsm::DsmTransport;
use twain_core::hook::EventSource;
use twain_core::manager::SessionManager;
use twain_core::protocol::{RawEvent, WindowHandle};
use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DestroyWindow, DispatchMessageW, GetMessageW, HWND_MESSAGE, MSG,
    TranslateMessage,
};

/// Hidden window that receives the source's posted messages.
pub struct MessageWindow {
    hwnd: HWND,
    forwarding: Cell<bool>,
}

impl MessageWindow {
    pub fn create() -> Result<Self> {
        let class: Vec<u16> = "STATIC".encode_utf16().chain(Some(0)).collect();
        let hwnd = unsafe {
            CreateWindowExW(
                0,
                class.as_ptr(),
                ptr::null(),
                0,
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            )
        };
        if hwnd.is_null() {
            bail!("failed to create message window");
        }
        debug!(hwnd = hwnd as usize, "Message window created");
        Ok(Self {
            hwnd,
            forwarding: Cell::new(false),
        })
    }
}

impl EventSource for MessageWindow {
    fn set_forwarding(&self, enabled: bool) {
        self.forwarding.set(enabled);
    }

    fn is_forwarding(&self) -> bool {
        self.forwarding.get()
    }

    fn window_handle(&self) -> WindowHandle {
        WindowHandle(self.hwnd as usize)
    }
}

impl Drop for MessageWindow {
    fn drop(&mut self) {
        if unsafe { DestroyWindow(self.hwnd) } == 0 {
            warn!("Failed to destroy message window");
        }
    }
}

/// Pump the thread's queue until the scan completes, offering every message
/// to the engine first.
pub fn pump_messages<T: DsmTransport>(
    manager: &mut SessionManager<T, MessageWindow>,
) -> Result<()> {
    let mut msg: MSG = unsafe { std::mem::zeroed() };
    while manager.is_scanning() {
        let got = unsafe { GetMessageW(&mut msg, ptr::null_mut(), 0, 0) };
        if got == -1 {
            manager.shutdown();
            bail!("message loop failed");
        }
        if got == 0 {
            debug!("WM_QUIT received");
            manager.shutdown();
            break;
        }
        let event = RawEvent {
            window: WindowHandle(msg.hwnd as usize),
            message: msg.message,
            wparam: msg.wParam,
            lparam: msg.lParam,
            time: msg.time,
            x: msg.pt.x as i16,
            y: msg.pt.y as i16,
        };
        if manager.events().is_forwarding() && manager.on_event(&event) {
            continue;
        }
        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    Ok(())
}
