/// Win32 notification source — subclasses the host's top-level window.
///
/// `WM_DEVICECHANGE` volume broadcasts are only sent to top-level windows, so
/// the host supplies one and keeps pumping its messages. Installing attaches
/// [`device_change_proc`] with `SetWindowSubclass`; everything except
/// `WM_DEVICECHANGE` falls through to the window's own procedure.
///
/// The subclass is removed on `stop()`, on drop, and by the procedure itself
/// when the window receives `WM_NCDESTROY`, so a window torn down without an
/// orderly shutdown never calls into a released sink.
use super::{carries_broadcast, DeviceChangeSink, NotificationSource};
use crate::device::payload::{declared_size, HEADER_LEN};
use crate::error::ChannelError;
use std::sync::Arc;
use tracing::{debug, warn};

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::Shell::{DefSubclassProc, RemoveWindowSubclass, SetWindowSubclass};
use windows::Win32::UI::WindowsAndMessaging::{WM_DEVICECHANGE, WM_NCDESTROY};

/// Subclass id ("DW"). Only needs to be unique per window and procedure.
const SUBCLASS_ID: usize = 0x4457;

/// Upper bound on bytes read from a broadcast block. Volume blocks are 20
/// bytes; device-interface blocks carry a path and stay well below this.
const MAX_PAYLOAD_LEN: usize = 4096;

/// A [`NotificationSource`] backed by a subclass of `hwnd`.
pub struct WindowSubclass {
    hwnd: HWND,
    /// Keeps the sink alive while the procedure holds a raw pointer to it.
    sink: Option<Arc<DeviceChangeSink>>,
}

impl WindowSubclass {
    /// `hwnd` must be a top-level window owned by the calling thread.
    pub fn new(hwnd: HWND) -> Self {
        Self { hwnd, sink: None }
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }
}

impl NotificationSource for WindowSubclass {
    fn install(&mut self, sink: Arc<DeviceChangeSink>) -> Result<(), ChannelError> {
        if self.sink.is_some() {
            return Err(ChannelError::AlreadyStarted);
        }

        let refdata = Arc::as_ptr(&sink) as usize;
        // SAFETY: `refdata` points into `sink`, which this struct keeps alive
        // until the subclass has been removed in `uninstall`.
        let ok = unsafe {
            SetWindowSubclass(self.hwnd, Some(device_change_proc), SUBCLASS_ID, refdata)
        };
        if !ok.as_bool() {
            let e = windows::core::Error::from_win32();
            warn!("WindowSubclass: SetWindowSubclass failed: {}", e);
            return Err(ChannelError::Install(e.to_string()));
        }

        debug!("WindowSubclass: installed on {:?}", self.hwnd);
        self.sink = Some(sink);
        Ok(())
    }

    fn uninstall(&mut self) {
        let Some(sink) = self.sink.take() else {
            return;
        };
        // Fails harmlessly if WM_NCDESTROY already removed it.
        unsafe {
            let _ = RemoveWindowSubclass(self.hwnd, Some(device_change_proc), SUBCLASS_ID);
        }
        drop(sink);
        debug!("WindowSubclass: removed from {:?}", self.hwnd);
    }
}

impl Drop for WindowSubclass {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Subclass procedure with the native `SUBCLASSPROC` signature.
///
/// # Safety
///
/// Only to be installed by [`WindowSubclass`], which passes a pointer to a
/// live [`DeviceChangeSink`] as `refdata`.
pub unsafe extern "system" fn device_change_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    id: usize,
    refdata: usize,
) -> LRESULT {
    match msg {
        WM_DEVICECHANGE => {
            let sink = &*(refdata as *const DeviceChangeSink);
            let event_code = wparam.0 as u32;
            // lParam is only a pointer for the arrival/removal family.
            let payload = if carries_broadcast(event_code) {
                copy_payload(lparam)
            } else {
                Vec::new()
            };
            let ack = sink.on_device_change_parked(event_code, &payload);
            LRESULT(ack.result_code())
        }
        WM_NCDESTROY => {
            let _ = RemoveWindowSubclass(hwnd, Some(device_change_proc), id);
            DefSubclassProc(hwnd, msg, wparam, lparam)
        }
        _ => DefSubclassProc(hwnd, msg, wparam, lparam),
    }
}

/// Copy the broadcast block `lparam` points at into an owned buffer.
///
/// The block belongs to the OS and is only valid for this message. A null
/// `lparam` (e.g. `DBT_DEVNODES_CHANGED`) yields an empty buffer.
unsafe fn copy_payload(lparam: LPARAM) -> Vec<u8> {
    if lparam.0 == 0 {
        return Vec::new();
    }
    let base = lparam.0 as *const u8;

    // The header is not guaranteed to be aligned for a u32 read.
    let mut header = [0u8; HEADER_LEN];
    std::ptr::copy_nonoverlapping(base, header.as_mut_ptr(), HEADER_LEN);

    let len = declared_size(&header)
        .unwrap_or(HEADER_LEN)
        .clamp(HEADER_LEN, MAX_PAYLOAD_LEN);
    std::slice::from_raw_parts(base, len).to_vec()
}
