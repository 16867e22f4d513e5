/// Hidden top-level window that owns the host's message loop.
///
/// Volume notifications are broadcast to top-level windows only (a
/// message-only window never sees them), so the host creates an ordinary
/// window and simply never shows it. Closing it, or Ctrl+C on the console,
/// ends the message loop.
use anyhow::Context;
use std::ffi::c_void;
use std::sync::atomic::{AtomicIsize, Ordering};
use tracing::debug;

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{BOOL, FALSE, HWND, LPARAM, LRESULT, TRUE, WPARAM};
use windows::Win32::System::Console::SetConsoleCtrlHandler;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, IsWindow,
    PostMessageW, PostQuitMessage, RegisterClassW, TranslateMessage, CW_USEDEFAULT, MSG,
    WINDOW_EX_STYLE, WM_CLOSE, WM_DESTROY, WNDCLASSW, WS_OVERLAPPEDWINDOW,
};

const CLASS_NAME: PCWSTR = w!("DriveWatchHostWindow");

/// Window the console control handler posts `WM_CLOSE` to. 0 when none.
static CLOSE_TARGET: AtomicIsize = AtomicIsize::new(0);

pub struct HostWindow {
    hwnd: HWND,
}

impl HostWindow {
    /// Register the window class and create the (hidden) window on the
    /// calling thread, which must then run [`run_message_loop`](Self::run_message_loop).
    pub fn create() -> anyhow::Result<Self> {
        unsafe {
            let instance = GetModuleHandleW(None).context("GetModuleHandleW")?;

            let class = WNDCLASSW {
                lpfnWndProc: Some(host_wnd_proc),
                hInstance: instance.into(),
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };
            if RegisterClassW(&class) == 0 {
                return Err(windows::core::Error::from_win32()).context("RegisterClassW");
            }

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                w!("Detector of removable drives"),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                None,
                None,
                instance,
                None,
            )
            .context("CreateWindowExW")?;

            debug!("HostWindow: created {:?}", hwnd);
            Ok(Self { hwnd })
        }
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    /// Route Ctrl+C / Ctrl+Break / console close to `WM_CLOSE` on this window.
    pub fn close_on_console_ctrl(&self) -> anyhow::Result<()> {
        CLOSE_TARGET.store(self.hwnd.0 as isize, Ordering::SeqCst);
        unsafe { SetConsoleCtrlHandler(Some(console_ctrl_handler), true) }
            .context("SetConsoleCtrlHandler")
    }

    /// Pump messages until the window is destroyed. `after_each` runs after
    /// every retrieved message.
    pub fn run_message_loop(&self, mut after_each: impl FnMut()) -> anyhow::Result<()> {
        let mut msg = MSG::default();
        loop {
            let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match ret.0 {
                -1 => {
                    return Err(windows::core::Error::from_win32()).context("GetMessageW");
                }
                0 => break,
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
            after_each();
        }
        debug!("HostWindow: message loop ended");
        Ok(())
    }
}

impl Drop for HostWindow {
    fn drop(&mut self) {
        CLOSE_TARGET.store(0, Ordering::SeqCst);
        unsafe {
            if IsWindow(self.hwnd).as_bool() {
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

extern "system" fn host_wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        match msg {
            WM_CLOSE => {
                let _ = DestroyWindow(hwnd);
                LRESULT(0)
            }
            WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

/// Runs on a thread the console creates; posting is safe across threads.
unsafe extern "system" fn console_ctrl_handler(_ctrl_type: u32) -> BOOL {
    let raw = CLOSE_TARGET.load(Ordering::SeqCst);
    if raw == 0 {
        return FALSE;
    }
    let hwnd = HWND(raw as *mut c_void);
    match PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)) {
        Ok(()) => TRUE,
        Err(_) => FALSE,
    }
}
