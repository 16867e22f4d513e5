/// DriveWatch Host — runs the device-change engine inside a Windows
/// message loop and keeps an exportable history of removable drives.
///
/// Business logic lives in `drivewatch-core`; this crate is the glue:
///
/// - [`config`] — Environment-variable configuration.
/// - [`history`] — Device history and CSV export.
/// - [`state`] — Subscriber wiring between the engine and the history.
/// - `window` — Hidden top-level window and message loop (Windows only).
pub mod config;
pub mod history;
pub mod state;
#[cfg(windows)]
pub mod window;

pub use config::{ConfigError, HostConfig};
pub use state::HostState;

/// Run the detector until the user stops it, then export the history.
pub fn run(config: HostConfig) -> anyhow::Result<()> {
    let mut state = HostState::build(config);
    let watched = watch(&mut state);
    state.shutdown(watched)
}

#[cfg(windows)]
fn watch(state: &mut HostState) -> anyhow::Result<()> {
    use drivewatch_core::channel::win32::WindowSubclass;
    use drivewatch_core::platform::enumerate_drives;
    use drivewatch_core::NotificationChannel;
    use tracing::info;

    state.seed(&enumerate_drives());

    let window = window::HostWindow::create()?;
    let mut channel = NotificationChannel::new(WindowSubclass::new(window.hwnd()), state.dispatcher());
    channel.start()?;
    window.close_on_console_ctrl()?;

    info!("Watching for removable drives; press Ctrl+C to stop");
    window.run_message_loop(|| {
        if let Some(e) = channel.take_error() {
            tracing::warn!("Subscriber failure during device change: {}", e);
        }
    })?;

    channel.stop();
    Ok(())
}

#[cfg(not(windows))]
fn watch(_state: &mut HostState) -> anyhow::Result<()> {
    anyhow::bail!("DriveWatch listens for WM_DEVICECHANGE and only runs on Windows")
}
