/// Notification channel — receives `WM_DEVICECHANGE` notifications and feeds
/// them through decode and dispatch.
///
/// The channel never owns a thread or a message loop. A
/// [`NotificationSource`] installs a [`DeviceChangeSink`] wherever the host
/// routes native notifications (on Windows: a subclass of the host's window,
/// see [`win32`]); every notification is then handled synchronously on the
/// thread that pumps the host's messages.
///
/// # Lifecycle
///
/// ```ignore
/// let mut channel = NotificationChannel::new(WindowSubclass::new(hwnd), dispatcher);
/// channel.start()?;   // a second start() is ChannelError::AlreadyStarted
/// // ... host runs its message loop ...
/// channel.stop();     // also runs on drop
/// ```
#[cfg(windows)]
pub mod win32;

use crate::device::payload::{self, DBT_DEVICEARRIVAL, DBT_DEVICEQUERYREMOVE, DBT_DEVICEREMOVECOMPLETE};
use crate::device::{DispatchSummary, Dispatcher};
use crate::error::{ChannelError, DispatchError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `TRUE` as a window-procedure result.
const LRESULT_TRUE: isize = 1;

/// Whether `lParam` of a `WM_DEVICECHANGE` with this `wParam` points at a
/// `DEV_BROADCAST_HDR`.
///
/// Only the arrival/removal family carries one. Other codes pass a plain
/// integer (`DBT_MONITORCHANGE` packs a resolution, `DBT_LOW_DISK_SPACE` a
/// drive number) that must never be dereferenced.
pub fn carries_broadcast(event_code: u32) -> bool {
    (DBT_DEVICEARRIVAL..=DBT_DEVICEREMOVECOMPLETE).contains(&event_code)
}

/// What the channel tells the OS about a notification it processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// The notification was processed.
    Handled,
    /// Answer to a query-remove: removal may proceed. There is no veto.
    PermitRemoval,
}

impl Acknowledgement {
    /// The value a window procedure returns for this acknowledgement.
    ///
    /// Both variants are `TRUE`; denying removal would require
    /// `BROADCAST_QUERY_DENY`, which is never produced.
    pub fn result_code(self) -> isize {
        match self {
            Self::Handled | Self::PermitRemoval => LRESULT_TRUE,
        }
    }
}

/// The decode entry point a [`NotificationSource`] delivers into.
#[derive(Debug)]
pub struct DeviceChangeSink {
    dispatcher: Dispatcher,
    /// Subscriber failure raised where it could not be returned (native
    /// window procedure). Picked up by the host via [`take_error`](Self::take_error).
    parked: Mutex<Option<DispatchError>>,
}

impl DeviceChangeSink {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            parked: Mutex::new(None),
        }
    }

    /// Handle one notification: `event_code` is the `wParam`, `payload` the
    /// broadcast block (empty if there is none).
    ///
    /// Notifications that decode to nothing are acknowledged without side
    /// effects. A failing subscriber is returned as-is.
    pub fn on_device_change(
        &self,
        event_code: u32,
        payload: &[u8],
    ) -> Result<Acknowledgement, DispatchError> {
        if !carries_broadcast(event_code) {
            return Ok(Self::acknowledgement_for(event_code));
        }
        if let Some(record) = payload::decode(event_code, payload) {
            let DispatchSummary { events, deliveries } = self.dispatcher.dispatch(&record)?;
            debug!(
                "Channel: event {:#06x} -> {} events, {} deliveries",
                event_code, events, deliveries
            );
        }
        Ok(Self::acknowledgement_for(event_code))
    }

    /// Like [`on_device_change`](Self::on_device_change), for callers that
    /// cannot propagate an error (a native window procedure). A subscriber
    /// failure is logged and parked; the notification is still acknowledged.
    pub fn on_device_change_parked(&self, event_code: u32, payload: &[u8]) -> Acknowledgement {
        match self.on_device_change(event_code, payload) {
            Ok(ack) => ack,
            Err(e) => {
                error!("Channel: {}", e);
                *self.parked.lock() = Some(e);
                Self::acknowledgement_for(event_code)
            }
        }
    }

    /// Take the most recent parked subscriber failure, if any.
    pub fn take_error(&self) -> Option<DispatchError> {
        self.parked.lock().take()
    }

    fn acknowledgement_for(event_code: u32) -> Acknowledgement {
        if event_code == DBT_DEVICEQUERYREMOVE {
            Acknowledgement::PermitRemoval
        } else {
            Acknowledgement::Handled
        }
    }
}

/// Something that can route native notifications into a sink.
pub trait NotificationSource {
    /// Start delivering into `sink`. Called at most once between uninstalls.
    fn install(&mut self, sink: Arc<DeviceChangeSink>) -> Result<(), ChannelError>;

    /// Stop delivering and release the sink. Must be safe to call when
    /// nothing is installed.
    fn uninstall(&mut self);
}

/// Lifecycle state of a [`NotificationChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Listening,
    Stopped,
}

/// Owns the subscription to native notifications through a source.
pub struct NotificationChannel<S: NotificationSource> {
    source: S,
    sink: Arc<DeviceChangeSink>,
    state: ChannelState,
}

impl<S: NotificationSource> NotificationChannel<S> {
    pub fn new(source: S, dispatcher: Dispatcher) -> Self {
        Self {
            source,
            sink: Arc::new(DeviceChangeSink::new(dispatcher)),
            state: ChannelState::Idle,
        }
    }

    /// Install the sink. Calling this while already listening is an error
    /// and leaves the existing registration alone.
    pub fn start(&mut self) -> Result<(), ChannelError> {
        if self.state == ChannelState::Listening {
            warn!("Channel: start() while already listening");
            return Err(ChannelError::AlreadyStarted);
        }
        self.source.install(Arc::clone(&self.sink))?;
        self.state = ChannelState::Listening;
        info!("Channel: listening for device changes");
        Ok(())
    }

    /// Release the registration. Only affects notifications that have not
    /// arrived yet. No-op unless listening.
    pub fn stop(&mut self) {
        if self.state != ChannelState::Listening {
            return;
        }
        self.source.uninstall();
        self.state = ChannelState::Stopped;
        info!("Channel: stopped");
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == ChannelState::Listening
    }

    pub fn sink(&self) -> &Arc<DeviceChangeSink> {
        &self.sink
    }

    /// Parked subscriber failure from the native path, if any.
    pub fn take_error(&self) -> Option<DispatchError> {
        self.sink.take_error()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: NotificationSource> Drop for NotificationChannel<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A source driven by the caller instead of the OS.
///
/// Clones share the installed sink, so one clone can be handed to the
/// channel while another replays captured or synthetic notifications.
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    installed: Arc<Mutex<Option<Arc<DeviceChangeSink>>>>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.lock().is_some()
    }

    /// Deliver a notification. `None` when no sink is installed.
    pub fn deliver(
        &self,
        event_code: u32,
        payload: &[u8],
    ) -> Option<Result<Acknowledgement, DispatchError>> {
        // Clone out so callbacks may stop the channel mid-delivery.
        let sink = self.installed.lock().clone()?;
        Some(sink.on_device_change(event_code, payload))
    }
}

impl NotificationSource for ManualSource {
    fn install(&mut self, sink: Arc<DeviceChangeSink>) -> Result<(), ChannelError> {
        let mut installed = self.installed.lock();
        if installed.is_some() {
            return Err(ChannelError::AlreadyStarted);
        }
        *installed = Some(sink);
        Ok(())
    }

    fn uninstall(&mut self) {
        self.installed.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::payload::{encode_volume, DBT_DEVICEARRIVAL};
    use crate::device::{EventKind, SubscriptionRegistry, UnitMask, VolumeFlags};

    fn channel() -> (NotificationChannel<ManualSource>, ManualSource, Arc<SubscriptionRegistry>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let source = ManualSource::new();
        let channel = NotificationChannel::new(source.clone(), Dispatcher::new(Arc::clone(&registry)));
        (channel, source, registry)
    }

    #[test]
    fn test_carries_broadcast() {
        for code in 0x8000..=0x8004 {
            assert!(carries_broadcast(code), "{code:#06x}");
        }
        // DBT_DEVNODES_CHANGED, DBT_MONITORCHANGE, DBT_LOW_DISK_SPACE,
        // DBT_CUSTOMEVENT, DBT_USERDEFINED
        for code in [0x0007, 0x001B, 0x0048, 0x8006, 0xFFFF] {
            assert!(!carries_broadcast(code), "{code:#06x}");
        }
    }

    #[test]
    fn test_integer_lparam_codes_are_acknowledged_untouched() {
        let (mut channel, source, registry) = channel();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        registry.subscribe(EventKind::Arrived, move |_: &crate::device::DeviceEvent| {
            *counter.lock() += 1;
            Ok(())
        });
        channel.start().unwrap();

        // A volume-shaped block under a non-broadcast code is ignored.
        let payload = encode_volume(UnitMask::from_letters(['E']), VolumeFlags::default());
        for code in [0x001B, 0x0048] {
            let ack = source.deliver(code, &payload).unwrap().unwrap();
            assert_eq!(ack, Acknowledgement::Handled);
        }
        assert_eq!(*hits.lock(), 0);

        source.deliver(DBT_DEVICEARRIVAL, &payload).unwrap().unwrap();
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (mut channel, source, _) = channel();
        channel.start().unwrap();
        assert!(matches!(channel.start(), Err(ChannelError::AlreadyStarted)));
        assert!(channel.is_listening());
        assert!(source.is_installed());
    }

    #[test]
    fn test_stop_uninstalls_and_restart_works() {
        let (mut channel, source, _) = channel();
        channel.stop();
        assert_eq!(channel.state(), ChannelState::Idle);

        channel.start().unwrap();
        channel.stop();
        channel.stop();
        assert_eq!(channel.state(), ChannelState::Stopped);
        assert!(!source.is_installed());
        assert!(source.deliver(DBT_DEVICEARRIVAL, &[]).is_none());

        channel.start().unwrap();
        assert!(source.is_installed());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let (mut channel, source, _) = channel();
        channel.start().unwrap();
        drop(channel);
        assert!(!source.is_installed());
    }

    #[test]
    fn test_acknowledgements() {
        let (mut channel, source, _) = channel();
        channel.start().unwrap();
        let payload = encode_volume(UnitMask::new(1), VolumeFlags::default());

        let ack = source.deliver(DBT_DEVICEQUERYREMOVE, &payload).unwrap().unwrap();
        assert_eq!(ack, Acknowledgement::PermitRemoval);
        assert_eq!(ack.result_code(), 1);

        let ack = source.deliver(DBT_DEVICEARRIVAL, &payload).unwrap().unwrap();
        assert_eq!(ack, Acknowledgement::Handled);

        // Nothing decodable still gets an answer.
        let ack = source.deliver(payload::DBT_DEVNODES_CHANGED, &[]).unwrap().unwrap();
        assert_eq!(ack, Acknowledgement::Handled);
    }

    #[test]
    fn test_parked_error_on_native_path() {
        let (channel, _, registry) = channel();
        registry.subscribe(EventKind::QueryRemove, |_| Err(anyhow::anyhow!("refused")));
        let payload = encode_volume(UnitMask::new(1 << 4), VolumeFlags::default());

        let ack = channel.sink().on_device_change_parked(DBT_DEVICEQUERYREMOVE, &payload);
        assert_eq!(ack, Acknowledgement::PermitRemoval);

        let err = channel.take_error().expect("failure parked");
        assert!(err.to_string().contains("refused"));
        assert!(channel.take_error().is_none());
    }
}
