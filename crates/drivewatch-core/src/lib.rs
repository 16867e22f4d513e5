/// DriveWatch Core — device-change decoding and dispatch.
///
/// This crate turns `WM_DEVICECHANGE` notifications into per-drive
/// lifecycle events with zero UI dependencies. Everything except the Win32
/// glue is platform neutral and can be driven with synthetic payloads.
///
/// # Modules
///
/// - [`device`] — Payload decoder, drive-letter resolver, subscription registry and dispatcher.
/// - [`channel`] — Notification channel adapter and its sources (window subclass on Windows).
/// - [`platform`] — Enumeration of volumes already mounted at startup.
/// - [`error`] — Error types.
pub mod channel;
pub mod device;
pub mod error;
pub mod platform;

pub use channel::{Acknowledgement, ManualSource, NotificationChannel, NotificationSource};
pub use device::{
    DeviceEvent, Dispatcher, DriveIdentifier, EventKind, SubscriptionHandle, SubscriptionRegistry,
    UnitMask,
};
pub use error::{ChannelError, DispatchError, RegistryError};
