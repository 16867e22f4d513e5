/// Device-change engine — decode, resolve, dispatch.
///
/// Data flows one way: [`payload::decode`] turns a raw notification into a
/// [`DeviceChangeRecord`], [`drive`] expands its unit mask into drive
/// letters, and [`Dispatcher`] delivers one [`DeviceEvent`] per drive to the
/// callbacks held by a [`SubscriptionRegistry`].
pub mod dispatch;
pub mod drive;
pub mod event;
pub mod payload;
pub mod registry;

pub use dispatch::{DispatchSummary, Dispatcher};
pub use drive::{resolve, DriveIdentifier, UnitMask};
pub use event::{DeviceEvent, EventKind};
pub use payload::{decode, ChangeKind, DeviceChangeRecord, DeviceClass, VolumeFlags};
pub use registry::{Callback, SubscriptionHandle, SubscriptionRegistry};
