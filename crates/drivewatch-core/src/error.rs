/// Error types for the device-change engine.
use crate::device::{DriveIdentifier, EventKind, SubscriptionHandle};

/// Misuse of the subscription registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown subscription handle {0:?}")]
    UnknownHandle(SubscriptionHandle),
}

/// A subscriber callback failed during fan-out.
///
/// Subscribers scheduled before the failing one have already run; the
/// remaining ones for the pass are skipped.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{kind} subscriber failed for {drive}: {source:#}")]
    Subscriber {
        kind: EventKind,
        drive: DriveIdentifier,
        #[source]
        source: anyhow::Error,
    },
}

/// Lifecycle errors of the notification channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("notification channel is already started")]
    AlreadyStarted,
    #[error("failed to install device-change handler: {0}")]
    Install(String),
}
