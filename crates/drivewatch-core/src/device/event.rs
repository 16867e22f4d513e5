/// Events delivered to subscribers — one per affected drive.
use super::drive::DriveIdentifier;
use std::fmt;

/// The three lifecycle events a subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Media was attached and a volume mounted.
    Arrived,
    /// A volume is gone.
    Removed,
    /// The OS asks whether a volume may be removed. Always permitted.
    QueryRemove,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::Arrived, Self::Removed, Self::QueryRemove];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Arrived => "Arrived",
            Self::Removed => "Removed",
            Self::QueryRemove => "QueryRemove",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A lifecycle event for a single drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceEvent {
    pub kind: EventKind,
    pub drive: DriveIdentifier,
}

impl DeviceEvent {
    pub fn new(kind: EventKind, drive: DriveIdentifier) -> Self {
        Self { kind, drive }
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.drive)
    }
}
