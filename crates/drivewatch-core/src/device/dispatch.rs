/// Event dispatch — fans a decoded record out to subscribers.
///
/// One record with N drives in its mask becomes N [`DeviceEvent`]s, delivered
/// in ascending drive-letter order. Each event goes to every subscriber of
/// its kind in registration order, synchronously, on the calling thread.
/// The subscriber list is captured once per record.
/// A slow subscriber stalls the whole notification path; there is no queue.
use super::event::DeviceEvent;
use super::payload::{DeviceChangeRecord, DeviceClass};
use super::registry::SubscriptionRegistry;
use crate::error::DispatchError;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a completed fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Events built from the record (one per drive).
    pub events: usize,
    /// Callback invocations across all events.
    pub deliveries: usize,
}

/// Maps records to events and delivers them through a shared registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Expand `record` into events and deliver them.
    ///
    /// Records for non-volume classes, `Other` change kinds or an empty mask
    /// deliver nothing and are not an error. The first failing subscriber
    /// stops the pass: everything scheduled before it has run, nothing after
    /// it will.
    pub fn dispatch(&self, record: &DeviceChangeRecord) -> Result<DispatchSummary, DispatchError> {
        let mut summary = DispatchSummary::default();

        if record.device_class() != DeviceClass::Volume {
            return Ok(summary);
        }
        let Some(kind) = record.change_kind().event_kind() else {
            return Ok(summary);
        };

        // One snapshot for the whole record: changes made by callbacks take
        // effect from the next notification onwards.
        let subscribers = self.registry.snapshot(kind);

        for drive in record.unit_mask().drives() {
            let event = DeviceEvent::new(kind, drive);
            summary.events += 1;
            info!("Device event {} ({} subscribers)", event, subscribers.len());

            for callback in &subscribers {
                callback(&event).map_err(|source| DispatchError::Subscriber {
                    kind,
                    drive,
                    source,
                })?;
                summary.deliveries += 1;
            }
        }

        debug!(
            "Dispatch: {} events, {} deliveries",
            summary.events, summary.deliveries
        );
        Ok(summary)
    }
}
