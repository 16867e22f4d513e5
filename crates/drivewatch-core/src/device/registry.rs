/// Subscription registry — who wants to hear about which event kind.
///
/// One instance per process, constructed by the host and shared through an
/// `Arc` with the dispatcher. The table is guarded by a `parking_lot::Mutex`
/// that is only held while the table itself is read or written, never while
/// a callback runs. Dispatch works on a [`snapshot`](SubscriptionRegistry::snapshot),
/// so callbacks may subscribe or unsubscribe (themselves or others) without
/// affecting the pass already in progress.
use super::event::{DeviceEvent, EventKind};
use crate::error::RegistryError;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// A subscriber callback. Returning `Err` aborts the rest of the fan-out.
pub type Callback = Arc<dyn Fn(&DeviceEvent) -> anyhow::Result<()> + Send + Sync>;

/// Opaque token returned by [`SubscriptionRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    kind: EventKind,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Entry {
    id: u64,
    kind: EventKind,
    callback: Callback,
}

#[derive(Default)]
struct Table {
    next_id: u64,
    /// Kept in registration order.
    entries: Vec<Entry>,
}

/// Table of subscriber callbacks per event kind.
#[derive(Default)]
pub struct SubscriptionRegistry {
    table: Mutex<Table>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind`. The same callback may be registered
    /// any number of times; each registration gets its own handle.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&DeviceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_callback(kind, Arc::new(callback))
    }

    /// Register an already shared callback.
    pub fn subscribe_callback(&self, kind: EventKind, callback: Callback) -> SubscriptionHandle {
        let mut table = self.table.lock();
        table.next_id += 1;
        let id = table.next_id;
        table.entries.push(Entry { id, kind, callback });
        debug!("Registry: subscribed #{} to {}", id, kind);
        SubscriptionHandle { id, kind }
    }

    /// Forward events of `kind` into a channel, for consumers on another
    /// thread. Never blocks the notification path: a full or disconnected
    /// channel is reported as a subscriber failure.
    pub fn subscribe_channel(&self, kind: EventKind, tx: Sender<DeviceEvent>) -> SubscriptionHandle {
        self.subscribe(kind, move |event| match tx.try_send(*event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow::anyhow!("event channel is full")),
            Err(TrySendError::Disconnected(_)) => {
                Err(anyhow::anyhow!("event channel is disconnected"))
            }
        })
    }

    /// Remove a registration. Unknown (or already removed) handles are an
    /// error and leave the table untouched.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), RegistryError> {
        let mut table = self.table.lock();
        match table.entries.iter().position(|e| e.id == handle.id) {
            Some(pos) => {
                table.entries.remove(pos);
                debug!("Registry: unsubscribed #{} from {}", handle.id, handle.kind);
                Ok(())
            }
            None => {
                warn!("Registry: unsubscribe of unknown handle #{}", handle.id);
                Err(RegistryError::UnknownHandle(handle))
            }
        }
    }

    /// Point-in-time copy of the callbacks for `kind`, in registration order.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Callback> {
        self.table
            .lock()
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| Arc::clone(&e.callback))
            .collect()
    }

    /// Number of live registrations for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.table.lock().entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &table.entries.len())
            .finish()
    }
}
