/// Host state — wires the device-change engine to the device history.
///
/// The host owns the single [`SubscriptionRegistry`] of the process and
/// hands a [`Dispatcher`] over it to the notification channel. Arrivals and
/// removals append rows to the shared history; query-remove only logs,
/// removal is never vetoed.
use crate::config::HostConfig;
use crate::history::DeviceHistory;
use chrono::Local;
use drivewatch_core::platform::MountedDrive;
use drivewatch_core::{
    DeviceEvent, Dispatcher, EventKind, RegistryError, SubscriptionHandle, SubscriptionRegistry,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// History shared between the subscriber callbacks and the host.
pub type SharedHistory = Arc<Mutex<DeviceHistory>>;

pub struct HostState {
    pub config: HostConfig,
    registry: Arc<SubscriptionRegistry>,
    history: SharedHistory,
    handles: Vec<SubscriptionHandle>,
}

impl HostState {
    /// Build the state and subscribe the history to arrivals and removals.
    pub fn build(config: HostConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let history: SharedHistory =
            Arc::new(Mutex::new(DeviceHistory::new(config.identity.clone())));

        let mut state = Self {
            config,
            registry,
            history,
            handles: Vec::new(),
        };
        state.subscribe_history();
        state
    }

    fn subscribe_history(&mut self) {
        let history = Arc::clone(&self.history);
        let arrived = self.registry.subscribe(EventKind::Arrived, move |e: &DeviceEvent| {
            let mut history = history.lock();
            history.record_arrival(e.drive, Local::now());
            info!("Drive {} plugged in", e.drive);
            info!("{} devices had been detected.", history.len());
            Ok(())
        });

        let history = Arc::clone(&self.history);
        let removed = self.registry.subscribe(EventKind::Removed, move |e: &DeviceEvent| {
            let mut history = history.lock();
            history.record_removal(e.drive, Local::now());
            info!("Drive {} removed", e.drive);
            info!("{} devices had been detected.", history.len());
            Ok(())
        });

        let query = self.registry.subscribe(EventKind::QueryRemove, |e: &DeviceEvent| {
            debug!("Drive {} is about to be removed; permitting", e.drive);
            Ok(())
        });

        self.handles.extend([arrived, removed, query]);
    }

    /// Seed the history with the volumes already mounted at startup.
    pub fn seed(&self, mounted: &[MountedDrive]) {
        let mut history = self.history.lock();
        history.record_mounted(mounted, Local::now());
        if history.is_empty() {
            info!("No removable devices available");
        } else {
            info!("{} devices had been detected.", history.len());
        }
    }

    /// A dispatcher over this host's registry, for the notification channel.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.registry))
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    /// Drop the history subscriptions. Later notifications are no longer
    /// recorded.
    pub fn unsubscribe_all(&mut self) -> Result<(), RegistryError> {
        for handle in self.handles.drain(..) {
            self.registry.unsubscribe(handle)?;
        }
        Ok(())
    }

    /// Export the history if an export directory is configured.
    pub fn export(&self) -> anyhow::Result<Option<PathBuf>> {
        let Some(dir) = &self.config.export_dir else {
            debug!("No export directory configured; skipping CSV export");
            return Ok(None);
        };
        let path = self
            .history
            .lock()
            .export_csv(dir, &self.config.export_name, Local::now())?;
        Ok(Some(path))
    }

    /// Unsubscribe and export whatever was recorded, whether or not watching
    /// ended cleanly. The watch failure wins over a later one.
    pub fn shutdown(&mut self, watched: anyhow::Result<()>) -> anyhow::Result<()> {
        if let Err(e) = &watched {
            error!("Watching stopped: {:#}", e);
        }
        let unsubscribed = self.unsubscribe_all();
        let exported = self.export();
        if let Ok(Some(path)) = &exported {
            info!("Device history written to {}", path.display());
        }

        watched?;
        unsubscribed?;
        exported?;
        Ok(())
    }
}
