//! Discovery subsystem boundary.
//!
//! Device adapters report what is currently connected; the registry only needs
//! the current set and a typed stream of "thing added" events.

use crate::config::DiscoveryConfig;
use crate::error::{RegistryError, Result};
use crate::models::ThingDescription;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by a discovery source.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A device became connected for the first time.
    ThingAdded(ThingDescription),
    /// A connected device went away.
    ThingRemoved(String),
}

/// Source of live device descriptions.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Descriptions of every currently connected device.
    ///
    /// Returned values are owned copies; callers may annotate them freely.
    async fn list_connected(&self) -> Result<Vec<ThingDescription>>;

    /// Subscribe to discovery events.
    fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent>;
}

/// In-process discovery subsystem fed by device adapters.
///
/// Keeps connected devices in connection order and emits `ThingAdded` only
/// for ids that were not already connected.
pub struct LocalDiscovery {
    devices: Mutex<Vec<ThingDescription>>,
    events_tx: broadcast::Sender<DiscoveryEvent>,
}

impl LocalDiscovery {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(DiscoveryConfig::EVENT_CHANNEL_CAPACITY);
        Self {
            devices: Mutex::new(Vec::new()),
            events_tx,
        }
    }

    fn lock_devices(&self) -> Result<std::sync::MutexGuard<'_, Vec<ThingDescription>>> {
        self.devices.lock().map_err(|_| RegistryError::Discovery {
            message: "Failed to acquire device list lock".to_string(),
        })
    }

    /// Record a connected device.
    ///
    /// A device that is already connected has its description replaced
    /// without emitting a new event. Returns whether the device was new.
    pub fn device_connected(&self, description: ThingDescription) -> Result<bool> {
        let mut devices = self.lock_devices()?;
        if let Some(existing) = devices.iter_mut().find(|d| d.id == description.id) {
            *existing = description;
            return Ok(false);
        }

        devices.push(description.clone());
        drop(devices);

        debug!("Device connected: {}", description.id);
        // No receivers is fine; nobody is listening yet.
        let _ = self.events_tx.send(DiscoveryEvent::ThingAdded(description));
        Ok(true)
    }

    /// Forget a device. Returns whether it was connected.
    pub fn device_disconnected(&self, id: &str) -> Result<bool> {
        let mut devices = self.lock_devices()?;
        let before = devices.len();
        devices.retain(|d| d.id != id);
        let removed = devices.len() != before;
        drop(devices);

        if removed {
            debug!("Device disconnected: {}", id);
            let _ = self
                .events_tx
                .send(DiscoveryEvent::ThingRemoved(id.to_string()));
        }
        Ok(removed)
    }
}

impl Default for LocalDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DiscoverySource for LocalDiscovery {
    async fn list_connected(&self) -> Result<Vec<ThingDescription>> {
        Ok(self.lock_devices()?.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events_tx.subscribe()
    }
}
