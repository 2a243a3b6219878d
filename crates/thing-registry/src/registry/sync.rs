//! Reconciliation of discovered devices against registered things.

use super::cache::{ThingMap, ThingRegistry};
use crate::config::AddressConfig;
use crate::discovery::DiscoverySource;
use crate::error::Result;
use crate::models::ThingDescription;
use std::sync::Arc;
use tracing::debug;

/// Finds devices the discovery subsystem knows about that are not registered.
pub struct DiscoverySync {
    registry: Arc<ThingRegistry>,
    discovery: Arc<dyn DiscoverySource>,
}

impl DiscoverySync {
    pub fn new(registry: Arc<ThingRegistry>, discovery: Arc<dyn DiscoverySource>) -> Self {
        Self {
            registry,
            discovery,
        }
    }

    /// Connected but unregistered devices, annotated with their future addresses.
    ///
    /// Read-only: neither the cache nor the store is written.
    pub async fn unregistered_things(&self) -> Result<Vec<ThingDescription>> {
        let stored = self.registry.get_all().await?;
        let connected = self.discovery.list_connected().await?;
        let new_things = unregistered_things(&stored, connected, self.registry.addresses());
        debug!("{} connected devices are not registered", new_things.len());
        Ok(new_things)
    }
}

/// Keep the `connected` devices whose id is not in `stored`, in their
/// original order, with `href` and every property `href` rewritten.
///
/// `connected` is consumed, so the caller's copies are the only ones annotated.
pub fn unregistered_things(
    stored: &ThingMap,
    connected: Vec<ThingDescription>,
    addresses: &AddressConfig,
) -> Vec<ThingDescription> {
    connected
        .into_iter()
        .filter(|device| !stored.contains_key(&device.id))
        .map(|mut device| {
            device.annotate(addresses);
            device
        })
        .collect()
}
