//! Thing Registry - headless registry of gateway device descriptors.
//!
//! Keeps an in-memory cache of persisted Thing descriptions, reconciles it
//! against devices reported by a discovery subsystem, and notifies live
//! subscribers when new devices appear. It can be used programmatically
//! without any HTTP/RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use thing_registry::{LocalDiscovery, ThingDescription, ThingsApi};
//!
//! #[tokio::main]
//! async fn main() -> thing_registry::Result<()> {
//!     let discovery = Arc::new(LocalDiscovery::new());
//!     let api = ThingsApi::builder()
//!         .db_path("./things.sqlite")
//!         .discovery(discovery.clone())
//!         .build()?;
//!
//!     discovery.device_connected(ThingDescription::new("lamp").with_property("on"))?;
//!     for thing in api.new_things().await? {
//!         println!("unregistered: {:?}", thing.href);
//!     }
//!
//!     api.create_thing("lamp", ThingDescription::new("lamp")).await?;
//!     println!("{} things registered", api.list_things().await?.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod models;
pub mod registry;
pub mod store;

mod api;

// Re-export commonly used types
pub use config::{AddressConfig, PathsConfig};
pub use discovery::{DiscoveryEvent, DiscoverySource, LocalDiscovery};
pub use error::{RegistryError, Result};
pub use hub::{BroadcastReport, ChannelSubscriber, Subscriber, SubscriberHub, SubscriberId};
pub use models::{PropertyDescription, Thing, ThingDescription};
pub use registry::{DiscoverySync, RegistryEvent, ThingMap, ThingRegistry};
pub use store::{MemoryThingStore, SqliteThingStore, StoredThing, ThingStore};

pub use api::ThingsApiBuilder;

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Main API struct for registry operations.
///
/// Owns one [`ThingRegistry`], one [`SubscriberHub`] and the reconciliation
/// between the registry and the discovery subsystem. The hub is subscribed to
/// the discovery event stream exactly once, when the API is constructed, and
/// unsubscribed when it is dropped.
pub struct ThingsApi {
    registry: Arc<ThingRegistry>,
    sync: DiscoverySync,
    hub: SubscriberHub,
    discovery: Arc<dyn DiscoverySource>,
    listener: JoinHandle<()>,
}

impl ThingsApi {
    /// Create a builder for ThingsApi.
    pub fn builder() -> ThingsApiBuilder {
        ThingsApiBuilder::new()
    }

    /// Wire the registry, hub and reconciliation around the given collaborators.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn ThingStore>,
        discovery: Arc<dyn DiscoverySource>,
        addresses: AddressConfig,
    ) -> Self {
        let registry = Arc::new(ThingRegistry::new(store, addresses));
        let sync = DiscoverySync::new(registry.clone(), discovery.clone());
        let hub = SubscriberHub::new();
        let listener = hub.spawn_discovery_listener(discovery.subscribe());

        Self {
            registry,
            sync,
            hub,
            discovery,
            listener,
        }
    }

    pub fn registry(&self) -> &Arc<ThingRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &SubscriberHub {
        &self.hub
    }

    pub fn discovery(&self) -> &Arc<dyn DiscoverySource> {
        &self.discovery
    }

    pub fn addresses(&self) -> &AddressConfig {
        self.registry.addresses()
    }

    /// Descriptions of all registered things.
    pub async fn list_things(&self) -> Result<Vec<ThingDescription>> {
        self.registry.get_descriptions().await
    }

    /// Description of one registered thing.
    pub async fn get_thing(&self, id: &str) -> Result<ThingDescription> {
        self.registry.get_description(id).await
    }

    /// Register a thing.
    pub async fn create_thing(
        &self,
        id: &str,
        description: ThingDescription,
    ) -> Result<ThingDescription> {
        self.registry.create(id, description).await
    }

    /// Unregister a thing.
    pub async fn remove_thing(&self, id: &str) -> Result<()> {
        self.registry.remove(id).await
    }

    /// Connected devices that are not registered yet, with their addresses.
    pub async fn new_things(&self) -> Result<Vec<ThingDescription>> {
        self.sync.unregistered_things().await
    }

    /// Start sending newly discovered things to `subscriber`.
    pub fn register_subscriber(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.hub.register(subscriber)
    }

    /// Drop all cached things; they are reloaded from the store on next use.
    pub fn reset(&self) -> Result<()> {
        self.registry.clear()
    }
}

impl Drop for ThingsApi {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
