//! Builder for configuring ThingsApi initialization.

use crate::config::AddressConfig;
use crate::discovery::{DiscoverySource, LocalDiscovery};
use crate::error::Result;
use crate::store::{MemoryThingStore, SqliteThingStore, ThingStore};
use crate::ThingsApi;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

enum StoreChoice {
    Default,
    Path(PathBuf),
    Memory,
    Custom(Arc<dyn ThingStore>),
}

/// Builder for configuring ThingsApi initialization.
///
/// # Example
///
/// ```rust,ignore
/// use thing_registry::{LocalDiscovery, ThingsApi};
///
/// let discovery = Arc::new(LocalDiscovery::new());
/// let api = ThingsApi::builder()
///     .db_path("./things.sqlite")
///     .discovery(discovery.clone())
///     .build()?;
/// ```
pub struct ThingsApiBuilder {
    store: StoreChoice,
    discovery: Option<Arc<dyn DiscoverySource>>,
    addresses: AddressConfig,
}

impl ThingsApiBuilder {
    pub fn new() -> Self {
        Self {
            store: StoreChoice::Default,
            discovery: None,
            addresses: AddressConfig::default(),
        }
    }

    /// Persist things in a SQLite database at `path`.
    ///
    /// Default: the platform data directory (see [`crate::config::default_db_path`]).
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = StoreChoice::Path(path.into());
        self
    }

    /// Keep things in process memory only.
    pub fn in_memory(mut self) -> Self {
        self.store = StoreChoice::Memory;
        self
    }

    /// Use a caller-provided store.
    pub fn store(mut self, store: Arc<dyn ThingStore>) -> Self {
        self.store = StoreChoice::Custom(store);
        self
    }

    /// Discovery subsystem to reconcile against and listen to.
    ///
    /// Default: an empty [`LocalDiscovery`].
    pub fn discovery(mut self, discovery: Arc<dyn DiscoverySource>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Address prefixes for thing and property `href`s.
    pub fn addresses(mut self, addresses: AddressConfig) -> Self {
        self.addresses = addresses;
        self
    }

    /// Build the ThingsApi instance.
    ///
    /// Must be called from within a tokio runtime; the discovery listener is
    /// spawned here.
    pub fn build(self) -> Result<ThingsApi> {
        let store: Arc<dyn ThingStore> = match self.store {
            StoreChoice::Default => Arc::new(SqliteThingStore::open()?),
            StoreChoice::Path(path) => {
                info!("Using thing store at {}", path.display());
                Arc::new(SqliteThingStore::open_at(&path)?)
            }
            StoreChoice::Memory => Arc::new(MemoryThingStore::new()),
            StoreChoice::Custom(store) => store,
        };

        let discovery = self
            .discovery
            .unwrap_or_else(|| Arc::new(LocalDiscovery::new()));

        Ok(ThingsApi::new(store, discovery, self.addresses))
    }
}

impl Default for ThingsApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}
