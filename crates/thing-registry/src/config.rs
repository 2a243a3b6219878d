//! Centralized configuration for the Thing registry.
//!
//! Path prefixes used for addressing, store tuning, and channel sizes.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Thing Registry";
    pub const DATA_DIR_NAME: &'static str = "thing-registry";
}

/// URL path prefixes that make up thing and property addresses.
pub struct PathsConfig;

impl PathsConfig {
    pub const THINGS_PATH: &'static str = "/things";
    pub const PROPERTIES_PATH: &'static str = "/properties";
    pub const NEW_THINGS_PATH: &'static str = "/new_things";
}

/// Persistent store configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const DB_FILE_NAME: &'static str = "things.sqlite";
    pub const BUSY_TIMEOUT_MS: u32 = 5_000;
}

/// Subscriber hub configuration.
pub struct HubConfig;

impl HubConfig {
    /// Pending payloads buffered per channel subscriber before sends fail.
    pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;
    /// Capacity of the registry's create/remove event channel.
    pub const REGISTRY_EVENT_CAPACITY: usize = 256;
}

/// Discovery subsystem configuration.
pub struct DiscoveryConfig;

impl DiscoveryConfig {
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// Address prefixes supplied by the surrounding system.
///
/// Thing address: `<things_path>/<id>`.
/// Property address: `<things_path>/<id><properties_path>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AddressConfig {
    pub things_path: String,
    pub properties_path: String,
}

impl AddressConfig {
    pub fn new(things_path: impl Into<String>, properties_path: impl Into<String>) -> Self {
        Self {
            things_path: things_path.into(),
            properties_path: properties_path.into(),
        }
    }

    /// Address of a thing.
    pub fn thing_href(&self, id: &str) -> String {
        format!("{}/{}", self.things_path, id)
    }

    /// Address of one property of a thing.
    pub fn property_href(&self, id: &str, property: &str) -> String {
        format!(
            "{}/{}{}/{}",
            self.things_path, id, self.properties_path, property
        )
    }
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self::new(PathsConfig::THINGS_PATH, PathsConfig::PROPERTIES_PATH)
    }
}

/// Default location of the things database.
///
/// - **Linux**: `~/.local/share/thing-registry/things.sqlite`
/// - **Windows**: `%APPDATA%\thing-registry\things.sqlite`
/// - **macOS**: `~/Library/Application Support/thing-registry/things.sqlite`
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| RegistryError::Config {
        message: "Could not determine data directory".to_string(),
    })?;
    Ok(data_dir
        .join(AppConfig::DATA_DIR_NAME)
        .join(StoreConfig::DB_FILE_NAME))
}
