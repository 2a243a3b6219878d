//! Persistent storage for thing descriptions.
//!
//! The registry talks to storage only through [`ThingStore`]. Two backends
//! are provided:
//! - [`SqliteThingStore`]: durable, single-file SQLite database (WAL mode)
//! - [`MemoryThingStore`]: process-local, used for embedding and tests

mod memory;
mod sqlite;

pub use memory::MemoryThingStore;
pub use sqlite::SqliteThingStore;

use crate::error::Result;
use crate::models::ThingDescription;
use serde::{Deserialize, Serialize};

/// A thing record as persisted by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredThing {
    pub id: String,
    pub description: ThingDescription,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Storage backend for thing descriptions.
///
/// Uniqueness of ids is the store's responsibility: `create` fails with
/// `RegistryError::Conflict` for an existing id, `remove` fails with
/// `RegistryError::NotFound` for a missing one. Any I/O failure surfaces as
/// `RegistryError::StoreUnavailable`.
#[async_trait::async_trait]
pub trait ThingStore: Send + Sync {
    /// Fetch every stored thing.
    async fn list_all(&self) -> Result<Vec<StoredThing>>;

    /// Persist a new thing and return the stored record.
    async fn create(&self, id: &str, description: &ThingDescription) -> Result<StoredThing>;

    /// Delete a thing by id.
    async fn remove(&self, id: &str) -> Result<()>;
}
