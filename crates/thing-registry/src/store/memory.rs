//! In-memory thing store.

use super::{StoredThing, ThingStore};
use crate::error::{RegistryError, Result};
use crate::models::ThingDescription;
use chrono::Utc;
use std::sync::Mutex;

/// Process-local store that keeps records in insertion order.
#[derive(Debug, Default)]
pub struct MemoryThingStore {
    records: Mutex<Vec<StoredThing>>,
}

impl MemoryThingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with descriptions.
    pub fn with_things(descriptions: impl IntoIterator<Item = ThingDescription>) -> Self {
        let now = Utc::now().to_rfc3339();
        let records = descriptions
            .into_iter()
            .map(|description| StoredThing {
                id: description.id.clone(),
                description,
                created_at: now.clone(),
            })
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, Vec<StoredThing>>> {
        self.records
            .lock()
            .map_err(|_| RegistryError::store("Failed to acquire memory store lock"))
    }
}

#[async_trait::async_trait]
impl ThingStore for MemoryThingStore {
    async fn list_all(&self) -> Result<Vec<StoredThing>> {
        Ok(self.lock_records()?.clone())
    }

    async fn create(&self, id: &str, description: &ThingDescription) -> Result<StoredThing> {
        let mut records = self.lock_records()?;
        if records.iter().any(|r| r.id == id) {
            return Err(RegistryError::Conflict { id: id.to_string() });
        }

        let record = StoredThing {
            id: id.to_string(),
            description: description.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut records = self.lock_records()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(RegistryError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}
