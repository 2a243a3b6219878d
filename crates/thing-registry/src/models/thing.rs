//! The Thing descriptor entity.

use super::ThingDescription;
use crate::config::AddressConfig;
use crate::store::StoredThing;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// One registered device, owned by the registry cache.
///
/// The description is annotated with its addresses on construction, so the
/// description served after a reload matches the one returned at creation.
#[derive(Debug)]
pub struct Thing {
    id: String,
    description: ThingDescription,
    released: AtomicBool,
}

impl Thing {
    /// Build a thing, forcing `description.id` to `id` and annotating addresses.
    pub fn new(
        id: impl Into<String>,
        mut description: ThingDescription,
        addresses: &AddressConfig,
    ) -> Self {
        let id = id.into();
        description.id = id.clone();
        description.annotate(addresses);
        Self {
            id,
            description,
            released: AtomicBool::new(false),
        }
    }

    /// Rebuild a thing from a store record.
    pub fn from_stored(record: StoredThing, addresses: &AddressConfig) -> Self {
        Self::new(record.id, record.description, addresses)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The externally-visible description.
    pub fn description(&self) -> ThingDescription {
        self.description.clone()
    }

    pub fn description_ref(&self) -> &ThingDescription {
        &self.description
    }

    /// Release hook, run when the thing is removed from the registry.
    ///
    /// Returns `true` only for the first call.
    pub fn release(&self) -> bool {
        let first = !self.released.swap(true, Ordering::AcqRel);
        if first {
            debug!("Released thing {}", self.id);
        }
        first
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
