//! The thing registry and its reconciliation against live discovery.
//!
//! - [`ThingRegistry`]: lazily-loaded cache mirroring the persistent store
//! - [`DiscoverySync`]: connected devices that are not registered yet

mod cache;
mod sync;

pub use cache::{RegistryEvent, ThingMap, ThingRegistry};
pub use sync::{unregistered_things, DiscoverySync};
