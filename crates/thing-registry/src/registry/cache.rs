//! In-memory thing cache backed by a persistent store.

use crate::config::{AddressConfig, HubConfig};
use crate::error::{RegistryError, Result};
use crate::models::{Thing, ThingDescription};
use crate::store::ThingStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// Snapshot of the cache, keyed by thing id.
pub type ThingMap = HashMap<String, Arc<Thing>>;

/// Changes applied through the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    ThingCreated(ThingDescription),
    ThingRemoved(String),
    Cleared,
}

#[derive(Default)]
struct CacheState {
    warm: bool,
    /// Bumped by `clear()` so a load that started earlier cannot re-warm the cache.
    generation: u64,
    /// Shared with callers as a snapshot; mutations copy on write.
    things: Arc<ThingMap>,
}

/// Authoritative registry of things.
///
/// The cache starts cold and is filled from the store on first use. Cold
/// loads, creates and removes all hold the same async gate across the store
/// call and the cache update, so:
/// - concurrent cold callers share a single store query
/// - cache updates are applied in the order the store saw them
///
/// Reads of a warm cache only take a short, non-async read lock.
pub struct ThingRegistry {
    store: Arc<dyn ThingStore>,
    addresses: AddressConfig,
    state: RwLock<CacheState>,
    gate: Mutex<()>,
    events_tx: broadcast::Sender<RegistryEvent>,
}

impl ThingRegistry {
    pub fn new(store: Arc<dyn ThingStore>, addresses: AddressConfig) -> Self {
        let (events_tx, _) = broadcast::channel(HubConfig::REGISTRY_EVENT_CAPACITY);
        Self {
            store,
            addresses,
            state: RwLock::new(CacheState::default()),
            gate: Mutex::new(()),
            events_tx,
        }
    }

    pub fn addresses(&self) -> &AddressConfig {
        &self.addresses
    }

    /// Subscribe to create/remove/clear notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events_tx.subscribe()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CacheState>> {
        self.state
            .read()
            .map_err(|_| RegistryError::Other("Thing cache lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CacheState>> {
        self.state
            .write()
            .map_err(|_| RegistryError::Other("Thing cache lock poisoned".to_string()))
    }

    fn warm_snapshot(&self) -> Result<Option<Arc<ThingMap>>> {
        let state = self.read_state()?;
        Ok(state.warm.then(|| state.things.clone()))
    }

    /// Whether the cache currently mirrors the store.
    pub fn is_warm(&self) -> bool {
        self.read_state().map(|s| s.warm).unwrap_or(false)
    }

    /// Number of cached things (zero while cold).
    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.things.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All things, loading them from the store if the cache is cold.
    pub async fn get_all(&self) -> Result<Arc<ThingMap>> {
        if let Some(things) = self.warm_snapshot()? {
            return Ok(things);
        }

        let _gate = self.gate.lock().await;

        // Another caller may have finished the load while we waited.
        if let Some(things) = self.warm_snapshot()? {
            return Ok(things);
        }

        let generation = self.read_state()?.generation;
        let records = self.store.list_all().await?;
        let things: Arc<ThingMap> = Arc::new(
            records
                .into_iter()
                .map(|record| {
                    let thing = Thing::from_stored(record, &self.addresses);
                    (thing.id().to_string(), Arc::new(thing))
                })
                .collect(),
        );

        let mut state = self.write_state()?;
        if state.generation == generation {
            state.things = things.clone();
            state.warm = true;
            debug!("Loaded {} things from store", things.len());
        } else {
            debug!("Cache cleared during load, leaving it cold");
        }

        Ok(things)
    }

    /// Descriptions of all things, in `get_all` iteration order.
    pub async fn get_descriptions(&self) -> Result<Vec<ThingDescription>> {
        let things = self.get_all().await?;
        Ok(things.values().map(|thing| thing.description()).collect())
    }

    /// Look up one thing.
    pub async fn get(&self, id: &str) -> Result<Arc<Thing>> {
        {
            let state = self.read_state()?;
            if state.warm {
                return state
                    .things
                    .get(id)
                    .cloned()
                    .ok_or_else(|| RegistryError::NotFound { id: id.to_string() });
            }
        }

        let things = self.get_all().await?;
        things
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Description of one thing.
    pub async fn get_description(&self, id: &str) -> Result<ThingDescription> {
        Ok(self.get(id).await?.description())
    }

    /// Persist a new thing and add it to the cache.
    ///
    /// The cache is only touched after the store accepted the write. Returns
    /// the persisted, address-annotated description.
    pub async fn create(&self, id: &str, description: ThingDescription) -> Result<ThingDescription> {
        if id.is_empty() {
            return Err(RegistryError::InvalidParams {
                message: "Thing id must not be empty".to_string(),
            });
        }

        let pending = Thing::new(id, description, &self.addresses);

        let _gate = self.gate.lock().await;
        let record = self.store.create(id, pending.description_ref()).await?;
        let thing = Arc::new(Thing::from_stored(record, &self.addresses));
        let description = thing.description();

        {
            let mut state = self.write_state()?;
            // A cold cache picks the thing up on its next load.
            if state.warm {
                Arc::make_mut(&mut state.things).insert(id.to_string(), thing);
            }
        }

        info!("Created thing {}", id);
        let _ = self
            .events_tx
            .send(RegistryEvent::ThingCreated(description.clone()));

        Ok(description)
    }

    /// Delete a thing from the store, then release and evict it.
    ///
    /// Removing an id the store no longer has succeeds, as does removing an id
    /// that is not cached. Any other store failure leaves the cache untouched.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _gate = self.gate.lock().await;

        match self.store.remove(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Thing {} already absent from store", id);
            }
            Err(e) => return Err(e),
        }

        let evicted = {
            let mut state = self.write_state()?;
            if state.things.contains_key(id) {
                Arc::make_mut(&mut state.things).remove(id)
            } else {
                None
            }
        };
        if let Some(thing) = evicted {
            thing.release();
        }

        info!("Removed thing {}", id);
        let _ = self
            .events_tx
            .send(RegistryEvent::ThingRemoved(id.to_string()));

        Ok(())
    }

    /// Drop every cached thing and mark the cache cold.
    ///
    /// Persisted things are untouched; the next read reloads them.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write_state()?;
        state.things = Arc::default();
        state.warm = false;
        state.generation += 1;
        drop(state);

        debug!("Thing cache cleared");
        let _ = self.events_tx.send(RegistryEvent::Cleared);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryThingStore, StoredThing};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store wrapper that counts queries, can be slowed down, and can fail.
    struct InstrumentedStore {
        inner: MemoryThingStore,
        list_calls: AtomicUsize,
        list_delay: Duration,
        fail_writes: AtomicBool,
        fail_removes: AtomicBool,
    }

    impl InstrumentedStore {
        fn new(things: Vec<ThingDescription>) -> Self {
            Self {
                inner: MemoryThingStore::with_things(things),
                list_calls: AtomicUsize::new(0),
                list_delay: Duration::ZERO,
                fail_writes: AtomicBool::new(false),
                fail_removes: AtomicBool::new(false),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.list_delay = delay;
            self
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ThingStore for InstrumentedStore {
        async fn list_all(&self) -> Result<Vec<StoredThing>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if !self.list_delay.is_zero() {
                tokio::time::sleep(self.list_delay).await;
            }
            self.inner.list_all().await
        }

        async fn create(&self, id: &str, description: &ThingDescription) -> Result<StoredThing> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RegistryError::store("disk full"));
            }
            self.inner.create(id, description).await
        }

        async fn remove(&self, id: &str) -> Result<()> {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(RegistryError::store("database locked"));
            }
            self.inner.remove(id).await
        }
    }

    fn registry_with(store: Arc<InstrumentedStore>) -> ThingRegistry {
        ThingRegistry::new(store, AddressConfig::default())
    }

    fn lamp() -> ThingDescription {
        ThingDescription::new("lamp")
            .with_property("on")
            .with_field("title", json!("Desk Lamp"))
    }

    #[tokio::test]
    async fn test_cold_load_queries_store_once() {
        let store = Arc::new(InstrumentedStore::new(vec![
            ThingDescription::new("a"),
            ThingDescription::new("b"),
        ]));
        let registry = registry_with(store.clone());
        assert!(!registry.is_warm());

        for _ in 0..5 {
            let things = registry.get_all().await.unwrap();
            assert_eq!(things.len(), 2);
        }

        assert_eq!(store.list_calls(), 1);
        assert!(registry.is_warm());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_loads_are_single_flight() {
        let store = Arc::new(
            InstrumentedStore::new(vec![ThingDescription::new("a"), ThingDescription::new("b")])
                .with_delay(Duration::from_millis(50)),
        );
        let registry = Arc::new(registry_with(store.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_all().await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(store.list_calls(), 1);
        let mut expected: Vec<_> = results[0].keys().cloned().collect();
        expected.sort();
        for things in &results {
            let mut keys: Vec<_> = things.keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, expected);
            for (id, thing) in things.iter() {
                assert!(Arc::ptr_eq(thing, &results[0][id]));
            }
        }
    }

    #[tokio::test]
    async fn test_clear_during_load_keeps_cache_cold() {
        let store = Arc::new(
            InstrumentedStore::new(vec![ThingDescription::new("a")])
                .with_delay(Duration::from_millis(200)),
        );
        let registry = Arc::new(registry_with(store.clone()));

        let loading = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_all().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.clear().unwrap();

        // The caller still gets its records, but the cache stays cold.
        let loaded = loading.await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(store.list_calls(), 1);
        assert!(!registry.is_warm());
        assert!(registry.is_empty());

        registry.get_all().await.unwrap();
        assert_eq!(store.list_calls(), 2);
        assert!(registry.is_warm());
    }

    #[tokio::test]
    async fn test_warm_snapshots_are_shared_and_copied_on_write() {
        let store = Arc::new(InstrumentedStore::new(vec![ThingDescription::new("a")]));
        let registry = registry_with(store.clone());

        let first = registry.get_all().await.unwrap();
        let second = registry.get_all().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry.create("lamp", lamp()).await.unwrap();
        let after = registry.get_all().await.unwrap();
        assert!(!first.contains_key("lamp"));
        assert!(after.contains_key("lamp"));

        assert!(registry.get("lamp").await.is_ok());
        assert!(registry.get("missing").await.unwrap_err().is_not_found());
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let store = Arc::new(InstrumentedStore::new(vec![]));
        let registry = registry_with(store);

        let created = registry.create("lamp", lamp()).await.unwrap();
        let fetched = registry.get_description("lamp").await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(created.extra["title"], json!("Desk Lamp"));
        assert_eq!(created.href.as_deref(), Some("/things/lamp"));
        assert_eq!(
            created.properties["on"].href.as_deref(),
            Some("/things/lamp/properties/on")
        );
    }

    #[tokio::test]
    async fn test_create_on_warm_cache_is_visible_without_reload() {
        let store = Arc::new(InstrumentedStore::new(vec![ThingDescription::new("a")]));
        let registry = registry_with(store.clone());

        registry.get_all().await.unwrap();
        registry.create("lamp", lamp()).await.unwrap();

        let things = registry.get_all().await.unwrap();
        assert!(things.contains_key("lamp"));
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_cache_untouched() {
        let store = Arc::new(InstrumentedStore::new(vec![]));
        let registry = registry_with(store.clone());
        registry.get_all().await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = registry.create("lamp", lamp()).await.unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable { .. }));

        let err = registry.get("lamp").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_conflict() {
        let store = Arc::new(InstrumentedStore::new(vec![lamp()]));
        let registry = registry_with(store);

        let err = registry.create("lamp", lamp()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_id() {
        let registry = registry_with(Arc::new(InstrumentedStore::new(vec![])));
        let err = registry.create("", lamp()).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn test_remove_then_get_is_not_found_and_remove_is_idempotent() {
        let store = Arc::new(InstrumentedStore::new(vec![]));
        let registry = registry_with(store);

        registry.create("lamp", lamp()).await.unwrap();
        registry.get_all().await.unwrap();
        let thing = registry.get("lamp").await.unwrap();

        registry.remove("lamp").await.unwrap();
        assert!(thing.is_released());

        let err = registry.get("lamp").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(registry.get_description("lamp").await.unwrap_err().is_not_found());

        registry.remove("lamp").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_store_remove_keeps_cached_thing() {
        let store = Arc::new(InstrumentedStore::new(vec![lamp()]));
        let registry = registry_with(store.clone());
        registry.get_all().await.unwrap();

        store.fail_removes.store(true, Ordering::SeqCst);
        let err = registry.remove("lamp").await.unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable { .. }));

        let thing = registry.get("lamp").await.unwrap();
        assert!(!thing.is_released());
    }

    #[tokio::test]
    async fn test_clear_forces_fresh_query() {
        let store = Arc::new(InstrumentedStore::new(vec![ThingDescription::new("a")]));
        let registry = registry_with(store.clone());

        registry.get_all().await.unwrap();
        assert_eq!(store.list_calls(), 1);

        registry.clear().unwrap();
        assert!(!registry.is_warm());
        assert!(registry.is_empty());

        let things = registry.get_all().await.unwrap();
        assert_eq!(things.len(), 1);
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_on_load_propagates_and_stays_cold() {
        struct BrokenStore;

        #[async_trait::async_trait]
        impl ThingStore for BrokenStore {
            async fn list_all(&self) -> Result<Vec<StoredThing>> {
                Err(RegistryError::store("unreachable"))
            }
            async fn create(&self, id: &str, _: &ThingDescription) -> Result<StoredThing> {
                Err(RegistryError::Conflict { id: id.to_string() })
            }
            async fn remove(&self, _: &str) -> Result<()> {
                Ok(())
            }
        }

        let registry = ThingRegistry::new(Arc::new(BrokenStore), AddressConfig::default());
        let err = registry.get_all().await.unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable { .. }));
        assert!(!registry.get("a").await.unwrap_err().is_not_found());
        assert!(!registry.is_warm());
    }

    #[tokio::test]
    async fn test_get_descriptions_projects_every_thing() {
        let store = Arc::new(InstrumentedStore::new(vec![
            ThingDescription::new("a"),
            ThingDescription::new("b").with_property("level"),
        ]));
        let registry = registry_with(store);

        let mut descriptions = registry.get_descriptions().await.unwrap();
        descriptions.sort_by(|x, y| x.id.cmp(&y.id));

        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[0].href.as_deref(), Some("/things/a"));
        assert_eq!(
            descriptions[1].properties["level"].href.as_deref(),
            Some("/things/b/properties/level")
        );
    }

    #[tokio::test]
    async fn test_events_follow_mutations() {
        let registry = registry_with(Arc::new(InstrumentedStore::new(vec![])));
        let mut events = registry.subscribe_events();

        let created = registry.create("lamp", lamp()).await.unwrap();
        registry.remove("lamp").await.unwrap();
        registry.clear().unwrap();

        assert_eq!(events.recv().await.unwrap(), RegistryEvent::ThingCreated(created));
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::ThingRemoved("lamp".to_string())
        );
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::Cleared);
    }
}
