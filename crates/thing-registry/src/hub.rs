//! Fan-out of newly discovered things to live subscribers.
//!
//! Subscribers are keyed by a generated [`SubscriberId`] and removed by that
//! id when their connection closes. Broadcasts iterate a snapshot of the
//! subscriber list and are best-effort per subscriber.

use crate::config::HubConfig;
use crate::discovery::DiscoveryEvent;
use crate::error::{RegistryError, Result};
use crate::models::ThingDescription;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Handle identifying one registered subscriber.
pub type SubscriberId = u64;

/// A live connection that wants "new thing" notifications.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one serialized payload.
    async fn send(&self, payload: String) -> Result<()>;

    /// Resolves once the underlying connection has closed.
    async fn closed(&self);
}

/// Subscriber backed by a bounded channel.
///
/// The transport owns the receiving half; dropping it closes the subscriber.
/// A full queue fails the delivery instead of stalling the broadcast.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<String>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(HubConfig::SUBSCRIBER_QUEUE_DEPTH)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl Subscriber for ChannelSubscriber {
    async fn send(&self, payload: String) -> Result<()> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RegistryError::Other("subscriber queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                RegistryError::Other("subscriber closed".to_string())
            }
        })
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<SubscriberId>,
}

struct Entry {
    id: SubscriberId,
    subscriber: Arc<dyn Subscriber>,
    /// Task waiting for the subscriber to close; it holds a subscriber clone.
    watcher: AbortHandle,
}

struct HubInner {
    subscribers: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Entry>> {
        // The list stays consistent even if a holder panicked.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriberId) -> Option<Entry> {
        let mut subscribers = self.subscribers();
        let index = subscribers.iter().position(|entry| entry.id == id)?;
        Some(subscribers.remove(index))
    }
}

/// Registry of live subscribers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SubscriberHub {
    inner: Arc<HubInner>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Add a subscriber and watch for its close signal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        // The watcher cannot remove the entry before it is pushed: removal
        // needs the list lock held here.
        let mut subscribers = self.inner.subscribers();
        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        let watched = subscriber.clone();
        let watcher = tokio::spawn(async move {
            watched.closed().await;
            drop(watched);
            if let Some(hub) = hub.upgrade() {
                if hub.remove(id).is_some() {
                    debug!("Subscriber {} closed", id);
                }
            }
        });
        subscribers.push(Entry {
            id,
            subscriber,
            watcher: watcher.abort_handle(),
        });
        drop(subscribers);

        debug!("Registered subscriber {}", id);
        id
    }

    /// Remove a subscriber by id and stop watching it.
    ///
    /// The hub holds no reference to the subscriber afterwards. Returns
    /// `false` if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        match self.inner.remove(id) {
            Some(entry) => {
                entry.watcher.abort();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send a newly discovered thing to every registered subscriber.
    ///
    /// Failed deliveries are logged and reported; they neither stop other
    /// deliveries nor unregister the subscriber.
    pub async fn broadcast_new_thing(&self, description: &ThingDescription) -> Result<BroadcastReport> {
        let payload = serde_json::to_string(description)?;
        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .inner
            .subscribers()
            .iter()
            .map(|entry| (entry.id, entry.subscriber.clone()))
            .collect();

        let deliveries = snapshot.iter().map(|(id, subscriber)| {
            let payload = payload.clone();
            async move { (*id, subscriber.send(payload).await) }
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let err = RegistryError::SubscriberDelivery {
                        subscriber: id,
                        message: e.to_string(),
                    };
                    warn!("{}", err);
                    report.failed.push(id);
                }
            }
        }

        debug!(
            "Broadcast new thing {} to {} subscribers ({} failed)",
            description.id,
            report.delivered,
            report.failed.len()
        );
        Ok(report)
    }

    /// Forward every `ThingAdded` discovery event to the subscribers.
    ///
    /// The task ends when the discovery channel closes.
    pub fn spawn_discovery_listener(
        &self,
        mut events: broadcast::Receiver<DiscoveryEvent>,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(DiscoveryEvent::ThingAdded(description)) => {
                        if let Err(e) = hub.broadcast_new_thing(&description).await {
                            warn!("Failed to broadcast new thing {}: {}", description.id, e);
                        }
                    }
                    Ok(DiscoveryEvent::ThingRemoved(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Discovery listener lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Discovery event channel closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}
