//! Ordered event bus
//!
//! Subscribers are invoked synchronously from [`EventBus::emit`], in the order
//! they subscribed. A failing handler is logged and skipped; later handlers
//! still see the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Handler invoked for every delivered event
pub type EventHandler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Identifies one subscription so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription<E> {
    id: SubscriptionId,
    handler: EventHandler<E>,
    once: bool,
}

/// Publish/subscribe channel with registration-order delivery
pub struct EventBus<E> {
    subscribers: RwLock<Vec<Subscription<E>>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe for every future event
    pub async fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(Arc::new(handler), false).await
    }

    /// Subscribe for the next event only
    pub async fn subscribe_once<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(Arc::new(handler), true).await
    }

    async fn insert(&self, handler: EventHandler<E>, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.write().await;
        subscribers.push(Subscription { id, handler, once });
        id
    }

    /// Remove a subscription. Returns false if it was not present.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Deliver an event to every subscriber in registration order.
    ///
    /// Returns the number of handlers that accepted the event.
    pub async fn emit(&self, event: &E) -> usize {
        // Snapshot so handlers may subscribe/unsubscribe without deadlocking.
        let snapshot: Vec<(SubscriptionId, EventHandler<E>, bool)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .map(|s| (s.id, Arc::clone(&s.handler), s.once))
                .collect()
        };

        let mut delivered = 0;
        let mut fired_once = Vec::new();
        for (id, handler, once) in snapshot {
            if once {
                fired_once.push(id);
            }
            match handler(event) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(subscription = %id, error = %e, "Event handler error"),
            }
        }

        if !fired_once.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|s| !fired_once.contains(&s.id));
        }

        delivered
    }

    /// Number of live subscriptions
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
