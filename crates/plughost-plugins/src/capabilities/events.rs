//! Topic events shared between plugins
//!
//! One ordered [`EventBus`] carries every topic. Each subscription remembers
//! its owner so a plugin can only remove its own handlers, and everything a
//! plugin subscribed is dropped when it unloads.

use plughost_core::{EventBus, SubscriptionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Event published on a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEvent {
    pub topic: String,
    /// Plugin ID of the publisher
    pub source: String,
    pub payload: Value,
}

struct Owned {
    owner: String,
    topic: String,
    /// Set once a one-shot subscription has fired
    spent: Option<Arc<AtomicBool>>,
}

/// Host-wide topic bus
#[derive(Default)]
pub struct EventHub {
    bus: EventBus<TopicEvent>,
    owners: RwLock<HashMap<SubscriptionId, Owned>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn subscribe<F>(&self, owner: &str, topic: &str, once: bool, handler: F) -> SubscriptionId
    where
        F: Fn(&TopicEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let wanted = topic.to_string();
        let spent = once.then(|| Arc::new(AtomicBool::new(false)));
        let flag = spent.clone();

        let id = self
            .bus
            .subscribe(move |event: &TopicEvent| {
                if event.topic != wanted {
                    return Ok(());
                }
                if let Some(flag) = &flag {
                    if flag.swap(true, Ordering::SeqCst) {
                        return Ok(());
                    }
                }
                handler(event)
            })
            .await;

        self.owners.write().await.insert(
            id,
            Owned {
                owner: owner.to_string(),
                topic: topic.to_string(),
                spent,
            },
        );
        id
    }

    /// Publish to every handler of `topic`, in subscription order.
    ///
    /// Returns the number of subscriptions on the topic at publish time.
    pub async fn emit(&self, source: &str, topic: &str, payload: Value) -> usize {
        let listeners = self.listener_count(topic).await;
        let event = TopicEvent {
            topic: topic.to_string(),
            source: source.to_string(),
            payload,
        };
        self.bus.emit(&event).await;

        let spent: Vec<SubscriptionId> = {
            let owners = self.owners.read().await;
            owners
                .iter()
                .filter(|(_, o)| {
                    o.spent
                        .as_ref()
                        .map_or(false, |flag| flag.load(Ordering::SeqCst))
                })
                .map(|(id, _)| *id)
                .collect()
        };
        for id in spent {
            self.remove(id).await;
        }

        listeners
    }

    async fn remove(&self, id: SubscriptionId) -> bool {
        self.owners.write().await.remove(&id);
        self.bus.unsubscribe(id).await
    }

    /// Remove a subscription if `owner` made it
    pub async fn unsubscribe(&self, owner: &str, id: SubscriptionId) -> bool {
        let owned = {
            let owners = self.owners.read().await;
            owners.get(&id).map_or(false, |o| o.owner == owner)
        };
        owned && self.remove(id).await
    }

    /// Drop every subscription made by `owner`
    pub async fn release(&self, owner: &str) -> usize {
        let ids: Vec<SubscriptionId> = {
            let owners = self.owners.read().await;
            owners
                .iter()
                .filter(|(_, o)| o.owner == owner)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in &ids {
            self.remove(*id).await;
        }
        if !ids.is_empty() {
            debug!(plugin_id = %owner, count = ids.len(), "Released event subscriptions");
        }
        ids.len()
    }

    /// Live subscriptions on `topic`
    pub async fn listener_count(&self, topic: &str) -> usize {
        self.owners
            .read()
            .await
            .values()
            .filter(|o| o.topic == topic)
            .count()
    }
}

/// Event handle scoped to one plugin
#[derive(Clone)]
pub struct ScopedEvents {
    plugin_id: String,
    hub: Arc<EventHub>,
}

impl ScopedEvents {
    pub(crate) fn new(plugin_id: &str, hub: Arc<EventHub>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            hub,
        }
    }

    pub async fn on<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&TopicEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hub.subscribe(&self.plugin_id, topic, false, handler).await
    }

    /// Subscribe for the next event on `topic` only
    pub async fn once<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&TopicEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hub.subscribe(&self.plugin_id, topic, true, handler).await
    }

    /// Remove one of this plugin's subscriptions
    pub async fn off(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(&self.plugin_id, id).await
    }

    pub async fn emit(&self, topic: &str, payload: Value) -> usize {
        self.hub.emit(&self.plugin_id, topic, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = Arc::new(EventHub::new());
        let a = ScopedEvents::new("a", hub.clone());
        let b = ScopedEvents::new("b", hub.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        a.on("build:done", move |e| {
            s.lock().unwrap().push(format!("{}:{}", e.source, e.payload));
            Ok(())
        })
        .await;

        assert_eq!(b.emit("build:done", json!(1)).await, 1);
        assert_eq!(b.emit("deploy:done", json!(2)).await, 0);
        assert_eq!(*seen.lock().unwrap(), vec!["b:1"]);
    }

    #[tokio::test]
    async fn test_once_fires_only_for_its_topic() {
        let hub = Arc::new(EventHub::new());
        let events = ScopedEvents::new("a", hub.clone());
        let hits = Arc::new(Mutex::new(0));

        let h = hits.clone();
        events
            .once("ready", move |_| {
                *h.lock().unwrap() += 1;
                Ok(())
            })
            .await;

        events.emit("other", json!(null)).await;
        assert_eq!(hub.listener_count("ready").await, 1);
        events.emit("ready", json!(null)).await;
        events.emit("ready", json!(null)).await;

        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(hub.listener_count("ready").await, 0);
    }

    #[tokio::test]
    async fn test_off_only_removes_own_subscriptions() {
        let hub = Arc::new(EventHub::new());
        let a = ScopedEvents::new("a", hub.clone());
        let b = ScopedEvents::new("b", hub.clone());

        let id = a.on("tick", |_| Ok(())).await;
        assert!(!b.off(id).await);
        assert!(a.off(id).await);
        assert!(!a.off(id).await);
    }

    #[tokio::test]
    async fn test_release_drops_owner_subscriptions() {
        let hub = Arc::new(EventHub::new());
        let a = ScopedEvents::new("a", hub.clone());
        let b = ScopedEvents::new("b", hub.clone());

        a.on("tick", |_| Ok(())).await;
        a.on("tock", |_| Ok(())).await;
        b.on("tick", |_| Ok(())).await;

        assert_eq!(hub.release("a").await, 2);
        assert_eq!(hub.listener_count("tick").await, 1);
        assert_eq!(hub.listener_count("tock").await, 0);
    }
}
