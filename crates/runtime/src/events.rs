//! In-process event bus for workflow monitoring.
//!
//! Every workflow, session, and step transition funnels through this bus; it
//! is the sole observability surface of the runtime. Subscribers register per
//! topic or on `"*"` to receive everything, and a bounded history ring keeps
//! the most recent events for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Maximum number of events retained in the history ring.
pub const MAX_HISTORY: usize = 1000;

/// Topic that receives every emitted event.
pub const WILDCARD_TOPIC: &str = "*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventHandler =
    Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct BusState {
    subscribers: HashMap<String, Vec<(SubscriptionId, EventHandler)>>,
    history: VecDeque<Event>,
    next_id: u64,
}

/// Async publish/subscribe bus with wildcard topics and bounded history.
///
/// The bus is an explicitly owned component: callers hold it behind an `Arc`
/// and pass it to every consumer rather than going through a global. All
/// shared state lives behind one mutex; handlers are invoked on a snapshot
/// taken under the lock, so a handler may subscribe or emit without
/// deadlocking.
pub struct EventBus {
    state: Mutex<BusState>,
    max_history: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_limit(MAX_HISTORY)
    }

    pub fn with_history_limit(max_history: usize) -> Self {
        Self {
            state: Mutex::new(BusState {
                subscribers: HashMap::new(),
                history: VecDeque::with_capacity(max_history.min(MAX_HISTORY)),
                next_id: 0,
            }),
            max_history,
        }
    }

    /// Subscribe a handler to a topic (or `"*"` for all events).
    ///
    /// Handlers on the same topic are invoked in subscription order.
    pub async fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let mut state = self.state.lock().await;
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a previously registered handler. Returns false if the
    /// subscription was not found under the given topic.
    pub async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut state = self.state.lock().await;
        match state.subscribers.get_mut(topic) {
            Some(handlers) => {
                let before = handlers.len();
                handlers.retain(|(sub_id, _)| *sub_id != id);
                handlers.len() != before
            }
            None => false,
        }
    }

    /// Emit an event and await every exact-topic and wildcard handler.
    ///
    /// A failing handler is logged and never prevents the remaining handlers
    /// from running, nor does it propagate to the emitter.
    pub async fn emit(&self, event_type: &str, data: Value) {
        let event = Event {
            event_type: event_type.to_string(),
            data,
            timestamp: Utc::now(),
        };

        let handlers: Vec<EventHandler> = {
            let mut state = self.state.lock().await;
            if state.history.len() >= self.max_history {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());

            let mut snapshot = Vec::new();
            if let Some(exact) = state.subscribers.get(event_type) {
                snapshot.extend(exact.iter().map(|(_, h)| h.clone()));
            }
            if event_type != WILDCARD_TOPIC {
                if let Some(wildcard) = state.subscribers.get(WILDCARD_TOPIC) {
                    snapshot.extend(wildcard.iter().map(|(_, h)| h.clone()));
                }
            }
            snapshot
        };

        debug!(event_type, "Emitting event");

        for handler in handlers {
            if let Err(e) = handler(event.clone()).await {
                error!(event_type, "Error in event subscriber: {}", e);
            }
        }
    }

    /// Return retained events, optionally filtered by exact topic.
    pub async fn history(&self, event_type: Option<&str>) -> Vec<Event> {
        let state = self.state.lock().await;
        match event_type {
            Some(t) => state
                .history
                .iter()
                .filter(|e| e.event_type == t)
                .cloned()
                .collect(),
            None => state.history.iter().cloned().collect(),
        }
    }

    /// Drop all subscribers and retained history.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.subscribers.clear();
        state.history.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn collector(
        seen: Arc<StdMutex<Vec<String>>>,
    ) -> impl Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static {
        move |event: Event| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(event.event_type);
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn exact_and_wildcard_subscribers_both_fire() {
        let bus = EventBus::new();
        let exact = Arc::new(StdMutex::new(Vec::new()));
        let all = Arc::new(StdMutex::new(Vec::new()));

        bus.subscribe("step.started", collector(exact.clone())).await;
        bus.subscribe("*", collector(all.clone())).await;

        bus.emit("step.started", json!({"step_id": "s1"})).await;
        bus.emit("step.completed", json!({"step_id": "s1"})).await;

        assert_eq!(*exact.lock().unwrap(), vec!["step.started"]);
        assert_eq!(
            *all.lock().unwrap(),
            vec!["step.started", "step.completed"]
        );
    }

    #[tokio::test]
    async fn handlers_fire_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe("tick", move |_event: Event| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(tag);
                    Ok(())
                }
                .boxed()
            })
            .await;
        }

        bus.emit("tick", json!({})).await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        bus.subscribe("boom", |_event: Event| {
            async move { Err(anyhow::anyhow!("handler exploded")) }.boxed()
        })
        .await;
        bus.subscribe("boom", collector(seen.clone())).await;

        bus.emit("boom", json!({})).await;
        assert_eq!(*seen.lock().unwrap(), vec!["boom"]);
    }

    #[tokio::test]
    async fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let id = bus.subscribe("tick", collector(seen.clone())).await;
        bus.emit("tick", json!({})).await;

        assert!(bus.unsubscribe("tick", id).await);
        assert!(!bus.unsubscribe("tick", id).await);
        bus.emit("tick", json!({})).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_filters_by_topic() {
        let bus = EventBus::new();
        bus.emit("a", json!({"n": 1})).await;
        bus.emit("b", json!({"n": 2})).await;
        bus.emit("a", json!({"n": 3})).await;

        assert_eq!(bus.history(None).await.len(), 3);
        let only_a = bus.history(Some("a")).await;
        assert_eq!(only_a.len(), 2);
        assert_eq!(only_a[0].data["n"], 1);
        assert_eq!(only_a[1].data["n"], 3);
    }

    #[tokio::test]
    async fn history_evicts_oldest_beyond_capacity() {
        let bus = EventBus::new();
        for i in 0..(MAX_HISTORY + 1) {
            bus.emit("tick", json!({"seq": i})).await;
        }

        let history = bus.history(None).await;
        assert_eq!(history.len(), MAX_HISTORY);
        // seq 0 was evicted; the ring starts at seq 1.
        assert_eq!(history[0].data["seq"], 1);
        assert_eq!(history[MAX_HISTORY - 1].data["seq"], MAX_HISTORY);
    }

    #[tokio::test]
    async fn close_clears_subscribers_and_history() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe("tick", collector(seen.clone())).await;
        bus.emit("tick", json!({})).await;

        bus.close().await;
        bus.emit("tick", json!({})).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bus.history(None).await.len(), 1);
    }
}
