//! # Topic-keyed event bus.
//!
//! [`EventBus`] routes JSON payloads to handlers registered under a topic
//! name. It backs the `sync`/`wait` rendezvous, the `/sync` replies of
//! synchronous message commands and the job lifecycle notifications
//! (`/job-join`, `/job-completed`).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                       Handlers (per topic):
//!   Ctx::sync      ──┐                       ┌──► one-shot (wait)       ─► removed after first hit
//!   Scheduler      ──┼──► EventBus ──topic──►├──► persistent            ─► kept
//!   Command::Sync  ──┘                       └──► persistent → Remove   ─► removed after returning Remove
//! ```
//!
//! ## Rules
//! - **Synchronous dispatch**: `publish()` runs matching handlers on the
//!   caller's task before returning; handlers must not block.
//! - **No persistence**: a payload published to a topic with no handler is
//!   dropped; handlers registered later never see it.
//! - **One-shot is exactly-once**: one-shot handlers are detached under the
//!   topic lock, so two racing publishes cannot both fire the same handler.
//! - **Panic isolation**: a panicking handler is logged and removed; other
//!   handlers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use crate::counter::Counter;

/// Payload carried by the bus.
pub type Payload = serde_json::Value;

/// Identifier returned by [`EventBus::subscribe`] and [`EventBus::subscribe_once`].
pub type SubscriptionId = u64;

/// What a persistent handler wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Stay subscribed.
    Keep,
    /// Unsubscribe this handler.
    Remove,
}

type Handler = Arc<dyn Fn(&Payload) -> HandlerAction + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    once: bool,
    handler: Handler,
}

struct Inner {
    topics: Mutex<HashMap<String, Vec<Subscription>>>,
    ids: Counter,
}

/// Topic-keyed publish/subscribe facility.
///
/// Cheap to clone: clones share the same handler table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("topics", &topics.len())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                ids: Counter::new(1),
            }),
        }
    }

    /// Registers a persistent handler on `topic`.
    ///
    /// The handler stays until [`unsubscribe`](Self::unsubscribe) is called or
    /// it returns [`HandlerAction::Remove`].
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Payload) -> HandlerAction + Send + Sync + 'static,
    {
        self.insert(topic.into(), false, Arc::new(handler))
    }

    /// Registers a handler that runs for the first matching publish only.
    pub fn subscribe_once<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: FnOnce(&Payload) + Send + 'static,
    {
        let slot = Mutex::new(Some(handler));
        self.insert(
            topic.into(),
            true,
            Arc::new(move |payload: &Payload| {
                let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(f) = taken {
                    f(payload);
                }
                HandlerAction::Remove
            }),
        )
    }

    /// Removes a handler. Returns false if it was already gone.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(subs) = topics.get_mut(topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Publishes `payload` to every handler currently registered on `topic`.
    ///
    /// Returns the number of handlers that ran. Zero means the payload was
    /// dropped.
    pub fn publish(&self, topic: &str, payload: Payload) -> usize {
        let fired: Vec<(SubscriptionId, Handler)> = {
            let mut topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(subs) = topics.get_mut(topic) else {
                tracing::trace!(topic, "no handlers, payload dropped");
                return 0;
            };
            let fired = subs
                .iter()
                .map(|s| (s.id, Arc::clone(&s.handler)))
                .collect();
            subs.retain(|s| !s.once);
            if subs.is_empty() {
                topics.remove(topic);
            }
            fired
        };

        for (id, handler) in &fired {
            match catch_unwind(AssertUnwindSafe(|| handler(&payload))) {
                Ok(HandlerAction::Keep) => {}
                Ok(HandlerAction::Remove) => {
                    self.unsubscribe(topic, *id);
                }
                Err(_) => {
                    tracing::warn!(topic, subscription = id, "event handler panicked, removing");
                    self.unsubscribe(topic, *id);
                }
            }
        }
        fired.len()
    }

    /// Number of handlers registered on `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    fn insert(&self, topic: String, once: bool, handler: Handler) -> SubscriptionId {
        let id = self.inner.ids.next();
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic)
            .or_default()
            .push(Subscription { id, once, handler });
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn test_publish_without_handlers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("/nobody", json!(1)), 0);
        assert_eq!(bus.handler_count("/nobody"), 0);
    }

    #[test]
    fn test_persistent_handler_sees_every_publish() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe("/tick", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            HandlerAction::Keep
        });

        bus.publish("/tick", json!(null));
        bus.publish("/tick", json!(null));
        bus.publish("/other", json!(null));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bus.handler_count("/tick"), 1);
    }

    #[test]
    fn test_once_handler_fires_once_and_detaches() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.subscribe_once("/x", move |p| s.lock().unwrap().push(p.clone()));

        assert_eq!(bus.publish("/x", json!(1)), 1);
        assert_eq!(bus.publish("/x", json!(2)), 0);

        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
        assert_eq!(bus.handler_count("/x"), 0);
    }

    #[test]
    fn test_handler_can_remove_itself() {
        let bus = EventBus::new();
        bus.subscribe("/sync", |p| {
            if p["id"] == json!(3) {
                HandlerAction::Remove
            } else {
                HandlerAction::Keep
            }
        });

        bus.publish("/sync", json!({"id": 1}));
        assert_eq!(bus.handler_count("/sync"), 1);
        bus.publish("/sync", json!({"id": 3}));
        assert_eq!(bus.handler_count("/sync"), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe("/t", |_| HandlerAction::Keep);
        assert!(bus.unsubscribe("/t", id));
        assert!(!bus.unsubscribe("/t", id));
        assert_eq!(bus.publish("/t", json!(null)), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("/p", |_| panic!("handler bug"));
        let h = Arc::clone(&hits);
        bus.subscribe("/p", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            HandlerAction::Keep
        });

        assert_eq!(bus.publish("/p", json!(null)), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count("/p"), 1);
    }
}
