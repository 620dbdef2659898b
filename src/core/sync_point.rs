//! # Rendezvous on the event bus.
//!
//! `wait(id)` subscribes a one-shot handler on `/spider_thread_sync/<id>`
//! and blocks until a payload arrives. `sync(id, val)` publishes
//! `{time, val}` on the same topic.
//!
//! Sync is lossy by design: a sync with no waiter subscribed at that instant
//! is dropped, and every waiter subscribed at that instant is released by it.
//!
//! ## Rules
//! - A waiter that is killed (or whose future is dropped) leaves no handler
//!   behind: the [`Unsubscribe`] guard removes it.
//! - Payloads that are not `{time, val}` are ignored and the waiter keeps
//!   waiting.

use std::fmt::Display;

use serde_json::Value;

use crate::core::clock::VirtualTime;
use crate::events::{EventBus, Payload, SubscriptionId, SyncPayload, sync_topic};
use crate::promise::Promise;

/// Removes a subscription when dropped. Harmless if the handler already
/// detached itself.
pub(crate) struct Unsubscribe<'a> {
    bus: &'a EventBus,
    topic: String,
    id: SubscriptionId,
}

impl<'a> Unsubscribe<'a> {
    pub(crate) fn new(bus: &'a EventBus, topic: impl Into<String>, id: SubscriptionId) -> Self {
        Self {
            bus,
            topic: topic.into(),
            id,
        }
    }
}

impl Drop for Unsubscribe<'_> {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.id);
    }
}

/// Publishes a rendezvous signal. Returns the number of released waiters.
pub(crate) fn sync(bus: &EventBus, id: impl Display, time: VirtualTime, val: Value) -> usize {
    let topic = sync_topic(id);
    let released = bus.publish(&topic, SyncPayload { time, val }.to_payload());
    if released == 0 {
        tracing::trace!(%topic, "sync with no waiter dropped");
    }
    released
}

/// Blocks until a rendezvous signal for `id` arrives.
pub(crate) async fn wait(bus: &EventBus, id: impl Display) -> SyncPayload {
    let topic = sync_topic(id);
    loop {
        let payload = next_payload(bus, &topic).await;
        match SyncPayload::from_payload(payload) {
            Ok(signal) => return signal,
            Err(e) => tracing::warn!(%topic, error = %e, "ignoring malformed sync payload"),
        }
    }
}

async fn next_payload(bus: &EventBus, topic: &str) -> Payload {
    let slot: Promise<Payload> = Promise::new();
    let fill = slot.clone();
    let id = bus.subscribe_once(topic, move |payload| {
        let _ = fill.deliver(payload.clone());
    });
    let _unsubscribe = Unsubscribe::new(bus, topic, id);
    slot.get().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_sync_without_waiter_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(sync(&bus, "x", VirtualTime::ZERO, json!(1)), 0);
        assert_eq!(bus.handler_count(&sync_topic("x")), 0);
    }

    #[tokio::test]
    async fn test_wait_receives_time_and_value() {
        let bus = EventBus::new();
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { wait(&bus, "beat").await })
        };
        while bus.handler_count(&sync_topic("beat")) == 0 {
            tokio::task::yield_now().await;
        }

        let t = VirtualTime::from(Duration::from_millis(1500));
        assert_eq!(sync(&bus, "beat", t, json!({"n": 4})), 1);

        let got = waiter.await.unwrap();
        assert_eq!(got.time, t);
        assert_eq!(got.val, json!({"n": 4}));
        assert_eq!(bus.handler_count(&sync_topic("beat")), 0);
    }

    #[tokio::test]
    async fn test_dropped_waiter_unsubscribes() {
        let bus = EventBus::new();
        let res = tokio::time::timeout(Duration::from_millis(10), wait(&bus, "gone")).await;
        assert!(res.is_err());
        assert_eq!(bus.handler_count(&sync_topic("gone")), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_keeps_waiting() {
        let bus = EventBus::new();
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { wait(&bus, 7).await })
        };
        let topic = sync_topic(7);
        while bus.handler_count(&topic) == 0 {
            tokio::task::yield_now().await;
        }
        bus.publish(&topic, json!("garbage"));
        while bus.handler_count(&topic) == 0 {
            tokio::task::yield_now().await;
        }
        sync(&bus, 7, VirtualTime::ZERO, json!(true));

        assert_eq!(waiter.await.unwrap().val, json!(true));
    }
}
