//! # Inbound event dispatch.
//!
//! `event` commands are queued and handled one at a time by a dedicated task,
//! so a slow handler never blocks command dispatch.
//!
//! ```text
//! dispatch(event) ─► queue ─► listener ─┬─► keypress → installed handler
//!                                       └─► other    → "Unknown event: ..."
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::InboundEvent;
use crate::core::runtime::Runtime;

/// Starts the listener task. It runs until the queue closes or it is aborted.
pub(crate) fn spawn_listener(
    rt: Arc<Runtime>,
    mut rx: mpsc::UnboundedReceiver<InboundEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handle_event(&rt, event);
        }
        tracing::debug!("inbound event queue closed");
    })
}

fn handle_event(rt: &Runtime, event: InboundEvent) {
    match event.kind.as_str() {
        "keypress" => match rt.keypress_handler() {
            Some(handler) => {
                if catch_unwind(AssertUnwindSafe(|| handler(&event.val))).is_err() {
                    tracing::warn!("keypress handler panicked");
                }
            }
            None => tracing::debug!("keypress with no handler installed"),
        },
        _ => {
            let shown = serde_json::to_string(&event).unwrap_or_else(|_| event.kind.clone());
            tracing::debug!(kind = %event.kind, "unknown inbound event");
            rt.outbox.message(format!("Unknown event: {shown}"), None, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::core::config::Config;
    use crate::message::{Message, Outbox};

    #[test]
    fn test_keypress_calls_handler() {
        let (out, _rx) = Outbox::channel();
        let rt = Runtime::new(Config::default(), out, None);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        rt.set_keypress_handler(Arc::new(move |val: &serde_json::Value| {
            assert_eq!(val, &json!("a"));
            h.fetch_add(1, Ordering::SeqCst);
        }));

        handle_event(
            &rt,
            InboundEvent {
                kind: "keypress".into(),
                val: json!("a"),
            },
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_event_is_reported() {
        let (out, mut rx) = Outbox::channel();
        let rt = Runtime::new(Config::default(), out, None);

        handle_event(
            &rt,
            InboundEvent {
                kind: "mouse".into(),
                val: json!(1),
            },
        );
        match rx.try_recv().unwrap() {
            Message::Message { val, job_id, .. } => {
                assert!(val.starts_with("Unknown event: "));
                assert!(val.contains("mouse"));
                assert_eq!(job_id, None);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
