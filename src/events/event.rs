//! # Topics and payloads published on the [`EventBus`](super::EventBus).
//!
//! The bus itself is untyped (JSON payloads); this module pins down the topic
//! names the runtime uses and the shape of the payloads it publishes.
//!
//! | Topic                         | Payload             | Published by                         |
//! |-------------------------------|---------------------|--------------------------------------|
//! | `/spider_thread_sync/<id>`    | [`SyncPayload`]     | `Ctx::sync`                          |
//! | `/sync`                       | [`SyncReply`]       | `Command::Sync`                      |
//! | `/job-join`                   | [`JobEvent`]        | job driver after the subtree joined  |
//! | `/job-completed`              | [`JobEvent`]        | job driver, `stop_job`               |

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::bus::Payload;
use crate::core::VirtualTime;
use crate::jobs::JobId;

/// Prefix of every rendezvous topic.
pub const SYNC_TOPIC_PREFIX: &str = "/spider_thread_sync/";

/// Replies to synchronous message commands.
pub const SYNC_REPLY_TOPIC: &str = "/sync";

/// A job's body returned and its whole subtree has stopped.
pub const JOB_JOIN_TOPIC: &str = "/job-join";

/// A job finished, failed or was stopped.
pub const JOB_COMPLETED_TOPIC: &str = "/job-completed";

/// Topic of the rendezvous named `id`.
pub fn sync_topic(id: impl Display) -> String {
    format!("{SYNC_TOPIC_PREFIX}{id}")
}

/// Payload of the job lifecycle topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Job the notification is about.
    pub id: JobId,
}

impl JobEvent {
    /// Encodes the event as a bus payload.
    pub fn to_payload(self) -> Payload {
        json!({ "id": self.id })
    }
}

/// Value handed from `sync` to `wait`, together with the syncing context's
/// logical time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    /// Virtual time of the publisher at the moment of `sync`.
    pub time: VirtualTime,
    /// Exchanged value.
    #[serde(default)]
    pub val: serde_json::Value,
}

impl SyncPayload {
    /// Encodes the payload for the bus.
    pub fn to_payload(&self) -> Payload {
        json!({ "time": u64::from(self.time), "val": self.val })
    }

    /// Decodes a payload received from the bus.
    pub fn from_payload(payload: Payload) -> serde_json::Result<Self> {
        serde_json::from_value(payload)
    }
}

/// Reply to a synchronous message command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReply {
    /// Id the command was issued with.
    pub id: u64,
    /// Reply value.
    #[serde(default)]
    pub result: serde_json::Value,
}

impl SyncReply {
    /// Encodes the reply for the bus.
    pub fn to_payload(&self) -> Payload {
        json!({ "id": self.id, "result": self.result })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_sync_topic_name() {
        assert_eq!(sync_topic("x"), "/spider_thread_sync/x");
        assert_eq!(sync_topic(7), "/spider_thread_sync/7");
    }

    #[test]
    fn test_sync_payload_keeps_exact_time() {
        let sent = SyncPayload {
            time: VirtualTime::from(Duration::new(12, 345_678_901)),
            val: json!({"note": 60}),
        };
        let back = SyncPayload::from_payload(sent.to_payload()).unwrap();
        assert_eq!(back, sent);
    }

    #[test]
    fn test_sync_payload_rejects_missing_time() {
        assert!(SyncPayload::from_payload(json!({"val": 1})).is_err());
    }
}
