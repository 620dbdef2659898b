//! # Outbound status messages.
//!
//! Everything a presentation layer needs to know about running jobs flows
//! through one ordered queue of [`Message`] values. The serialized shape is
//! the wire format:
//!
//! ```text
//! {"type":"message","val":"...","jobId":3,"jobInfo":{...}}
//! {"type":"job","jobId":3,"action":"start","jobInfo":{...}}
//! {"type":"job","jobId":3,"action":"completed","jobInfo":{...}}
//! {"type":"error","val":"...","backtrace":["..."],"jobId":3,"jobInfo":{...}}
//! {"type":"exit","jobId":null,"jobInfo":null}
//! {"type":"sync","sync":5,"val":{...},"jobId":3,"jobInfo":{...}}
//! ```
//!
//! [`Outbox`] is the producing side; the receiving side ([`Outbound`]) is
//! handed to the caller when the scheduler is built.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::JobFailure;
use crate::jobs::{JobId, JobInfo};

/// Lifecycle step reported by a `job` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    /// The root context started evaluating the body.
    Start,
    /// The job finished, failed or was stopped.
    Completed,
}

/// One status object on the outbound channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    /// Free text for the user (prints, warnings, notices).
    Message {
        val: String,
        job_id: Option<JobId>,
        job_info: Option<JobInfo>,
    },
    /// Job lifecycle transition.
    Job {
        job_id: JobId,
        action: JobAction,
        job_info: JobInfo,
    },
    /// A job body failed.
    Error {
        val: String,
        backtrace: Vec<String>,
        job_id: JobId,
        job_info: JobInfo,
    },
    /// The runtime is shutting down.
    Exit {
        job_id: Option<JobId>,
        job_info: Option<JobInfo>,
    },
    /// A job waits for the consumer to answer with a `sync` command carrying
    /// the same `sync` id.
    Sync {
        sync: u64,
        val: serde_json::Value,
        job_id: Option<JobId>,
        job_info: Option<JobInfo>,
    },
}

/// Receiving side of the outbound channel.
pub type Outbound = mpsc::UnboundedReceiver<Message>;

/// Producing side of the outbound channel.
///
/// Pushing never blocks. Once the receiver is gone, messages are discarded.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbox {
    /// Creates a connected outbox/outbound pair.
    pub fn channel() -> (Self, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Appends a message to the queue.
    pub fn push(&self, msg: Message) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("outbound receiver dropped, message discarded");
        }
    }

    /// Free-text message, optionally tagged with a job.
    pub fn message(&self, val: impl Into<String>, job_id: Option<JobId>, job_info: Option<JobInfo>) {
        self.push(Message::Message {
            val: val.into(),
            job_id,
            job_info,
        });
    }

    /// `job`/`start` status.
    pub fn job_started(&self, job_id: JobId, job_info: JobInfo) {
        self.push(Message::Job {
            job_id,
            action: JobAction::Start,
            job_info,
        });
    }

    /// `job`/`completed` status.
    pub fn job_completed(&self, job_id: JobId, job_info: JobInfo) {
        self.push(Message::Job {
            job_id,
            action: JobAction::Completed,
            job_info,
        });
    }

    /// Error report for a failed job body.
    pub fn job_failed(&self, job_id: JobId, job_info: JobInfo, failure: JobFailure) {
        self.push(Message::Error {
            val: failure.message,
            backtrace: failure.backtrace,
            job_id,
            job_info,
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_shape_of_job_message() {
        let msg = Message::Job {
            job_id: 3,
            action: JobAction::Completed,
            job_info: json!({"workspace": 1}),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "job", "jobId": 3, "action": "completed", "jobInfo": {"workspace": 1}})
        );
    }

    #[test]
    fn test_wire_shape_of_error_message() {
        let msg = Message::Error {
            val: "boom".into(),
            backtrace: vec!["caused by: x".into()],
            job_id: 1,
            job_info: json!(null),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "error", "val": "boom", "backtrace": ["caused by: x"], "jobId": 1, "jobInfo": null})
        );
    }

    #[test]
    fn test_push_keeps_order() {
        let (outbox, mut rx) = Outbox::channel();
        outbox.message("a", None, None);
        outbox.job_started(1, json!({}));
        outbox.job_completed(1, json!({}));

        assert!(matches!(rx.try_recv(), Ok(Message::Message { .. })));
        assert!(matches!(
            rx.try_recv(),
            Ok(Message::Job { action: JobAction::Start, .. })
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(Message::Job { action: JobAction::Completed, .. })
        ));
    }

    #[test]
    fn test_push_after_receiver_dropped_is_silent() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        outbox.message("nobody listens", None, None);
    }
}
