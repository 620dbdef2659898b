//! # Inbound commands.
//!
//! The runtime accepts already-decoded command objects. Each one carries a
//! `cmd` field naming its kind plus kind-specific fields:
//!
//! | `cmd`       | fields                     | effect                                   |
//! |-------------|----------------------------|------------------------------------------|
//! | `run-code`  | `val` (code), `info`       | evaluate and submit a job                |
//! | `stop-jobs` |                            | stop every running job                   |
//! | `stop-job`  | `val` (job id)             | stop one job                             |
//! | `event`     | `type`, `val`              | push onto the inbound event queue        |
//! | `sync`      | `val` (sync id), `result`  | answer a synchronous message command     |
//! | `reload`    |                            | ask the evaluator to reload              |
//! | `exit`      |                            | shut the runtime down                    |
//!
//! Anything else is rejected with [`ProtocolError`] before it can touch the
//! scheduler.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::jobs::{JobId, JobInfo};

/// External event forwarded to the inbound event queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Event kind, e.g. `keypress`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event data.
    #[serde(default)]
    pub val: serde_json::Value,
}

/// Closed set of commands understood by [`Scheduler::dispatch`](crate::Scheduler::dispatch).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum Command {
    /// Evaluate `val` and run it as a new job.
    RunCode {
        val: String,
        #[serde(default)]
        info: JobInfo,
    },
    /// Stop all jobs.
    StopJobs,
    /// Stop job `val`.
    StopJob { val: JobId },
    /// Forward an external event.
    Event(InboundEvent),
    /// Reply `result` to synchronous message command `val`.
    Sync {
        val: u64,
        #[serde(default)]
        result: serde_json::Value,
    },
    /// Reload the evaluator.
    Reload,
    /// Shut down.
    Exit,
}

impl Command {
    /// Every accepted `cmd` value.
    pub const NAMES: [&'static str; 7] = [
        "run-code",
        "stop-jobs",
        "stop-job",
        "event",
        "sync",
        "reload",
        "exit",
    ];

    /// Decodes a command object.
    ///
    /// # Example
    /// ```
    /// use jobvisor::{Command, ProtocolError};
    /// use serde_json::json;
    ///
    /// let cmd = Command::from_json(json!({"cmd": "stop-job", "val": 4})).unwrap();
    /// assert_eq!(cmd, Command::StopJob { val: 4 });
    ///
    /// let err = Command::from_json(json!({"cmd": "dance"})).unwrap_err();
    /// assert!(matches!(err, ProtocolError::UnknownCommand { .. }));
    /// ```
    pub fn from_json(value: serde_json::Value) -> Result<Self, ProtocolError> {
        let cmd = value
            .get("cmd")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingCommand)?
            .to_owned();

        if !Self::NAMES.contains(&cmd.as_str()) {
            return Err(ProtocolError::UnknownCommand { cmd });
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            cmd,
            reason: e.to_string(),
        })
    }

    /// The `cmd` value of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::RunCode { .. } => "run-code",
            Command::StopJobs => "stop-jobs",
            Command::StopJob { .. } => "stop-job",
            Command::Event(_) => "event",
            Command::Sync { .. } => "sync",
            Command::Reload => "reload",
            Command::Exit => "exit",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_run_code() {
        let cmd = Command::from_json(json!({
            "cmd": "run-code",
            "val": "loop_drums",
            "info": {"workspace": 2}
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::RunCode {
                val: "loop_drums".into(),
                info: json!({"workspace": 2})
            }
        );
    }

    #[test]
    fn test_decode_unit_commands() {
        assert_eq!(
            Command::from_json(json!({"cmd": "stop-jobs"})).unwrap(),
            Command::StopJobs
        );
        assert_eq!(
            Command::from_json(json!({"cmd": "reload"})).unwrap(),
            Command::Reload
        );
        assert_eq!(Command::from_json(json!({"cmd": "exit"})).unwrap(), Command::Exit);
    }

    #[test]
    fn test_decode_event_keeps_payload() {
        let cmd = Command::from_json(json!({"cmd": "event", "type": "keypress", "val": "a"})).unwrap();
        assert_eq!(
            cmd,
            Command::Event(InboundEvent {
                kind: "keypress".into(),
                val: json!("a")
            })
        );
    }

    #[test]
    fn test_decode_sync_reply() {
        let cmd = Command::from_json(json!({"cmd": "sync", "val": 9, "result": [1, 2]})).unwrap();
        assert_eq!(
            cmd,
            Command::Sync {
                val: 9,
                result: json!([1, 2])
            }
        );
    }

    #[test]
    fn test_missing_cmd() {
        let err = Command::from_json(json!({"val": 1})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingCommand));
    }

    #[test]
    fn test_unknown_cmd() {
        let err = Command::from_json(json!({"cmd": "fly"})).unwrap_err();
        match err {
            ProtocolError::UnknownCommand { cmd } => assert_eq!(cmd, "fly"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_known_cmd() {
        let err = Command::from_json(json!({"cmd": "stop-job", "val": "not-a-number"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref cmd, .. } if cmd == "stop-job"));
    }

    #[test]
    fn test_names_match_variants() {
        for name in Command::NAMES {
            let mut obj = json!({"cmd": name});
            match name {
                "run-code" => obj["val"] = json!("x"),
                "stop-job" | "sync" => obj["val"] = json!(1),
                "event" => obj["type"] = json!("keypress"),
                _ => {}
            }
            assert_eq!(Command::from_json(obj).unwrap().name(), name);
        }
    }
}
