//! Error types used by the jobvisor runtime and job bodies.
//!
//! This module defines the runtime's own error enums:
//!
//! - [`ProtocolError`] — a command object that cannot be dispatched.
//! - [`PromiseError`] — misuse of a [`Promise`](crate::Promise).
//!
//! Job bodies return [`anyhow::Result`]; a failed body is turned into a
//! [`JobFailure`] (message + backtrace) at the job boundary and reported on the
//! outbound channel instead of being propagated.
//!
//! Both enums provide `as_label` for logs and the same snake_case labels are
//! used in `tracing` fields.

use std::any::Any;
use std::backtrace::BacktraceStatus;

use thiserror::Error;

/// # Errors produced while decoding or dispatching a command.
///
/// A protocol error is fatal to the single dispatch call that produced it and
/// never touches scheduler state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The command object has no string `cmd` field.
    #[error("command has no `cmd` field")]
    MissingCommand,

    /// The `cmd` field names a command kind the runtime does not know.
    #[error("unknown command: {cmd}")]
    UnknownCommand {
        /// The offending command name.
        cmd: String,
    },

    /// The command kind is known but its fields do not decode.
    #[error("malformed `{cmd}` command: {reason}")]
    Malformed {
        /// The command name.
        cmd: String,
        /// Decoder message.
        reason: String,
    },
}

impl ProtocolError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use jobvisor::ProtocolError;
    ///
    /// let err = ProtocolError::UnknownCommand { cmd: "dance".into() };
    /// assert_eq!(err.as_label(), "protocol_unknown_command");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::MissingCommand => "protocol_missing_command",
            ProtocolError::UnknownCommand { .. } => "protocol_unknown_command",
            ProtocolError::Malformed { .. } => "protocol_malformed",
        }
    }
}

/// # Errors produced by [`Promise`](crate::Promise).
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseError {
    /// `deliver` was called on a promise that already holds a value.
    ///
    /// The first value is kept; the second one is discarded.
    #[error("promise already delivered")]
    AlreadyDelivered,
}

impl PromiseError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PromiseError::AlreadyDelivered => "promise_already_delivered",
        }
    }
}

/// Error report for a job body that failed or panicked.
///
/// Carries exactly what ends up in the outbound `error` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Human-readable description, including the `anyhow` context chain.
    pub message: String,
    /// Stack trace lines (or the cause chain when no backtrace was captured).
    pub backtrace: Vec<String>,
}

impl JobFailure {
    /// Builds a report from an error returned by a job body.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let bt = err.backtrace();
        let backtrace = match bt.status() {
            BacktraceStatus::Captured => bt.to_string().lines().map(str::to_owned).collect(),
            _ => err
                .chain()
                .skip(1)
                .map(|cause| format!("caused by: {cause}"))
                .collect(),
        };
        Self {
            message: format!("{err:#}"),
            backtrace,
        }
    }

    /// Builds a report from a panic payload caught at the job boundary.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("panicked: {s}")
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("panicked: {s}")
        } else {
            "panicked".to_string()
        };
        Self {
            message,
            backtrace: Vec::new(),
        }
    }
}
