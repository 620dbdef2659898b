//! # Scheduler: top-level orchestration of jobs.
//!
//! The [`Scheduler`] is the entry point of the runtime. It accepts decoded
//! [`Command`]s (or the equivalent direct calls), starts and stops jobs, and
//! owns the inbound event task.
//!
//! ## High-level architecture
//! ```text
//! Inputs:
//!   Command (JSON) ──► dispatch_json ──► Command::from_json ──► dispatch
//!   direct calls   ──► submit / stop_job / stop_all_jobs / shutdown
//!                              │
//!                        [serializing gate]
//!                              │
//!   run-code  ──► Evaluate::evaluate ──► Runtime::submit ──► root context task
//!   stop-job  ──► Runtime::stop_job (kill threads, kill root, completed)
//!   stop-jobs ──► Runtime::stop_all_jobs
//!   event     ──► inbound queue ──► listener task (keypress handler)
//!   sync      ──► bus /sync {id, result} ──► Ctx::sync_msg_command waiter
//!   reload    ──► Evaluate::reload
//!   exit      ──► shutdown
//!
//! Outputs:
//!   Outbound channel: message / job / error / sync / exit
//! ```
//!
//! ## Rules
//! - At most one top-level operation runs at a time.
//! - Operations triggered from inside job bodies (`Ctx::stop_job`) bypass the
//!   gate, so a job stopping another job never waits behind a dispatch that
//!   waits for it.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Config, Ctx, JobAction, JobFn, Message, Scheduler};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (sched, mut out) = Scheduler::builder(Config::default()).build();
//!
//!     let job = JobFn::arc("hello", |ctx: Ctx| async move {
//!         ctx.message("hello");
//!         Ok(())
//!     });
//!     let id = sched.submit(job, json!({"workspace": 1})).await;
//!
//!     while let Some(msg) = out.recv().await {
//!         if let Message::Job { job_id, action: JobAction::Completed, .. } = msg {
//!             if job_id == id {
//!                 break;
//!             }
//!         }
//!     }
//!     sched.shutdown().await;
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::{Command, InboundEvent};
use crate::core::builder::SchedulerBuilder;
use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::core::registry::JobSummary;
use crate::core::runtime::Runtime;
use crate::error::ProtocolError;
use crate::events::{EventBus, SYNC_REPLY_TOPIC, SyncReply};
use crate::jobs::{JobId, JobInfo, JobRef};
use crate::message::Message;

/// What a dispatched command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// `run-code`: a job was submitted.
    Submitted(JobId),
    /// `stop-job`: `stopped` is false if the job was not live.
    Stopped { job: JobId, stopped: bool },
    /// `stop-jobs`.
    StoppedAll,
    /// `event`: queued for the listener.
    EventQueued,
    /// `sync`: the reply was published to this many handlers.
    SyncReplied { handlers: usize },
    /// `reload`.
    Reloaded,
    /// `exit`: the scheduler shut down.
    Exited,
}

/// Job scheduler.
pub struct Scheduler {
    rt: Arc<Runtime>,
    gate: tokio::sync::Mutex<()>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cfg", &self.rt.cfg)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Returns a builder for a scheduler with `cfg`.
    pub fn builder(cfg: Config) -> SchedulerBuilder {
        SchedulerBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        rt: Arc<Runtime>,
        inbound: mpsc::UnboundedSender<InboundEvent>,
        listener: JoinHandle<()>,
    ) -> Self {
        Self {
            rt,
            gate: tokio::sync::Mutex::new(()),
            inbound,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Decodes and dispatches a command object.
    ///
    /// Decoding errors are returned before any state is touched.
    pub async fn dispatch_json(&self, value: serde_json::Value) -> Result<Dispatched, ProtocolError> {
        let cmd = Command::from_json(value).inspect_err(|e| {
            tracing::warn!(label = e.as_label(), error = %e, "command rejected");
        })?;
        Ok(self.dispatch(cmd).await)
    }

    /// Performs exactly one command.
    pub async fn dispatch(&self, cmd: Command) -> Dispatched {
        let _gate = self.gate.lock().await;
        tracing::debug!(cmd = cmd.name(), "dispatch");

        match cmd {
            Command::RunCode { val, info } => {
                Dispatched::Submitted(self.rt.submit_code(&val, info).await)
            }
            Command::StopJobs => {
                self.rt.stop_all_jobs().await;
                Dispatched::StoppedAll
            }
            Command::StopJob { val } => Dispatched::Stopped {
                job: val,
                stopped: self.rt.stop_job(val).await,
            },
            Command::Event(event) => {
                self.queue_event(event);
                Dispatched::EventQueued
            }
            Command::Sync { val, result } => Dispatched::SyncReplied {
                handlers: self.reply_sync(val, result),
            },
            Command::Reload => {
                self.rt.reload();
                Dispatched::Reloaded
            }
            Command::Exit => {
                self.shutdown_inner().await;
                Dispatched::Exited
            }
        }
    }

    /// Starts `job` and returns its id immediately.
    pub async fn submit(&self, job: JobRef, info: JobInfo) -> JobId {
        let _gate = self.gate.lock().await;
        self.rt.submit(job, info).await
    }

    /// Evaluates `code` with the configured evaluator and starts the result.
    pub async fn submit_code(&self, code: &str, info: JobInfo) -> JobId {
        let _gate = self.gate.lock().await;
        self.rt.submit_code(code, info).await
    }

    /// Stops job `id` and its whole thread tree. Returns `false` if the job
    /// was not live.
    pub async fn stop_job(&self, id: JobId) -> bool {
        let _gate = self.gate.lock().await;
        self.rt.stop_job(id).await
    }

    /// Stops every live job.
    pub async fn stop_all_jobs(&self) {
        let _gate = self.gate.lock().await;
        self.rt.stop_all_jobs().await;
    }

    /// Stops every job, sends the exit status and stops the inbound event
    /// task. Later calls only repeat the exit status.
    pub async fn shutdown(&self) {
        let _gate = self.gate.lock().await;
        self.shutdown_inner().await;
    }

    async fn shutdown_inner(&self) {
        self.rt.stop_all_jobs().await;
        self.rt.outbox.push(Message::Exit {
            job_id: None,
            job_info: None,
        });
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
        tracing::info!("scheduler shut down");
    }

    fn queue_event(&self, event: InboundEvent) {
        if self.inbound.send(event).is_err() {
            tracing::debug!("inbound listener gone, event dropped");
        }
    }

    fn reply_sync(&self, id: u64, result: serde_json::Value) -> usize {
        let handlers = self
            .rt
            .bus
            .publish(SYNC_REPLY_TOPIC, SyncReply { id, result }.to_payload());
        if handlers == 0 {
            tracing::debug!(sync = id, "sync reply with no waiter");
        }
        handlers
    }

    /// Summaries of live jobs, sorted by id.
    pub async fn jobs(&self) -> Vec<JobSummary> {
        self.rt.registry.summaries().await
    }

    /// Number of live non-root threads of `job`; `None` once the job's
    /// threads have been killed (or it never existed).
    pub fn tracked_threads(&self, job: JobId) -> Option<usize> {
        self.rt.hierarchy.tracked(job)
    }

    /// True if `job` is live.
    pub async fn is_running(&self, job: JobId) -> bool {
        self.rt.registry.contains(job).await
    }

    /// Event bus shared with every job.
    pub fn bus(&self) -> &EventBus {
        &self.rt.bus
    }

    /// Clock all virtual times are measured on.
    pub fn clock(&self) -> Clock {
        self.rt.clock
    }

    /// Configuration the scheduler was built with.
    pub fn config(&self) -> &Config {
        &self.rt.cfg
    }
}
