//! # jobvisor
//!
//! **Jobvisor** is the job-execution and thread-orchestration core of a
//! live-coding runtime.
//!
//! User-submitted snippets ("jobs") run concurrently. Each job may spawn an
//! arbitrary tree of cooperating threads, and the runtime can:
//! - track every thread belonging to a job;
//! - stop a job together with its whole thread tree, leaving no zombies;
//! - give threads a shared logical clock that tolerates drift from real time;
//! - let unrelated threads rendezvous and exchange values through named
//!   sync points.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Command (JSON)      direct calls
//!        │                   │
//!        ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler (serializing gate)                                     │
//! │  - JobRegistry (live jobs → root context, info, state)            │
//! │  - ThreadHierarchy (job → live threads index)                     │
//! │  - EventBus (topic pub/sub: sync points, job events)              │
//! │  - Outbox (ordered outbound status messages)                      │
//! │  - inbound event listener (keypress, ...)                         │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ root ctx │       │ root ctx │       │ root ctx │   one per job
//!   │  job #0  │       │  job #1  │       │  job #2  │
//!   └┬────────┬┘       └────┬─────┘       └──────────┘
//!    ▼        ▼             ▼
//!  thread   thread        thread            in_thread
//!    │                      │
//!    ▼                      ▼
//!  thread ── wait("x") ◄── sync("x")        rendezvous via EventBus
//! ```
//!
//! ### Lifecycle
//! ```text
//! submit ──► id = Counter::next()
//!        ──► ThreadHierarchy::register_job(id)
//!        ──► JobRegistry::insert(id, root)
//!        ──► root task released
//!
//! root task:
//!   ├─► job/start
//!   ├─► body(ctx)
//!   │     ├─ Ok    ──► join descendants ──► /job-join
//!   │     └─ Err / panic ──► /job-join
//!   └─► registry.take(id)
//!         ├─ Some ──► kill threads ──► /job-completed, job/completed (+ error report)
//!         └─ None ──► stopped concurrently; the stopper tears it down
//! ```
//!
//! ## Features
//! | Area              | Description                                                | Key types / traits                        |
//! |-------------------|------------------------------------------------------------|-------------------------------------------|
//! | **Scheduling**    | Submit, stop and dispatch jobs.                            | [`Scheduler`], [`Command`], [`Dispatched`]|
//! | **Job bodies**    | Define jobs as functions or trait objects.                 | [`Job`], [`JobFn`], [`JobRef`], [`Ctx`]   |
//! | **Evaluation**    | Turn `run-code` text into a job.                           | [`Evaluate`], [`Programs`]                |
//! | **Logical time**  | Per-context virtual time with drift-tolerant sleep.        | [`VirtualTime`], [`Clock`], [`Advance`]   |
//! | **Rendezvous**    | `sync` / `wait` over the event bus.                        | [`EventBus`], [`Promise`]                 |
//! | **Messages**      | Ordered outbound status channel.                           | [`Message`], [`Outbound`]                 |
//! | **Errors**        | Typed errors for protocol and promise misuse.              | [`ProtocolError`], [`PromiseError`]       |
//! | **Configuration** | Centralize runtime settings.                               | [`Config`]                                |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use jobvisor::{Config, Ctx, JobFn, Scheduler};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (sched, _out) = Scheduler::builder(Config::default()).build();
//!
//!     let job = JobFn::arc("pulse", |mut ctx: Ctx| async move {
//!         let child = ctx.in_thread(|mut ctx: Ctx| async move {
//!             let v = ctx.wait("tick").await;
//!             ctx.message(format!("got {v}"));
//!             Ok(())
//!         });
//!         while !child.is_finished() {
//!             ctx.sleep(Duration::from_millis(10)).await;
//!             ctx.sync("tick", json!(1)).await;
//!         }
//!         Ok(())
//!     });
//!
//!     let id = sched.submit(job, json!(null)).await;
//!     while sched.is_running(id).await {
//!         tokio::time::sleep(Duration::from_millis(5)).await;
//!     }
//!     sched.shutdown().await;
//! }
//! ```

mod command;
mod core;
mod counter;
mod error;
mod events;
mod jobs;
mod message;
mod promise;

// ---- Public re-exports ----

pub use command::{Command, InboundEvent};
pub use crate::core::{
    Advance, Clock, Config, ContextId, Ctx, Dispatched, JobState, JobSummary, KeypressHandler,
    Scheduler, SchedulerBuilder, ThreadHandle, VirtualTime,
};
pub use counter::Counter;
pub use error::{JobFailure, PromiseError, ProtocolError};
pub use events::{
    EventBus, HandlerAction, JOB_COMPLETED_TOPIC, JOB_JOIN_TOPIC, JobEvent, Payload,
    SYNC_REPLY_TOPIC, SYNC_TOPIC_PREFIX, SubscriptionId, SyncPayload, SyncReply, sync_topic,
};
pub use jobs::{Evaluate, Job, JobFn, JobId, JobInfo, JobRef, Programs};
pub use message::{JobAction, Message, Outbound, Outbox};
pub use promise::Promise;
