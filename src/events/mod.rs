//! Runtime events: topic-keyed bus and the payloads carried on it.
//!
//! This module groups the **bus** used to publish/subscribe JSON payloads by
//! topic and the **data model** of the topics the runtime itself publishes.
//!
//! ## Contents
//! - [`EventBus`] synchronous topic router with persistent and one-shot handlers
//! - [`SyncPayload`], [`SyncReply`], [`JobEvent`] payload shapes
//!
//! ## Quick reference
//! - **Publishers**: `Ctx::sync`, the job driver, `Scheduler` (`sync` command,
//!   stops).
//! - **Consumers**: `Ctx::wait` (one-shot), `Ctx::sync_msg_command`
//!   (self-removing persistent handler), user code via `Scheduler::bus`.

mod bus;
mod event;

pub use bus::{EventBus, HandlerAction, Payload, SubscriptionId};
pub use event::{
    JOB_COMPLETED_TOPIC, JOB_JOIN_TOPIC, JobEvent, SYNC_REPLY_TOPIC, SYNC_TOPIC_PREFIX, SyncPayload,
    SyncReply, sync_topic,
};
