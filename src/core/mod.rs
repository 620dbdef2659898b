//! Runtime core: execution contexts, job lifecycle and orchestration.
//!
//! The public API from this module is [`Scheduler`] (with its builder and
//! [`Config`]) and the job-side [`Ctx`].
//!
//! Internal modules:
//! - [`context`]: shared, killable state of one execution context;
//! - [`hierarchy`]: job → threads index, spawn/kill/join protocols;
//! - [`clock`]: virtual time and drift-tolerant sleep;
//! - [`sync_point`]: named rendezvous over the event bus;
//! - [`registry`]: live jobs and their root contexts;
//! - [`runner`]: drives one job from start to completion;
//! - [`runtime`]: state shared by the scheduler and all contexts;
//! - [`inbound`]: inbound event queue listener;
//! - [`scheduler`]: top-level command dispatch.

mod builder;
mod clock;
mod config;
mod context;
mod ctx;
mod hierarchy;
mod inbound;
mod registry;
mod runner;
mod runtime;
mod scheduler;
mod sync_point;

pub use builder::SchedulerBuilder;
pub use clock::{Advance, Clock, VirtualTime};
pub use config::Config;
pub use context::{ContextId, ThreadHandle};
pub use ctx::Ctx;
pub use registry::{JobState, JobSummary};
pub use runtime::KeypressHandler;
pub use scheduler::{Dispatched, Scheduler};
