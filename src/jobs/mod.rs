//! # Job abstractions.
//!
//! This module provides the job-related types:
//! - [`Job`] - trait for job bodies run on a root [`Ctx`](crate::Ctx)
//! - [`JobFn`] - function-backed job implementation
//! - [`JobRef`] - shared reference to a job (`Arc<dyn Job>`)
//! - [`Evaluate`] / [`Programs`] - turning `run-code` text into a [`JobRef`]

mod evaluate;
mod job;
mod job_fn;

pub(crate) use evaluate::EvaluationFailed;
pub use evaluate::{Evaluate, Programs};
pub use job::{Job, JobId, JobInfo, JobRef};
pub use job_fn::JobFn;
