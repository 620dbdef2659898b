//! # Drive one job from start to completion.
//!
//! Runs the body of a job on its root context and performs the completion
//! bookkeeping.
//!
//! ## Flow
//!
//! ```text
//! Success:
//!   job/start → body → Ok(()) → join descendants → /job-join
//!             → take(id) → kill leftover threads → /job-completed → job/completed
//!
//! Failure (error or panic):
//!   job/start → body → Err / panic → /job-join → take(id) → kill threads
//!             → /job-completed → job/completed → error report
//!
//! Stopped:
//!   root aborted at its next suspension point; the stopper emits the
//!   completion messages instead
//! ```
//!
//! ## Rules
//! - Whoever wins `registry.take(id)` owns teardown: it kills the threads and
//!   emits `/job-completed` and `job/completed`. The other side does nothing,
//!   so a job completes exactly once and teardown is never cut short
//! - `/job-join` is published by the driver whenever the body returned
//! - Panics in the body are reported like errors

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::core::ctx::Ctx;
use crate::core::hierarchy::ThreadHierarchy;
use crate::core::registry::JobState;
use crate::core::runtime::Runtime;
use crate::error::JobFailure;
use crate::events::{JOB_COMPLETED_TOPIC, JOB_JOIN_TOPIC, JobEvent};
use crate::jobs::{JobId, JobInfo, JobRef};

/// Runs `job` on the root context `ctx` and completes it.
///
/// ### Failure semantics
/// - `Err(e)` from the body → error report with the cause chain / backtrace
/// - panic in the body → error report `panicked: <message>`
/// - descendants are never joined after a failure; they are killed
pub(crate) async fn drive(rt: Arc<Runtime>, job: JobRef, ctx: Ctx) {
    let id = ctx.job_id();
    let info = ctx.info().clone();
    let root = ctx.handle();

    rt.outbox.job_started(id, info.clone());
    rt.registry.set_state(id, JobState::Running).await;
    tracing::info!(job = id, name = job.name(), "job started");

    let outcome = AssertUnwindSafe(async move { job.run(ctx).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            rt.registry.set_state(id, JobState::JoiningChildren).await;
            ThreadHierarchy::join_descendants(&root).await;
            publish_joined(&rt, id);
            finish(&rt, id, info, None).await;
        }
        Ok(Err(e)) => {
            tracing::warn!(job = id, error = %format!("{e:#}"), "job failed");
            publish_joined(&rt, id);
            finish(&rt, id, info, Some(JobFailure::from_error(&e))).await;
        }
        Err(panic) => {
            let failure = JobFailure::from_panic(panic);
            tracing::warn!(job = id, error = %failure.message, "job panicked");
            publish_joined(&rt, id);
            finish(&rt, id, info, Some(failure)).await;
        }
    }
}

/// If this driver still owns the job, kills leftover threads and emits the
/// completion messages.
async fn finish(rt: &Runtime, id: JobId, info: JobInfo, failure: Option<JobFailure>) {
    if rt.registry.take(id).await.is_none() {
        tracing::debug!(job = id, "job already stopped; teardown left to the stopper");
        return;
    }
    rt.hierarchy.kill_job(id, rt.cfg.kill_grace()).await;

    rt.bus.publish(JOB_COMPLETED_TOPIC, JobEvent { id }.to_payload());
    rt.outbox.job_completed(id, info.clone());
    match failure {
        None => tracing::info!(job = id, "job completed"),
        Some(failure) => rt.outbox.job_failed(id, info, failure),
    }
}

fn publish_joined(rt: &Runtime, id: JobId) {
    rt.bus.publish(JOB_JOIN_TOPIC, JobEvent { id }.to_payload());
}

/// Reports the outcome of a non-root thread body.
///
/// A failing thread does not fail its job; the error is reported for the
/// job and the job carries on.
pub(crate) fn report_thread(
    rt: &Runtime,
    job: JobId,
    info: &JobInfo,
    outcome: std::thread::Result<anyhow::Result<()>>,
) {
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => JobFailure::from_error(&e),
        Err(panic) => JobFailure::from_panic(panic),
    };
    tracing::warn!(job, error = %failure.message, "thread failed");
    rt.outbox.job_failed(job, info.clone(), failure);
}
