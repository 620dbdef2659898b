//! # Job capability surface.
//!
//! A [`Ctx`] is handed to every job body and every thread body. It owns the
//! context's inherited state (virtual time, job id, job info) and exposes the
//! operations a body may perform:
//!
//! | operation              | effect                                              |
//! |------------------------|-----------------------------------------------------|
//! | [`Ctx::in_thread`]     | spawn a child context in the same job               |
//! | [`Ctx::sleep`]         | advance virtual time, drift tolerant                |
//! | [`Ctx::sync`]          | release waiters of a rendezvous id                  |
//! | [`Ctx::wait`]          | block for a rendezvous, adopt the syncer's time     |
//! | [`Ctx::no_kill`]       | run a block that a kill cannot interrupt            |
//! | [`Ctx::message`]       | user-visible text on the outbound channel           |
//! | [`Ctx::rand`]          | sample the shared seeded generator                  |
//! | [`Ctx::sync_msg_command`] | ask the consumer and wait for its reply          |
//! | [`Ctx::on_keypress`]   | install the keypress event handler                  |
//! | [`Ctx::stop_job`]      | stop a job (possibly this one)                      |
//!
//! A child spawned with `in_thread` starts with a copy of its parent's state
//! at the moment of the call.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use crate::core::clock::{Advance, VirtualTime};
use crate::core::context::{ContextHandle, ContextId, ThreadHandle};
use crate::core::runner;
use crate::core::runtime::Runtime;
use crate::core::sync_point::{self, Unsubscribe};
use crate::events::{EventBus, HandlerAction, SYNC_REPLY_TOPIC, SyncReply};
use crate::jobs::{JobId, JobInfo};
use crate::message::Message;
use crate::promise::Promise;

/// Execution context of a job body or thread body.
pub struct Ctx {
    rt: Arc<Runtime>,
    handle: Arc<ContextHandle>,
    time: VirtualTime,
    info: JobInfo,
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("job_id", &self.handle.job_id())
            .field("thread_id", &self.handle.id())
            .field("time", &self.time)
            .finish()
    }
}

impl Ctx {
    pub(crate) fn new(
        rt: Arc<Runtime>,
        handle: Arc<ContextHandle>,
        time: VirtualTime,
        info: JobInfo,
    ) -> Self {
        Self {
            rt,
            handle,
            time,
            info,
        }
    }

    pub(crate) fn handle(&self) -> Arc<ContextHandle> {
        Arc::clone(&self.handle)
    }

    /// Id of the job this context belongs to.
    pub fn job_id(&self) -> JobId {
        self.handle.job_id()
    }

    /// Id of this context.
    pub fn thread_id(&self) -> ContextId {
        self.handle.id()
    }

    /// Opaque info the job was submitted with.
    pub fn info(&self) -> &JobInfo {
        &self.info
    }

    /// Current virtual time of this context.
    pub fn time(&self) -> VirtualTime {
        self.time
    }

    /// Event bus shared by the whole scheduler.
    pub fn bus(&self) -> &EventBus {
        &self.rt.bus
    }

    /// Spawns `body` as a child context of this one.
    ///
    /// The child inherits this context's virtual time and job info. It runs
    /// only if its job is still live at the moment of registration; otherwise
    /// the returned handle is already (or soon) finished and `body` is never
    /// called.
    ///
    /// An error or panic in `body` is reported for the job; it does not fail
    /// the job.
    pub fn in_thread<F, Fut>(&self, body: F) -> ThreadHandle
    where
        F: FnOnce(Ctx) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let child = ContextHandle::new(self.rt.next_context_id(), self.job_id());
        let child_ctx = Ctx::new(
            Arc::clone(&self.rt),
            Arc::clone(&child),
            self.time,
            self.info.clone(),
        );
        let rt = Arc::clone(&self.rt);

        self.rt
            .hierarchy
            .spawn(&self.handle, Arc::clone(&child), move || async move {
                let job = child_ctx.job_id();
                let info = child_ctx.info.clone();
                let outcome = AssertUnwindSafe(async move { body(child_ctx).await })
                    .catch_unwind()
                    .await;
                runner::report_thread(&rt, job, &info, outcome);
            });

        ThreadHandle::new(child)
    }

    /// Advances virtual time by `d`, sleeping until `time + d` on the real
    /// clock.
    ///
    /// When that target is already in the past no sleep happens and (if
    /// enabled) the drift message is sent for this job. Virtual time moves by
    /// exactly `d` either way. A zero duration is a no-op.
    pub async fn sleep(&mut self, d: Duration) -> Advance {
        let outcome = self.rt.clock.advance(&mut self.time, d).await;
        if let Advance::Behind { lag } = outcome {
            tracing::debug!(job = self.job_id(), ?lag, "context behind real time");
            if self.rt.cfg.warn_on_drift {
                self.message(self.rt.cfg.drift_message.as_ref());
            }
        }
        outcome
    }

    /// [`sleep`](Self::sleep) taking seconds. Negative or non-finite values
    /// sleep zero.
    pub async fn sleep_secs(&mut self, secs: f64) -> Advance {
        let d = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
        self.sleep(d).await
    }

    /// Releases every context currently waiting on `id`, handing them `val`
    /// and this context's virtual time.
    ///
    /// Returns the number of released waiters. With no waiter the signal is
    /// dropped. Runs inside a no-kill block so a kill never splits it.
    pub async fn sync(&self, id: impl Display, val: Value) -> usize {
        let _guard = self.handle.enter_no_kill().await;
        sync_point::sync(&self.rt.bus, id, self.time, val)
    }

    /// Blocks until another context syncs on `id`, adopts its virtual time and
    /// returns its value.
    pub async fn wait(&mut self, id: impl Display) -> Value {
        let signal = sync_point::wait(&self.rt.bus, id).await;
        self.time = signal.time;
        signal.val
    }

    /// Runs `block` so that a kill of this context waits for it to finish.
    ///
    /// If this context has already been killed the block never runs and the
    /// call never returns.
    pub async fn no_kill<F, Fut, T>(&self, block: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.handle.enter_no_kill().await;
        block().await
    }

    /// Sends `val` to the outbound channel tagged with this job.
    pub fn message(&self, val: impl Display) {
        self.rt
            .outbox
            .message(val.to_string(), Some(self.job_id()), Some(self.info.clone()));
    }

    /// Uniform sample in `[0, limit)` from the scheduler's seeded generator.
    pub fn rand(&self, limit: f64) -> f64 {
        self.rt.rand(limit)
    }

    /// Sends a `sync` message to the consumer and waits for the `sync`
    /// command answering it; returns the reply's `result`.
    pub async fn sync_msg_command(&self, val: Value) -> Value {
        let id = self.rt.sync_ids.next();
        let reply: Promise<Value> = Promise::new();
        let fill = reply.clone();

        let sub = self.rt.bus.subscribe(SYNC_REPLY_TOPIC, move |payload| {
            match serde_json::from_value::<SyncReply>(payload.clone()) {
                Ok(r) if r.id == id => {
                    let _ = fill.deliver(r.result);
                    HandlerAction::Remove
                }
                _ => HandlerAction::Keep,
            }
        });
        let _unsubscribe = Unsubscribe::new(&self.rt.bus, SYNC_REPLY_TOPIC, sub);

        self.rt.outbox.push(Message::Sync {
            sync: id,
            val,
            job_id: Some(self.job_id()),
            job_info: Some(self.info.clone()),
        });
        reply.get().await
    }

    /// Installs the handler for inbound `keypress` events, replacing any
    /// previous one.
    pub fn on_keypress<F>(&self, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.rt.set_keypress_handler(Arc::new(handler));
    }

    /// Stops job `id`. Returns `false` if it was not live.
    ///
    /// The stop runs on its own task, so a job may stop itself; in that case
    /// this call does not return.
    pub async fn stop_job(&self, id: JobId) -> bool {
        let rt = Arc::clone(&self.rt);
        match tokio::spawn(async move { rt.stop_job(id).await }).await {
            Ok(stopped) => stopped,
            Err(e) => {
                tracing::warn!(job = id, error = %e, "stop task failed");
                false
            }
        }
    }

    /// Stops the job this context belongs to.
    pub async fn stop(&self) {
        self.stop_job(self.job_id()).await;
    }
}
