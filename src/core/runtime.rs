//! # Shared runtime state.
//!
//! [`Runtime`] is the state every execution context and the scheduler share:
//! the bus, the outbound channel, the clock, the thread index, the job
//! registry and the id counters. It also implements the job-level operations
//! (submit, stop) so that they can be reached both from the scheduler and from
//! inside job bodies.
//!
//! ## Stop flow
//! ```text
//! stop_job(id)
//!   ├─ registry.take(id) ── None ──► no-op (already completed or stopped)
//!   ├─ message "Stopping job <id>"
//!   ├─ hierarchy.kill_job(id)       (non-root threads)
//!   ├─ root.terminate() + stopped   (root context)
//!   ├─ publish /job-completed
//!   └─ job/completed
//! ```

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::core::context::{ContextHandle, ContextId};
use crate::core::ctx::Ctx;
use crate::core::hierarchy::ThreadHierarchy;
use crate::core::registry::{JobEntry, JobRegistry};
use crate::core::runner;
use crate::counter::Counter;
use crate::events::{EventBus, JOB_COMPLETED_TOPIC, JobEvent};
use crate::jobs::{EvaluationFailed, Evaluate, JobId, JobInfo, JobRef};
use crate::message::Outbox;
use crate::promise::Promise;

/// Callback for inbound `keypress` events.
pub type KeypressHandler = Arc<dyn Fn(&Value) + Send + Sync>;

pub(crate) struct Runtime {
    pub(crate) cfg: Config,
    pub(crate) bus: EventBus,
    pub(crate) outbox: Outbox,
    pub(crate) clock: Clock,
    pub(crate) hierarchy: ThreadHierarchy,
    pub(crate) registry: JobRegistry,
    pub(crate) sync_ids: Counter,
    evaluator: Option<Arc<dyn Evaluate>>,
    job_ids: Counter,
    context_ids: Counter,
    rng: Mutex<StdRng>,
    keypress: RwLock<Option<KeypressHandler>>,
}

impl Runtime {
    pub(crate) fn new(cfg: Config, outbox: Outbox, evaluator: Option<Arc<dyn Evaluate>>) -> Self {
        let rng = StdRng::seed_from_u64(cfg.rng_seed);
        Self {
            cfg,
            bus: EventBus::new(),
            outbox,
            clock: Clock::new(),
            hierarchy: ThreadHierarchy::new(),
            registry: JobRegistry::new(),
            sync_ids: Counter::new(0),
            evaluator,
            job_ids: Counter::new(0),
            context_ids: Counter::new(0),
            rng: Mutex::new(rng),
            keypress: RwLock::new(None),
        }
    }

    pub(crate) fn next_context_id(&self) -> ContextId {
        self.context_ids.next()
    }

    /// Uniform sample in `[0, limit)`; `0.0` for non-positive or NaN limits.
    pub(crate) fn rand(&self, limit: f64) -> f64 {
        if limit.is_nan() || limit <= 0.0 {
            return 0.0;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0.0..limit)
    }

    pub(crate) fn set_keypress_handler(&self, handler: KeypressHandler) {
        *self.keypress.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn keypress_handler(&self) -> Option<KeypressHandler> {
        self.keypress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Allocates a job, creates its root context and starts it.
    ///
    /// The root task is held on a barrier until the job is in the registry,
    /// so a stop issued right after `submit` returns always finds it.
    pub(crate) async fn submit(self: &Arc<Self>, job: JobRef, info: JobInfo) -> JobId {
        let id = self.job_ids.next();
        self.hierarchy.register_job(id);
        let root = ContextHandle::new(self.next_context_id(), id);

        let barrier: Promise<()> = Promise::new();
        let released = barrier.clone();
        let done = root.completion_guard();
        let rt = Arc::clone(self);
        let handle = Arc::clone(&root);
        let task_info = info.clone();
        let join = tokio::spawn(async move {
            let _done = done;
            released.get().await;
            let ctx = Ctx::new(Arc::clone(&rt), handle, rt.clock.now(), task_info);
            runner::drive(rt, job, ctx).await;
        });
        root.bind(join.abort_handle());

        self.registry.insert(id, JobEntry::new(root, info)).await;
        if barrier.deliver(()).is_err() {
            tracing::error!(job = id, "root barrier released twice");
        }
        tracing::debug!(job = id, "job submitted");
        id
    }

    /// Evaluates `code` and submits the result. Evaluation failures become a
    /// job that fails immediately.
    pub(crate) async fn submit_code(self: &Arc<Self>, code: &str, info: JobInfo) -> JobId {
        let job: JobRef = match &self.evaluator {
            Some(evaluator) => match evaluator.evaluate(code) {
                Ok(job) => job,
                Err(e) => Arc::new(EvaluationFailed::new(e)),
            },
            None => Arc::new(EvaluationFailed::new(anyhow::anyhow!(
                "no evaluator configured"
            ))),
        };
        self.submit(job, info).await
    }

    /// Reloads evaluator definitions and reports the outcome as a message.
    pub(crate) fn reload(&self) {
        let Some(evaluator) = &self.evaluator else {
            self.outbox.message("Nothing to reload.", None, None);
            return;
        };
        match evaluator.reload() {
            Ok(()) => self.outbox.message("Reloaded.", None, None),
            Err(e) => {
                tracing::warn!(error = %e, "reload failed");
                self.outbox.message(format!("Reload failed: {e:#}"), None, None);
            }
        }
    }

    /// Stops a live job. Returns `false` if it had already completed, been
    /// stopped, or its driver already started tearing it down.
    ///
    /// Must not be awaited from inside the job being stopped: the caller
    /// would be killed halfway. Job bodies go through
    /// [`Ctx::stop_job`](crate::Ctx::stop_job), which runs this detached.
    pub(crate) async fn stop_job(&self, id: JobId) -> bool {
        let Some(entry) = self.registry.take(id).await else {
            tracing::debug!(job = id, "stop: job not live");
            return false;
        };

        self.outbox
            .message(format!("Stopping job {id}"), Some(id), Some(entry.info.clone()));
        let grace = self.cfg.kill_grace();
        self.hierarchy.kill_job(id, grace).await;

        entry.root.terminate().await;
        match grace {
            None => entry.root.stopped().await,
            Some(grace) => {
                if tokio::time::timeout(grace, entry.root.stopped()).await.is_err() {
                    tracing::warn!(job = id, ?grace, "root context did not stop within grace");
                }
            }
        }

        self.bus.publish(JOB_COMPLETED_TOPIC, JobEvent { id }.to_payload());
        self.outbox.job_completed(id, entry.info);
        tracing::info!(job = id, "job stopped");
        true
    }

    /// Stops every live job, in id order.
    pub(crate) async fn stop_all_jobs(&self) {
        self.outbox.message("Stopping all jobs.", None, None);
        for id in self.registry.ids().await {
            self.stop_job(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_is_seeded_and_bounded() {
        let cfg = Config {
            rng_seed: 42,
            ..Config::default()
        };
        let (a_out, _a_rx) = Outbox::channel();
        let (b_out, _b_rx) = Outbox::channel();
        let a = Runtime::new(cfg.clone(), a_out, None);
        let b = Runtime::new(cfg, b_out, None);

        let xs: Vec<f64> = (0..5).map(|_| a.rand(10.0)).collect();
        let ys: Vec<f64> = (0..5).map(|_| b.rand(10.0)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|x| (0.0..10.0).contains(x)));
    }

    #[test]
    fn test_rand_degenerate_limits() {
        let (out, _rx) = Outbox::channel();
        let rt = Runtime::new(Config::default(), out, None);
        assert_eq!(rt.rand(0.0), 0.0);
        assert_eq!(rt.rand(-1.0), 0.0);
        assert_eq!(rt.rand(f64::NAN), 0.0);
    }
}
