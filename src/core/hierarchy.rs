//! # Thread hierarchy.
//!
//! Tracks every live non-root context of every job and owns the spawn, kill
//! and join protocols.
//!
//! ## Spawn (register-then-release)
//! ```text
//! parent                                   child task
//!   ├─ spawn task ──────────────────────────► await barrier
//!   ├─ bind abort handle
//!   ├─ parent.children += child
//!   ├─ index[job] += child ? (job still tracked)
//!   └─ barrier.deliver(ok) ─────────────────► ok  → run body
//!                                            !ok → return without running
//! ```
//! A context therefore never runs its body unless it is registered under a
//! live job, and a kill that removes the job's set before the registration
//! observes the job as gone.
//!
//! ## Rules
//! - The index entry for a job exists from submission until the job is
//!   killed; a missing entry means "job gone".
//! - Every index operation is a single critical section on one lock.
//! - A context that finishes normally leaves the index. It leaves its
//!   parent's children once it has no live children of its own, so joins
//!   still reach its descendants. The last of its children to finish unlinks
//!   it, walking up through every ancestor that became empty the same way.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::context::{ContextHandle, ContextId};
use crate::jobs::JobId;
use crate::promise::Promise;

type JobThreads = HashMap<ContextId, Arc<ContextHandle>>;

/// Result of [`ThreadHierarchy::kill_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KillOutcome {
    /// The job's thread set was removed and this many contexts were killed.
    Killed(usize),
    /// The job had no thread set (never registered or already killed).
    NothingToKill,
}

/// Job → live non-root contexts index.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThreadHierarchy {
    index: Arc<Mutex<HashMap<JobId, JobThreads>>>,
}

impl ThreadHierarchy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates the (empty) thread set of a new job.
    pub(crate) fn register_job(&self, job: JobId) {
        self.lock().entry(job).or_default();
    }

    /// Number of tracked threads of `job`, or `None` if the job has no set.
    pub(crate) fn tracked(&self, job: JobId) -> Option<usize> {
        self.lock().get(&job).map(HashMap::len)
    }

    /// Spawns `child` under `parent`, running `body` only once the child is
    /// registered in its job's set.
    ///
    /// Returns `false` if the job was already gone; the task then ends
    /// without running `body`.
    pub(crate) fn spawn<F, Fut>(
        &self,
        parent: &Arc<ContextHandle>,
        child: Arc<ContextHandle>,
        body: F,
    ) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let barrier: Promise<bool> = Promise::new();
        let released = barrier.clone();
        let done = child.completion_guard();
        let hierarchy = self.clone();
        let task_child = Arc::clone(&child);

        let join = tokio::spawn(async move {
            let _done = done;
            if !released.get().await {
                return;
            }
            body().await;
            hierarchy.release(task_child);
        });
        child.bind(join.abort_handle());
        parent.add_child(Arc::clone(&child));

        let attached = self.try_attach(&child);
        if !attached {
            if parent.remove_child(child.id()) {
                unlink(Arc::clone(parent));
            }
            tracing::debug!(
                job = child.job_id(),
                context = child.id(),
                "job gone before spawn; thread not started"
            );
        }
        if barrier.deliver(attached).is_err() {
            tracing::error!(context = child.id(), "spawn barrier released twice");
        }
        attached
    }

    /// Removes the job's thread set and terminates every context in it, then
    /// waits for each to stop (bounded per context by `grace`).
    ///
    /// Contexts spawned after the set was removed observe the job as gone and
    /// never run, so none escape.
    pub(crate) async fn kill_job(&self, job: JobId, grace: Option<Duration>) -> KillOutcome {
        let Some(threads) = self.lock().remove(&job) else {
            return KillOutcome::NothingToKill;
        };
        let targets: Vec<Arc<ContextHandle>> = threads.into_values().collect();

        for ctx in &targets {
            ctx.terminate().await;
        }
        for ctx in &targets {
            await_stopped(ctx, grace).await;
        }

        tracing::debug!(job, killed = targets.len(), "job threads killed");
        KillOutcome::Killed(targets.len())
    }

    /// Waits until every descendant of `root` has stopped.
    ///
    /// Must be called once `root` can no longer spawn. Each visited context's
    /// children are read only after it stopped, so grandchildren spawned
    /// meanwhile are still reached.
    pub(crate) async fn join_descendants(root: &ContextHandle) {
        let mut pending = root.children();
        while let Some(ctx) = pending.pop() {
            ctx.stopped().await;
            pending.extend(ctx.children());
        }
    }

    fn try_attach(&self, ctx: &Arc<ContextHandle>) -> bool {
        match self.lock().get_mut(&ctx.job_id()) {
            Some(threads) => {
                threads.insert(ctx.id(), Arc::clone(ctx));
                true
            }
            None => false,
        }
    }

    fn detach(&self, ctx: &ContextHandle) {
        if let Some(threads) = self.lock().get_mut(&ctx.job_id()) {
            threads.remove(&ctx.id());
        }
    }

    /// Bookkeeping for a context whose body returned.
    fn release(&self, child: Arc<ContextHandle>) {
        self.detach(&child);
        if child.mark_returned() {
            unlink(child);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobThreads>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes `ctx` from its parent, then keeps going up while the parent is
/// itself returned and left without children.
fn unlink(mut ctx: Arc<ContextHandle>) {
    while let Some(parent) = ctx.parent() {
        if !parent.remove_child(ctx.id()) {
            break;
        }
        ctx = parent;
    }
}

async fn await_stopped(ctx: &ContextHandle, grace: Option<Duration>) {
    match grace {
        None => ctx.stopped().await,
        Some(grace) => {
            if tokio::time::timeout(grace, ctx.stopped()).await.is_err() {
                tracing::warn!(
                    job = ctx.job_id(),
                    context = ctx.id(),
                    ?grace,
                    "context did not stop within grace"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn root(job: JobId) -> Arc<ContextHandle> {
        ContextHandle::new(0, job)
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_registers_and_releases() {
        let h = ThreadHierarchy::new();
        h.register_job(1);
        let parent = root(1);
        let child = ContextHandle::new(1, 1);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        assert!(h.spawn(&parent, Arc::clone(&child), move || async move {
            let _ = rx.await;
        }));
        assert_eq!(h.tracked(1), Some(1));
        assert_eq!(parent.children().len(), 1);

        tx.send(()).unwrap();
        child.stopped().await;
        assert_eq!(h.tracked(1), Some(0));
        assert!(parent.children().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_into_gone_job_never_runs() {
        let h = ThreadHierarchy::new();
        let parent = root(9);
        let child = ContextHandle::new(1, 9);
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        assert!(!h.spawn(&parent, Arc::clone(&child), move || async move {
            flag.store(true, Ordering::SeqCst);
        }));

        child.stopped().await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(parent.children().is_empty());
        assert_eq!(h.tracked(9), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_job_terminates_all_threads() {
        let h = ThreadHierarchy::new();
        h.register_job(3);
        let parent = root(3);
        let mut children = Vec::new();
        for id in 1..=3 {
            let child = ContextHandle::new(id, 3);
            h.spawn(&parent, Arc::clone(&child), || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
            children.push(child);
        }

        assert_eq!(h.kill_job(3, None).await, KillOutcome::Killed(3));
        assert!(children.iter().all(|c| c.is_finished() && c.is_killed()));
        assert_eq!(h.tracked(3), None);
        assert_eq!(h.kill_job(3, None).await, KillOutcome::NothingToKill);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_reaches_grandchildren_of_finished_child() {
        let h = ThreadHierarchy::new();
        h.register_job(4);
        let parent = root(4);
        let child = ContextHandle::new(1, 4);
        let grandchild = ContextHandle::new(2, 4);

        let (spawned_tx, spawned_rx) = tokio::sync::oneshot::channel();
        let inner = h.clone();
        let c = Arc::clone(&child);
        let g = Arc::clone(&grandchild);
        h.spawn(&parent, Arc::clone(&child), move || async move {
            inner.spawn(&c, g, || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
            });
            let _ = spawned_tx.send(());
        });
        spawned_rx.await.unwrap();
        child.stopped().await;

        assert!(!grandchild.is_finished());
        ThreadHierarchy::join_descendants(&parent).await;
        assert!(grandchild.is_finished());
        assert!(!grandchild.is_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_returned_spawners_unlink_after_last_grandchild() {
        let h = ThreadHierarchy::new();
        h.register_job(6);
        let parent = root(6);
        let mut grandchildren = Vec::new();

        for n in 0..50u64 {
            let child = ContextHandle::new(1 + 2 * n, 6);
            let grandchild = ContextHandle::new(2 + 2 * n, 6);
            grandchildren.push(Arc::clone(&grandchild));

            let inner = h.clone();
            let c = Arc::clone(&child);
            h.spawn(&parent, child, move || async move {
                inner.spawn(&c, grandchild, || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                });
            });
        }

        for g in &grandchildren {
            g.stopped().await;
        }
        tokio::task::yield_now().await;

        assert_eq!(h.tracked(6), Some(0));
        assert!(parent.children().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_grace_bounds_wait() {
        let h = ThreadHierarchy::new();
        h.register_job(5);
        let parent = root(5);
        let child = ContextHandle::new(1, 5);
        h.spawn(&parent, Arc::clone(&child), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let outcome = h.kill_job(5, Some(Duration::from_millis(10))).await;
        assert_eq!(outcome, KillOutcome::Killed(1));
    }
}
