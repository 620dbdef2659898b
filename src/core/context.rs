//! # Execution context handles.
//!
//! A [`ContextHandle`] is the shared, killable part of one logical thread of
//! control: its identity, its direct children and its guards. The worker-owned
//! part (virtual time, job info, capability surface) lives in
//! [`Ctx`](crate::Ctx).
//!
//! ## Termination protocol
//! ```text
//! killer                                   target
//!   │ lock(no_kill) ◄── waits while ──────── inside no_kill block
//!   │ killed.cancel()
//!   │ abort()  ─────────────────────────────► dropped at next suspension point
//!   │ unlock(no_kill)
//!   │                                        enter no_kill after being killed?
//!   │                                          └─► parks until the abort lands
//!   └ await stopped() ◄──────────────────── completion guard dropped
//! ```
//!
//! ## Rules
//! - `job_id` is fixed at creation; a handle belongs to exactly one job.
//! - The abort handle is bound once, before the handle becomes visible to
//!   any killer (job index or registry).
//! - `stopped()` resolves when the task ends for any reason, including abort.
//! - A context is linked under its parent until its body returned and it has
//!   no children left; whichever of the two happens last unlinks it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tokio::sync::MutexGuard;
use tokio::task::AbortHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::jobs::JobId;

/// Identifier of an execution context.
pub type ContextId = u64;

#[derive(Default)]
struct Children {
    live: HashMap<ContextId, Arc<ContextHandle>>,
    returned: bool,
}

/// Shared state of one execution context.
pub(crate) struct ContextHandle {
    id: ContextId,
    job_id: JobId,
    parent: OnceLock<Weak<ContextHandle>>,
    children: Mutex<Children>,
    no_kill: tokio::sync::Mutex<()>,
    killed: CancellationToken,
    finished: CancellationToken,
    abort: OnceLock<AbortHandle>,
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.id)
            .field("job_id", &self.job_id)
            .field("killed", &self.killed.is_cancelled())
            .field("finished", &self.finished.is_cancelled())
            .finish()
    }
}

impl ContextHandle {
    pub(crate) fn new(id: ContextId, job_id: JobId) -> Arc<Self> {
        Arc::new(Self {
            id,
            job_id,
            parent: OnceLock::new(),
            children: Mutex::new(Children::default()),
            no_kill: tokio::sync::Mutex::new(()),
            killed: CancellationToken::new(),
            finished: CancellationToken::new(),
            abort: OnceLock::new(),
        })
    }

    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Binds the task running this context. Later calls are ignored.
    pub(crate) fn bind(&self, abort: AbortHandle) {
        if self.abort.set(abort).is_err() {
            tracing::warn!(context = self.id, "context already bound to a task");
        }
    }

    /// Guard to be owned by the context's task; dropping it marks the context
    /// as stopped.
    pub(crate) fn completion_guard(&self) -> DropGuard {
        self.finished.clone().drop_guard()
    }

    /// Links `child` under this context.
    pub(crate) fn add_child(self: &Arc<Self>, child: Arc<ContextHandle>) {
        if child.parent.set(Arc::downgrade(self)).is_err() {
            tracing::warn!(context = child.id, "context already has a parent");
        }
        self.lock_children().live.insert(child.id, child);
    }

    pub(crate) fn parent(&self) -> Option<Arc<ContextHandle>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Unlinks a child. Returns `true` if this context is now due to be
    /// unlinked itself: its body returned and no children are left.
    pub(crate) fn remove_child(&self, id: ContextId) -> bool {
        let mut children = self.lock_children();
        children.live.remove(&id).is_some() && children.returned && children.live.is_empty()
    }

    /// Records that the body returned. Returns `true` if no children are
    /// left, so the context is due to be unlinked now.
    pub(crate) fn mark_returned(&self) -> bool {
        let mut children = self.lock_children();
        children.returned = true;
        children.live.is_empty()
    }

    /// Snapshot of the direct children.
    pub(crate) fn children(&self) -> Vec<Arc<ContextHandle>> {
        self.lock_children().live.values().cloned().collect()
    }

    /// Acquires the no-kill guard.
    ///
    /// A context that was already killed never gets the guard back: it parks
    /// here until its pending abort drops it.
    pub(crate) async fn enter_no_kill(&self) -> MutexGuard<'_, ()> {
        let guard = self.no_kill.lock().await;
        if self.killed.is_cancelled() {
            drop(guard);
            return std::future::pending().await;
        }
        guard
    }

    /// Forcibly terminates the context once it is outside any no-kill block.
    ///
    /// Does not wait for the task to stop; use [`stopped`](Self::stopped).
    pub(crate) async fn terminate(&self) {
        let _guard = self.no_kill.lock().await;
        self.killed.cancel();
        match self.abort.get() {
            Some(abort) => abort.abort(),
            None => tracing::warn!(context = self.id, "terminating unbound context"),
        }
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.killed.is_cancelled()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Resolves once the context's task has ended.
    pub(crate) async fn stopped(&self) {
        self.finished.cancelled().await;
    }

    fn lock_children(&self) -> std::sync::MutexGuard<'_, Children> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a thread spawned with [`Ctx::in_thread`](crate::Ctx::in_thread).
#[derive(Debug, Clone)]
pub struct ThreadHandle {
    ctx: Arc<ContextHandle>,
}

impl ThreadHandle {
    pub(crate) fn new(ctx: Arc<ContextHandle>) -> Self {
        Self { ctx }
    }

    /// Id of the spawned context.
    pub fn id(&self) -> ContextId {
        self.ctx.id()
    }

    /// Job the context belongs to.
    pub fn job_id(&self) -> JobId {
        self.ctx.job_id()
    }

    /// True once the context stopped (finished, failed, killed, or never
    /// started because its job was already gone).
    pub fn is_finished(&self) -> bool {
        self.ctx.is_finished()
    }

    /// True if the context was terminated by a kill.
    pub fn is_killed(&self) -> bool {
        self.ctx.is_killed()
    }

    /// Waits for the context to stop. Does not wait for its children.
    pub async fn join(&self) {
        self.ctx.stopped().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    fn spawn_bound<F>(ctx: &Arc<ContextHandle>, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let done = ctx.completion_guard();
        let join = tokio::spawn(async move {
            let _done = done;
            fut.await;
        });
        ctx.bind(join.abort_handle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_stops_sleeping_context() {
        let ctx = ContextHandle::new(1, 1);
        spawn_bound(&ctx, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        ctx.terminate().await;
        ctx.stopped().await;
        assert!(ctx.is_killed());
        assert!(ctx.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_waits_for_no_kill_block() {
        let ctx = ContextHandle::new(1, 1);
        let completed = Arc::new(AtomicBool::new(false));

        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let c = Arc::clone(&ctx);
        let flag = Arc::clone(&completed);
        spawn_bound(&ctx, async move {
            let _guard = c.enter_no_kill().await;
            let _ = entered_tx.send(());
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        entered_rx.await.unwrap();
        ctx.terminate().await;
        ctx.stopped().await;

        assert!(completed.load(Ordering::SeqCst), "critical section was cut short");
    }

    #[tokio::test(start_paused = true)]
    async fn test_killed_context_cannot_reenter_no_kill() {
        let ctx = ContextHandle::new(1, 1);
        ctx.killed.cancel();

        let entered = tokio::time::timeout(Duration::from_secs(1), ctx.enter_no_kill()).await;
        assert!(entered.is_err());
    }

    #[test]
    fn test_children_bookkeeping() {
        let parent = ContextHandle::new(1, 7);
        let child = ContextHandle::new(2, 7);
        parent.add_child(Arc::clone(&child));
        assert_eq!(parent.children().len(), 1);
        assert_eq!(parent.children()[0].id(), 2);
        assert_eq!(child.parent().map(|p| p.id()), Some(1));
        assert!(!parent.remove_child(2));
        assert!(parent.children().is_empty());
    }

    #[test]
    fn test_last_of_return_and_child_exit_unlinks() {
        let parent = ContextHandle::new(1, 7);
        let child = ContextHandle::new(2, 7);
        parent.add_child(Arc::clone(&child));

        assert!(!parent.mark_returned());
        assert!(parent.remove_child(2));
        assert!(!parent.remove_child(2));

        let idle = ContextHandle::new(3, 7);
        assert!(idle.mark_returned());
    }
}
