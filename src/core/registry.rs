//! # Job registry - ownership of live jobs.
//!
//! Maps job id → root context and job info for every job that has been
//! submitted and not yet completed or stopped.
//!
//! ## Architecture
//! ```text
//! submit ──► insert(id, root, info)
//! driver ──► set_state(id, Running / JoiningChildren)
//! driver ──► take(id) ─┐
//! stop   ──► take(id) ─┴─► exactly one caller gets Some(entry)
//!                          and emits the completion messages
//! ```
//!
//! ## Rules
//! - `take` is the single point deciding who finishes a job
//! - Entries are never re-inserted under a used id
//! - Root contexts live here, not in the thread index

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::core::context::ContextHandle;
use crate::jobs::{JobId, JobInfo};

/// Lifecycle stage of a live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Submitted; the root body has not started yet.
    Starting,
    /// Root body running.
    Running,
    /// Root body returned; waiting for its descendants.
    JoiningChildren,
}

/// Point-in-time view of one live job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Job id.
    pub id: JobId,
    /// Opaque info given at submission.
    pub info: JobInfo,
    /// Current stage.
    pub state: JobState,
    /// Time since submission.
    pub age: Duration,
}

/// A live job.
pub(crate) struct JobEntry {
    pub(crate) root: Arc<ContextHandle>,
    pub(crate) info: JobInfo,
    state: JobState,
    submitted_at: Instant,
}

impl JobEntry {
    pub(crate) fn new(root: Arc<ContextHandle>, info: JobInfo) -> Self {
        Self {
            root,
            info,
            state: JobState::Starting,
            submitted_at: Instant::now(),
        }
    }
}

/// Live jobs by id.
#[derive(Default)]
pub(crate) struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a job. Returns `false` (and keeps the existing entry) if the id
    /// is already live.
    pub(crate) async fn insert(&self, id: JobId, entry: JobEntry) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            tracing::error!(job = id, "job id already registered");
            return false;
        }
        jobs.insert(id, entry);
        true
    }

    /// Updates the stage of a live job; no-op if it is gone.
    pub(crate) async fn set_state(&self, id: JobId, state: JobState) {
        if let Some(entry) = self.jobs.write().await.get_mut(&id) {
            entry.state = state;
        }
    }

    /// Atomically removes a job.
    pub(crate) async fn take(&self, id: JobId) -> Option<JobEntry> {
        self.jobs.write().await.remove(&id)
    }

    /// Sorted ids of live jobs.
    pub(crate) async fn ids(&self) -> Vec<JobId> {
        let jobs = self.jobs.read().await;
        let mut ids: Vec<JobId> = jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Summaries of live jobs, sorted by id.
    pub(crate) async fn summaries(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.read().await;
        let mut out: Vec<JobSummary> = jobs
            .iter()
            .map(|(id, entry)| JobSummary {
                id: *id,
                info: entry.info.clone(),
                state: entry.state,
                age: entry.submitted_at.elapsed(),
            })
            .collect();
        out.sort_unstable_by_key(|s| s.id);
        out
    }

    pub(crate) async fn contains(&self, id: JobId) -> bool {
        self.jobs.read().await.contains_key(&id)
    }
}
