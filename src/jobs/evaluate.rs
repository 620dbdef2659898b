//! # Turning `run-code` text into job bodies.
//!
//! Parsing and evaluating user code is outside the runtime; it only needs
//! something that maps the submitted text to a [`JobRef`]. That seam is the
//! [`Evaluate`] trait.
//!
//! [`Programs`] is a ready-made evaluator: a name → job table. The submitted
//! code is the (trimmed) program name.
//!
//! An evaluation error does not reject the submission. The job is still
//! allocated and started, and fails immediately with the evaluation error, so
//! the caller sees the usual `start` / `error` / `completed` sequence.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::core::Ctx;
use crate::jobs::job::{Job, JobRef};

/// Maps submitted code to a runnable job body.
pub trait Evaluate: Send + Sync + 'static {
    /// Produces the body for `code`.
    fn evaluate(&self, code: &str) -> anyhow::Result<JobRef>;

    /// Reloads definitions (the `reload` command). Default: nothing to do.
    fn reload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Name → job table evaluator.
#[derive(Default)]
pub struct Programs {
    table: RwLock<HashMap<String, JobRef>>,
}

impl Programs {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `job` under `name` (builder style).
    #[must_use]
    pub fn with(self, name: impl Into<String>, job: JobRef) -> Self {
        self.insert(name, job);
        self
    }

    /// Adds or replaces `job` under `name`.
    pub fn insert(&self, name: impl Into<String>, job: JobRef) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), job);
    }

    /// Sorted program names.
    pub fn names(&self) -> Vec<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = table.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Evaluate for Programs {
    fn evaluate(&self, code: &str) -> anyhow::Result<JobRef> {
        let name = code.trim();
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("undefined program `{name}`"))
    }
}

/// Body standing in for code that failed to evaluate.
pub(crate) struct EvaluationFailed {
    error: Mutex<Option<anyhow::Error>>,
}

impl EvaluationFailed {
    pub(crate) fn new(error: anyhow::Error) -> Self {
        Self {
            error: Mutex::new(Some(error)),
        }
    }
}

#[async_trait]
impl Job for EvaluationFailed {
    fn name(&self) -> &str {
        "evaluation-failed"
    }

    async fn run(&self, _ctx: Ctx) -> anyhow::Result<()> {
        let err = self
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| anyhow!("evaluation failed"));
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobFn;

    #[test]
    fn test_programs_lookup_trims_code() {
        let programs = Programs::new().with("drums", JobFn::arc("drums", |_ctx: Ctx| async { Ok(()) }));
        let job = programs.evaluate("  drums\n").unwrap();
        assert_eq!(job.name(), "drums");
    }

    #[test]
    fn test_programs_unknown_name() {
        let programs = Programs::new();
        let err = programs.evaluate("bass").err().unwrap();
        assert_eq!(err.to_string(), "undefined program `bass`");
    }

    #[test]
    fn test_names_sorted() {
        let programs = Programs::new()
            .with("b", JobFn::arc("b", |_ctx: Ctx| async { Ok(()) }))
            .with("a", JobFn::arc("a", |_ctx: Ctx| async { Ok(()) }));
        assert_eq!(programs.names(), vec!["a", "b"]);
    }
}
