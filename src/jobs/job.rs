//! # Job abstraction.
//!
//! A [`Job`] is the opaque body of one submitted code snippet. The runtime
//! never looks inside it: it hands the body a root [`Ctx`] and runs it to
//! completion, failure or termination.
//!
//! The common handle type is [`JobRef`], an `Arc<dyn Job>` suitable for sharing
//! across the runtime.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Ctx;

/// Identifier of a submitted job.
pub type JobId = u64;

/// Opaque metadata attached to a job at submission and echoed in every
/// status message about it.
pub type JobInfo = serde_json::Value;

/// Shared reference to a job body.
pub type JobRef = Arc<dyn Job>;

/// # Body of a job.
///
/// `run` receives the root execution context. Everything the body does
/// (spawning threads, sleeping, rendezvous) goes through that context.
///
/// Returning `Err` (or panicking) fails the job: its remaining threads are
/// killed and an error report is published.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use jobvisor::{Ctx, Job};
///
/// struct Metronome;
///
/// #[async_trait]
/// impl Job for Metronome {
///     fn name(&self) -> &str { "metronome" }
///
///     async fn run(&self, mut ctx: Ctx) -> anyhow::Result<()> {
///         for beat in 0..4 {
///             ctx.message(format!("tick {beat}"));
///             ctx.sleep_secs(0.5).await;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Returns a stable, human-readable job name.
    fn name(&self) -> &str;

    /// Evaluates the body on the given root context.
    async fn run(&self, ctx: Ctx) -> anyhow::Result<()>;
}
