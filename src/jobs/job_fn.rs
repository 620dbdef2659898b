//! # Function-backed job (`JobFn`)
//!
//! [`JobFn`] wraps a closure `F: Fn(Ctx) -> Fut`, producing a fresh future per
//! run. The same `JobFn` can be submitted many times; each submission gets its
//! own future and its own root context.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Ctx, JobFn, JobRef};
//!
//! let j: JobRef = JobFn::arc("hello", |ctx: Ctx| async move {
//!     ctx.message("hello");
//!     Ok(())
//! });
//!
//! assert_eq!(j.name(), "hello");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Ctx;
use crate::jobs::job::Job;

/// Function-backed job implementation.
#[derive(Debug)]
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a new function-backed job.
    ///
    /// Prefer [`JobFn::arc`] when you immediately need a [`JobRef`](crate::JobRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Ctx) -> anyhow::Result<()> {
        (self.f)(ctx).await
    }
}
