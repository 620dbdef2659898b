use std::sync::Arc;

use tokio::sync::mpsc;

use super::{config::Config, inbound, runtime::Runtime, scheduler::Scheduler};
use crate::jobs::Evaluate;
use crate::message::{Outbound, Outbox};

/// Builder for constructing a Scheduler with optional features.
pub struct SchedulerBuilder {
    cfg: Config,
    evaluator: Option<Arc<dyn Evaluate>>,
}

impl SchedulerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            evaluator: None,
        }
    }

    /// Sets the evaluator used by `run-code`.
    ///
    /// Without one, every `run-code` job fails with an evaluation error.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluate>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Builds the scheduler and returns it with the receiving side of its
    /// outbound message channel.
    ///
    /// Starts the inbound event task, so it must be called from within a
    /// tokio runtime.
    pub fn build(self) -> (Scheduler, Outbound) {
        let (outbox, outbound) = Outbox::channel();
        let rt = Arc::new(Runtime::new(self.cfg, outbox, self.evaluator));

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let listener = inbound::spawn_listener(Arc::clone(&rt), inbound_rx);

        (Scheduler::new_internal(rt, inbound_tx, listener), outbound)
    }
}
