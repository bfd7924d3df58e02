//! Compiled Workflow
//!
//! The executable form of a workflow definition, produced by the step
//! registry and owned by the workflow registry. Immutable once built.

use std::sync::Arc;
use std::time::Duration;

use super::step::Step;
use crate::workflow::model::DEFAULT_TIMEOUT_SECONDS;

#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    name: String,
    sequential_steps: Vec<Arc<Step>>,
    parallel_steps: Vec<Arc<Step>>,
    allow_parallel_execution: bool,
    timeout_seconds: u64,
}

impl Workflow {
    /// Creates a workflow from already compiled step groups.
    ///
    /// Parallel execution is enabled and the default timeout applies until
    /// changed with the builder methods.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        sequential_steps: Vec<Arc<Step>>,
        parallel_steps: Vec<Arc<Step>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sequential_steps,
            parallel_steps,
            allow_parallel_execution: true,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_parallel_execution(mut self, allow: bool) -> Self {
        self.allow_parallel_execution = allow;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps run one after another, in declaration order.
    pub fn sequential_steps(&self) -> &[Arc<Step>] {
        &self.sequential_steps
    }

    /// Steps run concurrently after the sequential ones.
    pub fn parallel_steps(&self) -> &[Arc<Step>] {
        &self.parallel_steps
    }

    pub fn allow_parallel_execution(&self) -> bool {
        self.allow_parallel_execution
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Number of top-level steps.
    pub fn len(&self) -> usize {
        self.sequential_steps.len() + self.parallel_steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
