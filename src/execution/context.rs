//! Execution Context
//!
//! Per-request state shared by every step of one workflow run. The `shared`
//! blackboard is a concurrent map so parallel steps can publish their outputs
//! without coordinating; each step only ever writes its own keys.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::validator::{RESERVED_ERROR_KEY, STEP_ERROR_SUFFIX};

/// Input key holding the request payload.
pub const INPUT_KEY: &str = "input";

/// Shared key holding the message of the failure that ended a run.
pub const ERROR_KEY: &str = RESERVED_ERROR_KEY;

/// Returns the shared key recording the failure of a parallel step.
pub fn step_error_key(step_id: &str) -> String {
    format!("{}{}", step_id, STEP_ERROR_SUFFIX)
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => f.write_str("RUNNING"),
            Self::Completed => f.write_str("COMPLETED"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// Mutable state of a single workflow execution.
#[derive(Debug)]
pub struct ExecutionContext {
    workflow_id: String,
    input: Map<String, Value>,
    shared: DashMap<String, Value>,
    status: Mutex<WorkflowStatus>,
    cancelled: AtomicBool,
}

impl ExecutionContext {
    /// Creates a context with the given request parameters.
    pub fn new(workflow_id: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            input,
            shared: DashMap::new(),
            status: Mutex::new(WorkflowStatus::Running),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Creates a context whose input holds the request payload under `input`.
    pub fn for_request(workflow_id: impl Into<String>, input_data: Value) -> Self {
        let mut input = Map::new();
        input.insert(INPUT_KEY.to_string(), input_data);
        Self::new(workflow_id, input)
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Request parameters. Never modified after creation.
    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Returns one request parameter.
    pub fn input_value(&self, key: &str) -> Option<&Value> {
        self.input.get(key)
    }

    /// Returns a copy of a shared value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.shared.get(key).map(|entry| entry.value().clone())
    }

    /// Stores a shared value, returning the one it replaced.
    pub fn put(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.shared.insert(key.into(), value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shared.contains_key(key)
    }

    /// Number of shared entries.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Copies the shared state into an ordered map.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.shared
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn status(&self) -> WorkflowStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: WorkflowStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Marks the run as abandoned. Steps still running stop publishing output.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
