//! Workflow Execution Module
//!
//! Runs compiled workflows against per-request state.
//!
//! # Architecture
//!
//! - [`context`]: Per-request input, shared blackboard and status
//! - [`step`]: Compiled steps and how each kind is invoked
//! - [`workflow`]: Compiled workflows
//! - [`engine`]: Sequential, parallel and timeout handling for a run

pub mod context;
pub mod engine;
pub mod step;
pub mod workflow;

pub use context::{step_error_key, ExecutionContext, WorkflowStatus, ERROR_KEY, INPUT_KEY};
pub use engine::{Engine, RunReport};
pub use step::{execute_step, Invocation, ProcessorRef, Step, StepResult};
pub use workflow::Workflow;
