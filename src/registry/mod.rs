//! Registries
//!
//! - [`processors`]: Named in-process step logic
//! - [`steps`]: Compiles step definitions into executable steps
//! - [`workflows`]: Compiled workflows by ID

pub mod processors;
pub mod steps;
pub mod workflows;

pub use processors::{register_builtins, Processor, ProcessorOutput, ProcessorRegistry};
pub use steps::StepRegistry;
pub use workflows::WorkflowRegistry;
