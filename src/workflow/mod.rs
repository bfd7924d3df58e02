//! Workflow Definition Module
//!
//! Declarative workflow and step definitions as read from configuration.
//!
//! # Structure
//!
//! - [`model`]: Definition data structures and settings
//! - [`parser`]: YAML/JSON configuration loading
//! - [`validator`]: Structural checks run before compilation

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{OrchestratorConfig, Settings, StepDefinition, StepType, WorkflowDefinition};
pub use parser::{load_config, parse_config};
