//! Orchestrator - Workflow Orchestration Engine
//!
//! Executes named workflows made of sequential, parallel and composite
//! steps. Workflows are declared in a configuration file, compiled once at
//! startup, and every execution request runs the compiled form against a
//! fresh per-request context.
//!
//! # Architecture
//!
//! - [`workflow`]: Declarative definitions and configuration loading
//! - [`registry`]: Processors, step compilation and the workflow registry
//! - [`execution`]: Execution context, compiled steps and the engine
//! - [`remote`]: Transports for steps calling remote services
//! - [`monitoring`]: Per-run execution timeline
//! - [`dispatch`]: Request routing and response assembly
//!
//! # Example
//!
//! ```rust,no_run
//! use orchestrator::dispatch::{Dispatcher, WorkflowRequest};
//! use orchestrator::execution::Engine;
//! use orchestrator::registry::{ProcessorRegistry, StepRegistry};
//! use orchestrator::remote::TransportRegistry;
//! use orchestrator::load_config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("workflows.yaml")?;
//!
//!     let steps = StepRegistry::new(ProcessorRegistry::with_builtins(), TransportRegistry::new());
//!     let dispatcher = Dispatcher::from_config(&config, &steps, Engine::new())?;
//!
//!     let response = dispatcher.execute(&WorkflowRequest::new(
//!         "subject-matching",
//!         serde_json::json!({ "subjectId": 42 }),
//!     ));
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod registry;
pub mod remote;
pub mod workflow;

// Re-export commonly used types
pub use dispatch::{Dispatcher, WorkflowRequest, WorkflowResponse};
pub use error::{CompilationError, ConfigError, DispatchError, ExecutionError};
pub use execution::{Engine, ExecutionContext, WorkflowStatus};
pub use registry::{ProcessorRegistry, StepRegistry, WorkflowRegistry};
pub use workflow::{load_config, StepDefinition, WorkflowDefinition};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Orchestrator";
