//! Error Types
//!
//! Failures are split by the phase in which they can occur:
//!
//! - [`CompilationError`]: a step or workflow definition is structurally
//!   invalid. Raised while loading, before anything is registered.
//! - [`ConfigError`]: the configuration file cannot be read, parsed, or
//!   compiled into workflows.
//! - [`ExecutionError`]: a running workflow stopped early (sequential step
//!   failure or timeout). Never escapes the engine; it is converted into the
//!   response status and the reserved `error` result entry.
//! - [`DispatchError`]: the requested workflow is not registered.

use thiserror::Error;

use crate::remote::Protocol;
use crate::workflow::model::StepType;

/// A step or workflow definition that cannot be turned into an executable form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("Step has empty or whitespace-only ID")]
    EmptyStepId,

    #[error("Duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    #[error("Step '{step}' has unknown type '{step_type}'")]
    UnknownStepType { step: String, step_type: String },

    #[error("Step '{step}' of type '{step_type}' requires '{field}'")]
    MissingField {
        step: String,
        step_type: StepType,
        field: &'static str,
    },

    #[error("Step '{step}' of type '{step_type}' must not set '{field}'")]
    UnexpectedField {
        step: String,
        step_type: StepType,
        field: &'static str,
    },

    #[error("Step '{step}' references unknown processor '{processor}'")]
    UnknownProcessor { step: String, processor: String },

    #[error("Step '{step}' has invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        step: String,
        endpoint: String,
        reason: String,
    },

    #[error("Step '{step}' calls a {protocol} endpoint but no {protocol} transport is configured")]
    MissingTransport { step: String, protocol: Protocol },

    #[error("Composite step '{0}' has no nested steps")]
    EmptyComposite(String),

    #[error("Step '{step}' uses reserved output key '{key}'")]
    ReservedOutputKey { step: String, key: String },

    #[error("Parallel steps '{first}' and '{second}' both write output key '{key}'")]
    ConflictingOutputKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("Parallel step '{reader}' reads key '{key}' written by parallel step '{writer}'")]
    ParallelDataDependency {
        reader: String,
        writer: String,
        key: String,
    },

    #[error("Workflow has empty or whitespace-only ID")]
    EmptyWorkflowId,

    #[error("Workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    #[error("Workflow '{0}' must have a timeout greater than zero")]
    InvalidTimeout(String),
}

/// Failure to turn a configuration file into registered workflows.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Workflow '{workflow}' failed to compile: {source}")]
    Compilation {
        workflow: String,
        #[source]
        source: CompilationError,
    },
}

/// Reasons a workflow run ends in `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Step '{step_id}' failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("Workflow '{workflow_id}' timed out after {seconds}s")]
    TimedOut { workflow_id: String, seconds: u64 },

    #[error("Step worker exited without reporting a result")]
    WorkerLost,
}

/// Failure to route an execution request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Workflow not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_error_messages_name_the_step() {
        let err = CompilationError::UnknownProcessor {
            step: "validate".to_string(),
            processor: "missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'validate' references unknown processor 'missing'"
        );

        let err = CompilationError::MissingField {
            step: "fetch".to_string(),
            step_type: StepType::RemoteHttp,
            field: "endpoint",
        };
        assert_eq!(
            err.to_string(),
            "Step 'fetch' of type 'remote-http' requires 'endpoint'"
        );
    }

    #[test]
    fn test_missing_transport_message() {
        let err = CompilationError::MissingTransport {
            step: "score".to_string(),
            protocol: Protocol::Grpc,
        };
        assert!(err.to_string().contains("no gRPC transport is configured"));
    }

    #[test]
    fn test_execution_error_messages() {
        let err = ExecutionError::StepFailed {
            step_id: "s1".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Step 's1' failed: boom");

        let err = ExecutionError::TimedOut {
            workflow_id: "w".to_string(),
            seconds: 5,
        };
        assert_eq!(err.to_string(), "Workflow 'w' timed out after 5s");
    }

    #[test]
    fn test_dispatch_error_message() {
        let err = DispatchError::NotFound("nope".to_string());
        assert_eq!(err.to_string(), "Workflow not found: nope");
    }

    #[test]
    fn test_config_error_wraps_compilation_error() {
        let err = ConfigError::Compilation {
            workflow: "w".to_string(),
            source: CompilationError::EmptyComposite("c".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Workflow 'w' failed to compile: Composite step 'c' has no nested steps"
        );
    }
}
