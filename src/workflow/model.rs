//! Workflow Definition Model
//!
//! Declarative descriptions of workflows and their steps as they appear in
//! configuration. Definitions carry no behavior; the step registry compiles
//! them into executable steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! settings:
//!   maxParallel: 4
//!
//! workflows:
//!   - id: subject-matching
//!     name: Subject matching
//!     timeoutSeconds: 30
//!     steps:
//!       - id: validate
//!         type: local
//!         processor: echo
//!         outputKey: subject
//!
//!       - id: enrich
//!         type: composite
//!         parallel: true
//!         nestedSteps:
//!           - id: lookup
//!             type: remote-http
//!             endpoint: http://lookup.internal/subjects
//!             outputKey: lookup
//!
//!       - id: score
//!         type: remote-http
//!         endpoint: http://scoring.internal/score
//!         parallel: true
//!         outputKey: score
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Timeout applied to workflows that don't declare one.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Timeout for a single remote HTTP call.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// The kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepType {
    /// In-process processor resolved by name
    Local,
    /// Remote call over HTTP
    RemoteHttp,
    /// Remote call over gRPC
    RemoteGrpc,
    /// Outer invocation followed by nested steps
    Composite,
}

impl StepType {
    /// Returns the configuration spelling of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::RemoteHttp => "remote-http",
            Self::RemoteGrpc => "remote-grpc",
            Self::Composite => "composite",
        }
    }

    /// Returns true for the remote step types.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteHttp | Self::RemoteGrpc)
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(Self::Local),
            "remote-http" => Ok(Self::RemoteHttp),
            "remote-grpc" => Ok(Self::RemoteGrpc),
            "composite" => Ok(Self::Composite),
            other => Err(format!("unknown step type '{}'", other)),
        }
    }
}

/// Declarative description of one step.
///
/// The `type` field is kept as the raw configuration string so that an
/// unknown type surfaces as a compilation error naming the step, rather than
/// as an opaque parse failure of the whole file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique identifier within the workflow
    pub id: String,

    /// One of `local`, `remote-http`, `remote-grpc`, `composite`
    #[serde(rename = "type")]
    pub step_type: String,

    /// Processor name (local steps, optional outer logic of composites)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,

    /// Endpoint URI (remote steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Whether this step belongs to the workflow's parallel group
    #[serde(default)]
    pub parallel: bool,

    /// Steps run after the outer invocation of a composite step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_steps: Vec<StepDefinition>,

    /// Shared key receiving this step's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Shared keys this step reads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reads: Vec<String>,
}

impl StepDefinition {
    fn with_type(id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into().trim().to_string(),
            step_type: step_type.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Creates a local step invoking the named processor.
    ///
    /// # Example
    ///
    /// ```
    /// use orchestrator::workflow::StepDefinition;
    ///
    /// let step = StepDefinition::local("validate", "echo")
    ///     .with_output_key("subject")
    ///     .in_parallel();
    /// assert!(step.parallel);
    /// ```
    pub fn local(id: impl Into<String>, processor: impl Into<String>) -> Self {
        Self::with_type(id, StepType::Local).with_processor(processor)
    }

    /// Creates a step calling an HTTP endpoint.
    pub fn remote_http(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_type(id, StepType::RemoteHttp).with_endpoint(endpoint)
    }

    /// Creates a step calling a gRPC endpoint.
    pub fn remote_grpc(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_type(id, StepType::RemoteGrpc).with_endpoint(endpoint)
    }

    /// Creates a composite step over the given nested steps.
    pub fn composite(id: impl Into<String>, nested_steps: Vec<StepDefinition>) -> Self {
        let mut step = Self::with_type(id, StepType::Composite);
        step.nested_steps = nested_steps;
        step
    }

    /// Sets the processor name.
    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    /// Sets the endpoint URI.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the shared key receiving the step output.
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Moves this step into the parallel group.
    pub fn in_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Declares a shared key this step reads.
    pub fn reading(mut self, key: impl Into<String>) -> Self {
        self.reads.push(key.into());
        self
    }

    /// Parses the declared step type.
    pub fn kind(&self) -> Result<StepType, String> {
        self.step_type.parse()
    }
}

fn default_allow_parallel() -> bool {
    true
}

/// Declarative description of a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Identifier used to dispatch requests
    pub id: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Whether the parallel group runs at all
    #[serde(default = "default_allow_parallel")]
    pub allow_parallel_execution: bool,

    /// Upper bound for a whole run; the registry default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Steps in declaration order
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Creates an empty workflow definition.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: name.into(),
            allow_parallel_execution: true,
            timeout_seconds: None,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the run timeout.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Enables or disables the parallel group.
    pub fn with_parallel_execution(mut self, allow: bool) -> Self {
        self.allow_parallel_execution = allow;
        self
    }

    /// Steps that run one after another, in declaration order.
    pub fn sequential_steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter().filter(|s| !s.parallel)
    }

    /// Steps that make up the parallel group.
    pub fn parallel_steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter().filter(|s| s.parallel)
    }
}

/// Engine-wide settings read from the `settings` section.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Parallel steps running at once within one run (defaults to CPU count)
    pub max_parallel: Option<usize>,

    /// Timeout for workflows without their own
    pub default_timeout_seconds: u64,

    /// Timeout for each remote HTTP call
    pub http_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_parallel: None,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
        }
    }
}

/// Contents of a configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}
