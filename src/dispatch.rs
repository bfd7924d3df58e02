//! Dispatch Front Door
//!
//! Routes execution requests to registered workflows. Every request runs
//! against its own fresh context, so one `Dispatcher` can serve any number
//! of callers at once.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, DispatchError};
use crate::execution::context::{ExecutionContext, WorkflowStatus, ERROR_KEY};
use crate::execution::engine::Engine;
use crate::execution::workflow::Workflow;
use crate::registry::steps::StepRegistry;
use crate::registry::workflows::WorkflowRegistry;
use crate::workflow::model::OrchestratorConfig;

/// Request to execute a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub workflow_id: String,

    #[serde(default)]
    pub input_data: Value,
}

impl WorkflowRequest {
    pub fn new(workflow_id: impl Into<String>, input_data: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            input_data,
        }
    }
}

/// Outcome of a workflow execution.
///
/// `results` is the shared state at the end of the run, including the
/// reserved `error` entry when the run failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResponse {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub results: Map<String, Value>,
}

impl WorkflowResponse {
    fn failed(workflow_id: &str, message: String) -> Self {
        let mut results = Map::new();
        results.insert(ERROR_KEY.to_string(), Value::String(message));
        Self {
            workflow_id: workflow_id.to_string(),
            status: WorkflowStatus::Failed,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    /// Failure message of the run, if any.
    pub fn error(&self) -> Option<&str> {
        self.results.get(ERROR_KEY).and_then(Value::as_str)
    }
}

pub struct Dispatcher {
    workflows: WorkflowRegistry,
    engine: Engine,
}

impl Dispatcher {
    pub fn new(workflows: WorkflowRegistry, engine: Engine) -> Self {
        Self { workflows, engine }
    }

    /// Compiles and registers every workflow of a configuration.
    ///
    /// Stops at the first workflow that fails to compile; nothing is served
    /// from a partially valid configuration.
    pub fn from_config(
        config: &OrchestratorConfig,
        steps: &StepRegistry,
        engine: Engine,
    ) -> Result<Self, ConfigError> {
        let workflows = WorkflowRegistry::new();

        for definition in &config.workflows {
            let workflow = steps.compile_workflow(definition).map_err(|source| {
                ConfigError::Compilation {
                    workflow: definition.id.clone(),
                    source,
                }
            })?;
            workflows.register(workflow);
        }

        info!("Initialized {} workflows", workflows.len());
        Ok(Self::new(workflows, engine))
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Registered workflow IDs, sorted.
    pub fn list_workflows(&self) -> Vec<String> {
        self.workflows.list_ids()
    }

    pub fn resolve(&self, workflow_id: &str) -> Result<Arc<Workflow>, DispatchError> {
        self.workflows
            .get(workflow_id)
            .ok_or_else(|| DispatchError::NotFound(workflow_id.to_string()))
    }

    /// Executes the requested workflow and reports its outcome.
    ///
    /// Never panics on unknown workflows: they yield a `FAILED` response
    /// whose `error` result names the missing ID.
    pub fn execute(&self, request: &WorkflowRequest) -> WorkflowResponse {
        let workflow = match self.resolve(&request.workflow_id) {
            Ok(workflow) => workflow,
            Err(err) => {
                warn!("{}", err);
                return WorkflowResponse::failed(&request.workflow_id, err.to_string());
            }
        };

        info!("Executing workflow: {}", workflow.id());
        let context = Arc::new(ExecutionContext::for_request(
            workflow.id(),
            request.input_data.clone(),
        ));

        let report = self.engine.run(&workflow, &context);
        debug!("{}", report.timeline.summary());

        WorkflowResponse {
            workflow_id: workflow.id().to_string(),
            status: report.status,
            results: context.snapshot(),
        }
    }
}
