//! Compiled Steps
//!
//! A [`Step`] is the executable form of a step definition. Processor names
//! and endpoints are resolved during compilation, so running a step never
//! looks anything up. Steps are immutable and shared through `Arc`.
//!
//! Executing a step:
//! - runs its invocation (local processor, remote call, or composite)
//! - publishes a successful output under the step's output key
//! - for composites, runs the nested steps in order and stops at the first
//!   failure

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::context::ExecutionContext;
use crate::registry::processors::{Processor, ProcessorOutput};
use crate::remote::{Protocol, RemoteCall, RemoteTransport};
use crate::workflow::model::StepType;

/// Outcome of running one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl StepResult {
    pub fn success(step_id: impl Into<String>, output: Option<Value>) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            error_message: None,
            output,
        }
    }

    pub fn failure(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            error_message: Some(message.into()),
            output: None,
        }
    }

    /// Failure message, empty for successful results.
    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or("")
    }
}

/// A processor together with the name it was resolved from.
#[derive(Clone)]
pub struct ProcessorRef {
    name: String,
    processor: Arc<dyn Processor>,
}

impl ProcessorRef {
    pub fn new(name: impl Into<String>, processor: Arc<dyn Processor>) -> Self {
        Self {
            name: name.into(),
            processor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, context: &ExecutionContext) -> ProcessorOutput {
        self.processor.process(context)
    }
}

/// What a step does when it runs.
#[derive(Clone)]
pub enum Invocation {
    /// In-process processor
    Local(ProcessorRef),
    /// Call through the transport configured for the protocol
    Remote {
        protocol: Protocol,
        endpoint: Url,
        transport: Arc<dyn RemoteTransport>,
    },
    /// Optional outer processor, then the nested steps in order
    Composite {
        outer: Option<ProcessorRef>,
        nested: Vec<Arc<Step>>,
    },
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(processor) => f.debug_tuple("Local").field(&processor.name).finish(),
            Self::Remote {
                protocol, endpoint, ..
            } => f
                .debug_struct("Remote")
                .field("protocol", protocol)
                .field("endpoint", &endpoint.as_str())
                .finish(),
            Self::Composite { outer, nested } => f
                .debug_struct("Composite")
                .field("outer", &outer.as_ref().map(ProcessorRef::name))
                .field("nested", nested)
                .finish(),
        }
    }
}

/// Executable unit of a workflow.
#[derive(Debug, Clone)]
pub struct Step {
    id: String,
    output_key: Option<String>,
    parallel: bool,
    invocation: Invocation,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        output_key: Option<String>,
        parallel: bool,
        invocation: Invocation,
    ) -> Self {
        Self {
            id: id.into(),
            output_key,
            parallel,
            invocation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn output_key(&self) -> Option<&str> {
        self.output_key.as_deref()
    }

    /// Whether the step was declared as part of the parallel group.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn kind(&self) -> StepType {
        match &self.invocation {
            Invocation::Local(_) => StepType::Local,
            Invocation::Remote {
                protocol: Protocol::Http,
                ..
            } => StepType::RemoteHttp,
            Invocation::Remote {
                protocol: Protocol::Grpc,
                ..
            } => StepType::RemoteGrpc,
            Invocation::Composite { .. } => StepType::Composite,
        }
    }

    /// Nested steps of a composite; empty for every other kind.
    pub fn nested(&self) -> &[Arc<Step>] {
        match &self.invocation {
            Invocation::Composite { nested, .. } => nested,
            _ => &[],
        }
    }

    /// Runs the step against the context and publishes its output.
    pub fn execute(&self, context: &ExecutionContext) -> StepResult {
        if context.is_cancelled() {
            return StepResult::failure(&self.id, "execution cancelled");
        }

        let result = match &self.invocation {
            Invocation::Local(processor) => self.finish(processor.process(context)),
            Invocation::Remote {
                endpoint,
                transport,
                ..
            } => {
                let call = RemoteCall::from_context(context, &self.id, endpoint.as_str());
                self.finish(transport.call(&call))
            }
            Invocation::Composite { outer, nested } => {
                self.execute_composite(outer.as_ref(), nested, context)
            }
        };

        self.publish(&result, context);
        result
    }

    fn finish(&self, outcome: ProcessorOutput) -> StepResult {
        match outcome {
            Ok(output) => StepResult::success(&self.id, output),
            Err(message) => StepResult::failure(&self.id, message),
        }
    }

    fn execute_composite(
        &self,
        outer: Option<&ProcessorRef>,
        nested: &[Arc<Step>],
        context: &ExecutionContext,
    ) -> StepResult {
        debug!("Composite {}: {} nested steps", self.id, nested.len());

        if let Some(outer) = outer {
            if let Err(message) = outer.process(context) {
                return StepResult::failure(&self.id, message);
            }
        }

        for step in nested {
            if context.is_cancelled() {
                return StepResult::failure(&self.id, "execution cancelled");
            }

            let result = step.execute(context);
            if !result.success {
                return StepResult::failure(
                    &self.id,
                    format!("Nested step '{}' failed: {}", step.id, result.message()),
                );
            }
        }

        StepResult::success(&self.id, Some(Value::Object(context.snapshot())))
    }

    fn publish(&self, result: &StepResult, context: &ExecutionContext) {
        if !result.success || context.is_cancelled() {
            return;
        }
        if let (Some(key), Some(output)) = (&self.output_key, &result.output) {
            debug!("Step {} result -> {}", self.id, key);
            context.put(key.clone(), output.clone());
        }
    }
}

/// Runs a step, turning a panic inside its processor or transport into a
/// failed result.
pub fn execute_step(step: &Step, context: &ExecutionContext) -> StepResult {
    match panic::catch_unwind(AssertUnwindSafe(|| step.execute(context))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());

            warn!("Step '{}' panicked: {}", step.id, reason);
            StepResult::failure(&step.id, format!("step panicked: {}", reason))
        }
    }
}
