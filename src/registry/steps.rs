//! Step Registry
//!
//! Turns declarative step definitions into executable steps. Processor names
//! and transports are resolved here so nothing is looked up during a run.
//! Compilation is pure: it touches neither the network nor the filesystem.

use std::sync::Arc;

use log::debug;

use crate::error::CompilationError;
use crate::execution::step::{Invocation, ProcessorRef, Step};
use crate::execution::workflow::Workflow;
use crate::remote::{Protocol, TransportRegistry};
use crate::workflow::model::{StepDefinition, StepType, WorkflowDefinition, DEFAULT_TIMEOUT_SECONDS};
use crate::workflow::validator::{check_unique_ids, parse_endpoint, validate_step, validate_workflow};

use super::processors::ProcessorRegistry;

/// Compiles step and workflow definitions.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    processors: ProcessorRegistry,
    transports: TransportRegistry,
    default_timeout_seconds: u64,
}

impl StepRegistry {
    pub fn new(processors: ProcessorRegistry, transports: TransportRegistry) -> Self {
        Self {
            processors,
            transports,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    /// Sets the timeout applied to workflows that do not declare one.
    pub fn with_default_timeout(mut self, seconds: u64) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    /// Compiles a list of step definitions in declaration order.
    ///
    /// Fails with the first problem found; step IDs must be unique across the
    /// whole tree.
    pub fn compile(&self, steps: &[StepDefinition]) -> Result<Vec<Arc<Step>>, CompilationError> {
        check_unique_ids(steps)?;
        self.compile_all(steps)
    }

    /// Compiles a workflow definition.
    ///
    /// Steps flagged `parallel` form the parallel group; the rest keep their
    /// declared order as the sequential group.
    pub fn compile_workflow(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<Workflow, CompilationError> {
        let timeout_seconds = definition
            .timeout_seconds
            .unwrap_or(self.default_timeout_seconds);
        validate_workflow(definition, timeout_seconds)?;

        let sequential: Vec<StepDefinition> = definition.sequential_steps().cloned().collect();
        let parallel: Vec<StepDefinition> = definition.parallel_steps().cloned().collect();

        let workflow = Workflow::new(
            definition.id.as_str(),
            definition.name.as_str(),
            self.compile_all(&sequential)?,
            self.compile_all(&parallel)?,
        )
        .with_parallel_execution(definition.allow_parallel_execution)
        .with_timeout_seconds(timeout_seconds);

        debug!(
            "Compiled workflow {}: {} sequential, {} parallel, timeout {}s",
            workflow.id(),
            workflow.sequential_steps().len(),
            workflow.parallel_steps().len(),
            timeout_seconds
        );
        Ok(workflow)
    }

    fn compile_all(&self, steps: &[StepDefinition]) -> Result<Vec<Arc<Step>>, CompilationError> {
        steps.iter().map(|step| self.compile_step(step)).collect()
    }

    fn compile_step(&self, definition: &StepDefinition) -> Result<Arc<Step>, CompilationError> {
        let step_type = validate_step(definition)?;

        let invocation = match step_type {
            StepType::Local => Invocation::Local(self.resolve_processor(definition)?),
            StepType::RemoteHttp => self.remote(definition, step_type, Protocol::Http)?,
            StepType::RemoteGrpc => self.remote(definition, step_type, Protocol::Grpc)?,
            StepType::Composite => {
                let outer = match definition.processor {
                    Some(_) => Some(self.resolve_processor(definition)?),
                    None => None,
                };
                Invocation::Composite {
                    outer,
                    nested: self.compile_all(&definition.nested_steps)?,
                }
            }
        };

        Ok(Arc::new(Step::new(
            definition.id.as_str(),
            definition.output_key.clone(),
            definition.parallel,
            invocation,
        )))
    }

    fn resolve_processor(&self, definition: &StepDefinition) -> Result<ProcessorRef, CompilationError> {
        let name = definition.processor.as_deref().unwrap_or_default();
        self.processors
            .get(name)
            .map(|processor| ProcessorRef::new(name, processor))
            .ok_or_else(|| CompilationError::UnknownProcessor {
                step: definition.id.clone(),
                processor: name.to_string(),
            })
    }

    fn remote(
        &self,
        definition: &StepDefinition,
        step_type: StepType,
        protocol: Protocol,
    ) -> Result<Invocation, CompilationError> {
        let endpoint = parse_endpoint(
            &definition.id,
            step_type,
            definition.endpoint.as_deref().unwrap_or_default(),
        )?;
        let transport =
            self.transports
                .get(protocol)
                .ok_or_else(|| CompilationError::MissingTransport {
                    step: definition.id.clone(),
                    protocol,
                })?;

        Ok(Invocation::Remote {
            protocol,
            endpoint,
            transport,
        })
    }
}
