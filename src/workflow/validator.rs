//! Definition Validation
//!
//! Structural checks applied to step and workflow definitions before they
//! are compiled:
//! - Required and forbidden fields per step type
//! - Endpoint URI syntax
//! - Unique step IDs across a whole step tree
//! - Key ownership between co-parallel steps

use std::collections::{HashMap, HashSet};

use log::debug;
use url::Url;

use super::model::{StepDefinition, StepType, WorkflowDefinition};
use crate::error::CompilationError;

/// Shared key reserved for the failure message of a run.
pub const RESERVED_ERROR_KEY: &str = "error";

/// Suffix of the per-step keys recording parallel failures.
pub const STEP_ERROR_SUFFIX: &str = ".error";

/// Validates the fields of a single step (not its nested steps).
///
/// Returns the parsed step type on success.
pub fn validate_step(step: &StepDefinition) -> Result<StepType, CompilationError> {
    if step.id.trim().is_empty() {
        return Err(CompilationError::EmptyStepId);
    }

    let step_type = step
        .kind()
        .map_err(|_| CompilationError::UnknownStepType {
            step: step.id.clone(),
            step_type: step.step_type.clone(),
        })?;

    let forbid = |present: bool, field: &'static str| {
        if present {
            Err(CompilationError::UnexpectedField {
                step: step.id.clone(),
                step_type,
                field,
            })
        } else {
            Ok(())
        }
    };

    match step_type {
        StepType::Local => {
            if step.processor.is_none() {
                return Err(CompilationError::MissingField {
                    step: step.id.clone(),
                    step_type,
                    field: "processor",
                });
            }
            forbid(step.endpoint.is_some(), "endpoint")?;
            forbid(!step.nested_steps.is_empty(), "nestedSteps")?;
        }
        StepType::RemoteHttp | StepType::RemoteGrpc => {
            if step.endpoint.is_none() {
                return Err(CompilationError::MissingField {
                    step: step.id.clone(),
                    step_type,
                    field: "endpoint",
                });
            }
            forbid(step.processor.is_some(), "processor")?;
            forbid(!step.nested_steps.is_empty(), "nestedSteps")?;
        }
        StepType::Composite => {
            forbid(step.endpoint.is_some(), "endpoint")?;
            if step.nested_steps.is_empty() {
                return Err(CompilationError::EmptyComposite(step.id.clone()));
            }
        }
    }

    if let Some(key) = &step.output_key {
        if is_reserved_key(key) {
            return Err(CompilationError::ReservedOutputKey {
                step: step.id.clone(),
                key: key.clone(),
            });
        }
    }

    Ok(step_type)
}

/// Returns true for keys the engine writes itself.
pub fn is_reserved_key(key: &str) -> bool {
    key == RESERVED_ERROR_KEY || key.ends_with(STEP_ERROR_SUFFIX)
}

/// Parses the endpoint of a remote step.
///
/// HTTP steps need an `http` or `https` URL; gRPC steps additionally accept
/// `grpc` and `grpcs`. Every endpoint must name a host.
pub fn parse_endpoint(
    step_id: &str,
    step_type: StepType,
    endpoint: &str,
) -> Result<Url, CompilationError> {
    let invalid = |reason: String| CompilationError::InvalidEndpoint {
        step: step_id.to_string(),
        endpoint: endpoint.to_string(),
        reason,
    };

    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(invalid("endpoint is empty".to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;

    let allowed: &[&str] = match step_type {
        StepType::RemoteGrpc => &["grpc", "grpcs", "http", "https"],
        _ => &["http", "https"],
    };
    if !allowed.contains(&url.scheme()) {
        return Err(invalid(format!(
            "scheme '{}' is not supported for {} steps",
            url.scheme(),
            step_type
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("endpoint has no host".to_string()));
    }

    Ok(url)
}

/// Checks that step IDs are unique across the given steps and everything
/// nested below them.
pub fn check_unique_ids(steps: &[StepDefinition]) -> Result<(), CompilationError> {
    fn visit<'a>(
        steps: &'a [StepDefinition],
        seen: &mut HashSet<&'a str>,
    ) -> Result<(), CompilationError> {
        for step in steps {
            if !seen.insert(step.id.as_str()) {
                return Err(CompilationError::DuplicateStepId(step.id.clone()));
            }
            visit(&step.nested_steps, seen)?;
        }
        Ok(())
    }

    visit(steps, &mut HashSet::new())
}

/// Keys a step writes, including the keys of its nested steps.
fn written_keys(step: &StepDefinition, keys: &mut Vec<String>) {
    if let Some(key) = &step.output_key {
        keys.push(key.clone());
    }
    for nested in &step.nested_steps {
        written_keys(nested, keys);
    }
}

/// Keys a step reads, including the keys read by its nested steps.
fn read_keys(step: &StepDefinition, keys: &mut Vec<String>) {
    keys.extend(step.reads.iter().cloned());
    for nested in &step.nested_steps {
        read_keys(nested, keys);
    }
}

/// Checks that co-parallel steps are data independent.
///
/// Each key may be written by at most one step of the group, and no step may
/// declare a read of a key written by one of its siblings.
pub fn check_parallel_independence(steps: &[&StepDefinition]) -> Result<(), CompilationError> {
    let mut writers: HashMap<String, &str> = HashMap::new();

    for step in steps {
        let mut keys = Vec::new();
        written_keys(step, &mut keys);
        for key in keys {
            if let Some(first) = writers.get(&key) {
                if *first != step.id {
                    return Err(CompilationError::ConflictingOutputKey {
                        key,
                        first: first.to_string(),
                        second: step.id.clone(),
                    });
                }
            }
            writers.insert(key, step.id.as_str());
        }
    }

    for step in steps {
        let mut keys = Vec::new();
        read_keys(step, &mut keys);
        for key in keys {
            match writers.get(&key) {
                Some(writer) if *writer != step.id => {
                    return Err(CompilationError::ParallelDataDependency {
                        reader: step.id.clone(),
                        writer: writer.to_string(),
                        key,
                    });
                }
                _ => {}
            }
        }
    }

    debug!(
        "Parallel group of {} steps is data independent ({} owned keys)",
        steps.len(),
        writers.len()
    );
    Ok(())
}

/// Validates workflow-level fields and the relationships between its steps.
///
/// `timeout_seconds` is the effective timeout after defaults are applied.
pub fn validate_workflow(
    workflow: &WorkflowDefinition,
    timeout_seconds: u64,
) -> Result<(), CompilationError> {
    if workflow.id.trim().is_empty() {
        return Err(CompilationError::EmptyWorkflowId);
    }
    if workflow.steps.is_empty() {
        return Err(CompilationError::EmptyWorkflow(workflow.id.clone()));
    }
    if timeout_seconds == 0 {
        return Err(CompilationError::InvalidTimeout(workflow.id.clone()));
    }

    check_unique_ids(&workflow.steps)?;

    let parallel: Vec<&StepDefinition> = workflow.parallel_steps().collect();
    check_parallel_independence(&parallel)
}
