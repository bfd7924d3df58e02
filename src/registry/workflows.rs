//! Workflow Registry
//!
//! Compiled workflows keyed by ID. Read on every request, written at
//! startup; lookups never wait on each other.

use std::sync::Arc;

use dashmap::DashMap;
use log::{info, warn};

use crate::execution::workflow::Workflow;

#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: DashMap<String, Arc<Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a workflow under its ID.
    ///
    /// An existing workflow with the same ID is replaced and returned.
    pub fn register(&self, workflow: Workflow) -> Option<Arc<Workflow>> {
        let id = workflow.id().to_string();
        info!("Registered workflow: {} - {}", id, workflow.name());

        let previous = self.workflows.insert(id, Arc::new(workflow));
        if let Some(previous) = &previous {
            warn!("Workflow '{}' replaced", previous.id());
        }
        previous
    }

    pub fn get(&self, id: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    /// Registered IDs, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
