//! Processor Registry
//!
//! Local steps name a processor; the names are resolved against this
//! registry once, when steps are compiled. The registry is populated at
//! startup and handed to the step registry explicitly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::execution::context::{ExecutionContext, INPUT_KEY};

/// Outcome of a processor: optional output on success, message on failure.
pub type ProcessorOutput = Result<Option<Value>, String>;

/// In-process step logic.
///
/// Processors read whatever they need from the context. Their output is
/// published under the step's `outputKey` by the engine; a processor that
/// writes to the shared map directly must only touch keys its step owns.
pub trait Processor: Send + Sync {
    fn process(&self, context: &ExecutionContext) -> ProcessorOutput;
}

impl<F> Processor for F
where
    F: Fn(&ExecutionContext) -> ProcessorOutput + Send + Sync,
{
    fn process(&self, context: &ExecutionContext) -> ProcessorOutput {
        self(context)
    }
}

/// Name → processor mapping.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in processors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Registers a processor, replacing any previous one with the same name.
    pub fn register<P>(&mut self, name: impl Into<String>, processor: P) -> &mut Self
    where
        P: Processor + 'static,
    {
        let name = name.into();
        if self.processors.insert(name.clone(), Arc::new(processor)).is_some() {
            warn!("Processor '{}' replaced", name);
        } else {
            debug!("Registered processor '{}'", name);
        }
        self
    }

    /// Resolves a processor by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

/// Registers the processors that ship with the engine:
///
/// - `noop`: succeeds without output
/// - `echo`: outputs the request payload
/// - `snapshot`: outputs a copy of the shared state
pub fn register_builtins(registry: &mut ProcessorRegistry) {
    registry
        .register("noop", |_: &ExecutionContext| -> ProcessorOutput { Ok(None) })
        .register("echo", |context: &ExecutionContext| -> ProcessorOutput {
            Ok(context.input_value(INPUT_KEY).cloned())
        })
        .register("snapshot", |context: &ExecutionContext| -> ProcessorOutput {
            Ok(Some(Value::Object(context.snapshot())))
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ProcessorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProcessorRegistry::new();
        registry.register("double", |context: &ExecutionContext| -> ProcessorOutput {
            let n = context
                .input_value(INPUT_KEY)
                .and_then(Value::as_i64)
                .ok_or("input is not a number")?;
            Ok(Some(json!(n * 2)))
        });

        let processor = registry.get("double").unwrap();
        let context = ExecutionContext::for_request("w", json!(21));
        assert_eq!(processor.process(&context), Ok(Some(json!(42))));

        let context = ExecutionContext::for_request("w", json!("x"));
        assert_eq!(
            processor.process(&context),
            Err("input is not a number".to_string())
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProcessorRegistry::new();
        registry.register("p", |_: &ExecutionContext| -> ProcessorOutput { Ok(Some(json!(1))) });
        registry.register("p", |_: &ExecutionContext| -> ProcessorOutput { Ok(Some(json!(2))) });

        let context = ExecutionContext::new("w", Map::new());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("p").unwrap().process(&context), Ok(Some(json!(2))));
    }

    #[test]
    fn test_builtins() {
        let registry = ProcessorRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["echo", "noop", "snapshot"]);

        let context = ExecutionContext::for_request("w", json!({ "id": 7 }));
        context.put("x", json!(true));

        assert_eq!(registry.get("noop").unwrap().process(&context), Ok(None));
        assert_eq!(
            registry.get("echo").unwrap().process(&context),
            Ok(Some(json!({ "id": 7 })))
        );
        assert_eq!(
            registry.get("snapshot").unwrap().process(&context),
            Ok(Some(json!({ "x": true })))
        );
    }

    #[test]
    fn test_debug_lists_names() {
        let registry = ProcessorRegistry::with_builtins();
        let rendered = format!("{:?}", registry);
        assert!(rendered.contains("echo"));
    }
}
