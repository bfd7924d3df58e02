//! Configuration Parser
//!
//! Loads workflow definitions from a YAML file. JSON files are accepted as
//! well since YAML is a superset of JSON.
//!
//! Parsing only checks the shape of the document. Structural problems inside
//! step definitions (unknown types, missing processors, empty composites) are
//! reported by the step registry when the workflows are compiled.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use super::model::OrchestratorConfig;
use crate::error::ConfigError;

/// Loads and parses a configuration file.
///
/// # Example
///
/// ```rust,no_run
/// use orchestrator::workflow::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("workflows.yaml")?;
///     println!("{} workflows declared", config.workflows.len());
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<OrchestratorConfig, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    info!("Loading workflow configuration from: {}", display);

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;

    debug!("Configuration loaded ({} bytes)", content.len());
    parse_config(&content, &display)
}

/// Parses configuration text. `origin` names the source in error messages.
pub fn parse_config(content: &str, origin: &str) -> Result<OrchestratorConfig, ConfigError> {
    let config: OrchestratorConfig =
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

    if config.workflows.is_empty() {
        warn!("Configuration '{}' declares no workflows", origin);
    }

    let step_count: usize = config.workflows.iter().map(|w| w.steps.len()).sum();
    info!(
        "Parsed {} workflows with {} top-level steps",
        config.workflows.len(),
        step_count
    );

    Ok(config)
}
