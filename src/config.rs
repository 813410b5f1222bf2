use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nodes::AgentHandler;
use crate::validation::ValidationOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Knobs for a run. Every field has a default, so an empty document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Hard ceiling on scheduled nodes per run.
    pub max_steps: usize,
    pub detect_cycles: bool,
    /// Tool-loop budget for agent nodes that do not set `maxSteps`.
    pub agent_max_steps: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            detect_cycles: false,
            agent_max_steps: crate::nodes::DEFAULT_AGENT_MAX_STEPS,
        }
    }
}

impl ExecutorConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            detect_cycles: self.detect_cycles,
        }
    }

    /// Agent handler preconfigured with this config's step budget.
    pub fn agent_handler(&self) -> AgentHandler {
        AgentHandler::new().with_default_max_steps(self.agent_max_steps)
    }
}
