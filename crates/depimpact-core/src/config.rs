//! Configuration document: the target module and its consumer fleet.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ImpactError, Result};

/// One downstream repository whose test suite serves as an impact signal for
/// the candidate module change. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    /// Display name used in reports and logs.
    pub name: String,

    /// Repository URL handed to the version-control tool.
    pub repo_url: String,

    /// Branch to check out.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Subdirectory containing the consumer module, when it does not live at
    /// the repository root.
    #[serde(default)]
    pub module_dir: Option<String>,

    /// Explicit package patterns passed to the test runner.
    #[serde(default)]
    pub packages: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactConfig {
    /// Module identifier the candidate replaces in each consumer.
    pub target_module: String,

    /// Consumers analyzed in order.
    pub consumers: Vec<Consumer>,
}

impl ImpactConfig {
    /// Load and validate a JSON configuration document.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ImpactError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_module.is_empty() {
            return Err(ImpactError::Config(
                "target_module must not be empty".to_string(),
            ));
        }
        for consumer in &self.consumers {
            if consumer.name.is_empty() {
                return Err(ImpactError::Config(
                    "consumer name must not be empty".to_string(),
                ));
            }
            if consumer.repo_url.is_empty() {
                return Err(ImpactError::Config(format!(
                    "consumer {}: repo_url must not be empty",
                    consumer.name
                )));
            }
        }
        Ok(())
    }
}
