//! Configuration for the ogma CLI.
//!
//! Loaded from `ogma.toml` (explicit `--config` path, else the XDG config
//! directory), with environment overrides for the agent command and model.
//! Every field has a sensible default so the CLI works without a file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ogma_batch::DEFAULT_GRAPH_CEILING;
use ogma_indexer::OrchestratorConfig;
use ogma_runner::{DEFAULT_MAX_ATTEMPTS, RunnerConfig};
use ogma_types::Thoroughness;

/// XDG config directory for ogma.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ogma"))
}

/// XDG data directory for ogma (database, logs).
pub fn xdg_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("ogma"))
}

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OgmaConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// External agent executable.
    pub agent_command: PathBuf,
    /// Tool-server binary staged into agent workdirs.
    pub toolserver_command: PathBuf,
    /// Model identifier passed to the agent.
    pub model: String,
    /// Graph-indexing queue ceiling.
    pub graph_ceiling: usize,
    /// Agent attempt ceiling for retryable failures.
    pub max_attempts: u32,
    /// Root directory for task workdirs.
    pub workdir_root: PathBuf,
    /// Keep task workdirs after completion (debugging).
    pub keep_workdirs: bool,
}

impl Default for OgmaConfig {
    fn default() -> Self {
        let data = xdg_data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            db_path: data.join("graph.db"),
            agent_command: PathBuf::from("ogma-agent"),
            toolserver_command: PathBuf::from("ogma-toolserver"),
            model: "default".to_string(),
            graph_ceiling: DEFAULT_GRAPH_CEILING,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            workdir_root: std::env::temp_dir().join("ogma"),
            keep_workdirs: false,
        }
    }
}

impl OgmaConfig {
    /// Load configuration.
    ///
    /// Resolution: explicit path if given, else `ogma.toml` in the XDG
    /// config dir, else defaults. `OGMA_AGENT` and `OGMA_MODEL` override
    /// the agent command and model after loading.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => xdg_config_dir().map(|d| d.join("ogma.toml")).filter(|p| p.exists()),
        };

        let mut config = match resolved {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(agent) = std::env::var("OGMA_AGENT") {
            config.agent_command = PathBuf::from(agent);
        }
        if let Ok(model) = std::env::var("OGMA_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Derive the runner configuration.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            agent_command: self.agent_command.clone(),
            toolserver_command: self.toolserver_command.clone(),
            model: self.model.clone(),
            workdir_root: self.workdir_root.clone(),
            max_attempts: self.max_attempts,
            keep_workdirs: self.keep_workdirs,
        }
    }

    /// Derive the orchestrator configuration.
    pub fn orchestrator_config(&self, thorough: bool) -> OrchestratorConfig {
        OrchestratorConfig {
            thoroughness: if thorough {
                Thoroughness::Thorough
            } else {
                Thoroughness::Quick
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OgmaConfig::default();
        assert_eq!(config.graph_ceiling, DEFAULT_GRAPH_CEILING);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(!config.keep_workdirs);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ogma.toml");
        std::fs::write(&path, "model = \"sonnet\"\ngraph_ceiling = 5\n").unwrap();

        let config = OgmaConfig::load(Some(&path)).unwrap();
        assert_eq!(config.model, "sonnet");
        assert_eq!(config.graph_ceiling, 5);
        // Unspecified fields keep their defaults
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_load_invalid_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ogma.toml");
        std::fs::write(&path, "graph_ceiling = \"not a number\"").unwrap();
        assert!(OgmaConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_thoroughness_mapping() {
        let config = OgmaConfig::default();
        assert_eq!(
            config.orchestrator_config(false).thoroughness,
            Thoroughness::Quick
        );
        assert_eq!(
            config.orchestrator_config(true).thoroughness,
            Thoroughness::Thorough
        );
    }
}
