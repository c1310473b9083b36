//! Workflow definition loader
//!
//! Load recorded JSON workflow definitions from files or directories.

use std::path::Path;

use super::WorkflowDefinition;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error in {file}: {error}")]
    Json {
        file: String,
        error: serde_json::Error,
    },

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Invalid configuration in {file}: {message}")]
    Invalid { file: String, message: String },
}

pub struct WorkflowLoader;

impl WorkflowLoader {
    /// Load every `*.json` workflow in a directory, sorted by file name
    pub fn load_directory(dir: &Path) -> Result<Vec<WorkflowDefinition>, LoadError> {
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(|p| Self::load_file(p)).collect()
    }

    pub fn load_file(path: &Path) -> Result<WorkflowDefinition, LoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn load_str(json: &str) -> Result<WorkflowDefinition, LoadError> {
        Self::parse(json, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<WorkflowDefinition, LoadError> {
        let workflow: WorkflowDefinition =
            serde_json::from_str(content).map_err(|e| LoadError::Json {
                file: origin.to_string(),
                error: e,
            })?;
        tracing::debug!(
            "Loaded workflow '{}' from {} ({} steps)",
            workflow.name,
            origin,
            workflow.steps.len()
        );
        Ok(workflow)
    }
}
