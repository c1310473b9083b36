//! Workflow types and definitions
//!
//! This module contains all types for defining and feeding workflows:
//! - `definition` - WorkflowDefinition, StepDefinition and condition specs
//! - `context` - RowContext, the per-row variable map
//! - `template` - `{column}` placeholder substitution
//! - `loader` - Load workflow definitions from JSON files and directories
//! - `runner_config` - Row driver configuration (runner.yaml)

pub mod context;
pub mod definition;
pub mod loader;
pub mod runner_config;
pub mod template;

// Re-export all public types for convenience
pub use context::RowContext;
pub use definition::{
    CheckType, ClickStep, ConditionSpec, ConditionalStep, DefinitionIssue, DomCheckSpec,
    InputStep, NavigationStep, OnFalse, StepDefinition, StepKind, WorkflowDefinition,
};
pub use loader::{LoadError, WorkflowLoader};
pub use runner_config::{
    BatchMode, BrowserType, DriverConfig, ExecutionMode, OutputConfig, PacingConfig,
    RunnerConfig, TimeoutConfig,
};
pub use template::{resolve as resolve_template, TemplateError};
