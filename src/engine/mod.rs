//! Workflow execution engine module
//!
//! This module contains:
//! - `error` - Condition, step and batch error types
//! - `result` - Step, row and batch result types
//! - `selector` - Primary/fallback selector resolution
//! - `condition` - In-page condition evaluation and DOM checks
//! - `step_executor` - Executes a single step against a driver
//! - `runner` - Runs every step for one row
//! - `row_driver` - Runs a workflow over many rows, sequentially or concurrently

pub mod condition;
pub mod error;
pub mod result;
pub mod row_driver;
pub mod runner;
pub mod selector;
pub mod step_executor;

pub use condition::{build_dom_expression, coerce, ConditionEvaluator};
pub use error::{ConditionEvaluationError, ConditionFailure, RunError, StepError};
pub use result::{BatchResult, RowResult, RowState, RowStatus, StepOutcome};
pub use row_driver::{RowDriver, INTERRUPTED_MESSAGE};
pub use runner::WorkflowRunner;
pub use selector::{resolve_and_act, Resolved};
pub use step_executor::StepExecutor;
