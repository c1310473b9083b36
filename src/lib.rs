//! # Replay Actions
//!
//! A step replay engine for browser automation: a recorded workflow
//! (navigate, click, input, conditional) is replayed once per input row,
//! with `{column}` values from the row substituted into step fields.
//!
//! ## Features
//!
//! - **Templated steps** - `{column}` placeholders resolved per row, soft-failing on
//!   missing columns
//! - **Selector fallback** - Clicks retry through a recorded XPath when the CSS selector fails
//! - **Conditional steps** - In-page JS expressions or canned DOM checks decide whether a row
//!   continues, stops early, or fails
//! - **Row batching** - Sequential or bounded-concurrency runs, one page per concurrent row
//! - **Reports** - Per-row CSV and JSON reports with every step's fate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use replay_actions::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workflow = WorkflowLoader::load_file(Path::new("candidate-lookup.workflow.json"))?;
//!     let rows = read_rows("candidates.csv")?;
//!     let config = RunnerConfig::default();
//!
//!     let factory =
//!         Arc::new(PlaywrightFactory::launch(&config.driver, config.timeouts.action()).await?);
//!     let batch = RowDriver::from_config(workflow, factory.clone(), &config)
//!         .run(rows)
//!         .await?;
//!     factory.shutdown().await?;
//!
//!     let report = write_csv_report(&batch.rows, &config.output.prefix)?;
//!     println!("{} errors, report: {}", batch.error_count(), report.display());
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod engine;
pub mod io;
pub mod workflow;

// Re-export main types
pub use bridge::{
    Driver, DriverError, DriverFactory, PageHandle, PlaywrightBridge, PlaywrightDriver,
    PlaywrightFactory, SharedDriverFactory,
};
pub use engine::{
    BatchResult, ConditionEvaluationError, ConditionEvaluator, ConditionFailure, RowDriver,
    RowResult, RowState, RowStatus, RunError, StepError, StepExecutor, StepOutcome,
    WorkflowRunner,
};
pub use io::{read_rows, write_csv_report, write_json_report, ReportError, RowsError};
pub use workflow::{
    BatchMode, CheckType, ConditionSpec, DomCheckSpec, LoadError, OnFalse, RowContext,
    RunnerConfig, StepDefinition, WorkflowDefinition, WorkflowLoader,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{Driver, DriverFactory, PlaywrightFactory, SharedDriverFactory};
    pub use crate::engine::{BatchResult, RowDriver, RowResult, RowStatus, StepOutcome};
    pub use crate::io::{read_rows, write_csv_report, write_json_report};
    pub use crate::workflow::{
        RowContext, RunnerConfig, StepDefinition, WorkflowDefinition, WorkflowLoader,
    };
}
