//! Workflow runner for a single row
//!
//! Per-row state machine: `Pending -> Running -> {Completed, Aborted}`.
//!
//! - Non-conditional step failures are logged and the row moves on.
//! - A conditional step that is not true applies its `onFalse` policy:
//!   `continue` ignores it, `skipRemaining` stops the row but completes it,
//!   `abortRow` fails the row.
//! - A connection-level driver failure aborts the row with status `error`.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::result::{RowResult, RowState, RowStatus, StepOutcome};
use super::step_executor::StepExecutor;
use crate::bridge::Driver;
use crate::workflow::{
    ConditionalStep, OnFalse, PacingConfig, RowContext, StepDefinition, TimeoutConfig,
    WorkflowDefinition,
};

pub struct WorkflowRunner {
    workflow: Arc<WorkflowDefinition>,
    timeouts: TimeoutConfig,
    pacing: PacingConfig,
}

/// What the runner does after a step
enum Control {
    Next,
    Halt,
    Abort(String),
}

impl WorkflowRunner {
    pub fn new(workflow: impl Into<Arc<WorkflowDefinition>>) -> Self {
        Self {
            workflow: workflow.into(),
            timeouts: TimeoutConfig::default(),
            pacing: PacingConfig::default(),
        }
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Run every step for one row against the given page
    #[instrument(skip(self, ctx, driver), fields(workflow = %self.workflow.name))]
    pub async fn run_row(
        &self,
        row_index: usize,
        ctx: RowContext,
        driver: Arc<dyn Driver>,
    ) -> RowResult {
        info!(
            "Running workflow '{}' ({} steps)",
            self.workflow.name,
            self.workflow.steps.len()
        );

        let executor = StepExecutor::new(driver, self.timeouts.clone(), self.pacing.clone());
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(self.workflow.steps.len());
        let mut halted_at = None;

        for (idx, step) in self.workflow.steps.iter().enumerate() {
            let outcome = executor.execute(idx, step, &ctx).await;
            let control = self.control_after(idx, step, &outcome);
            outcomes.push(outcome);

            match control {
                Control::Next => {}
                Control::Halt => {
                    halted_at = Some(idx);
                    break;
                }
                Control::Abort(message) => {
                    error!("Row {} aborted: {}", row_index + 1, message);
                    return RowResult::errored(row_index, ctx, outcomes, message);
                }
            }
        }

        let result = RowResult {
            row_index,
            status: RowStatus::Success,
            state: RowState::Completed,
            input_data: ctx,
            step_outcomes: outcomes,
            error_message: None,
            halted_at,
        };
        info!("Row {} completed: {}", row_index + 1, result.summary());
        result
    }

    fn control_after(&self, idx: usize, step: &StepDefinition, outcome: &StepOutcome) -> Control {
        let error = outcome.error_message.as_deref().unwrap_or("unknown error");

        if outcome.fatal {
            return Control::Abort(format!("Fatal error at step {}: {}", idx + 1, error));
        }

        match step {
            StepDefinition::Conditional(cond) => {
                if outcome.condition_result == Some(true) {
                    return Control::Next;
                }
                self.apply_on_false(idx, cond, outcome)
            }
            _ => {
                if !outcome.succeeded {
                    warn!("Step {} failed, continuing: {}", idx + 1, error);
                }
                Control::Next
            }
        }
    }

    fn apply_on_false(&self, idx: usize, cond: &ConditionalStep, outcome: &StepOutcome) -> Control {
        // An evaluation failure leaves the condition unconfirmed, which is treated as false
        let reason = match &outcome.error_message {
            Some(err) => err.clone(),
            None => format!("Condition not met at step {}: {}", idx + 1, cond.label()),
        };

        match cond.on_false {
            OnFalse::Continue => {
                info!("{}; continuing", reason);
                Control::Next
            }
            OnFalse::SkipRemaining => {
                match &cond.stop_message {
                    Some(msg) => info!("{}; skipping remaining steps", msg),
                    None => info!("{}; skipping remaining steps", reason),
                }
                Control::Halt
            }
            OnFalse::AbortRow => Control::Abort(cond.stop_message.clone().unwrap_or(reason)),
        }
    }
}
