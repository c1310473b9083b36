//! Execution result types

use serde::{Deserialize, Serialize};

use crate::workflow::{RowContext, StepDefinition, StepKind};

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    /// Zero-based position in the workflow
    pub step_index: usize,
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Final (negation applied) value of a conditional step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_result: Option<bool>,
    /// Selector a click actually went through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_used: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
    /// Connection-level failure; the row cannot continue
    #[serde(default)]
    pub fatal: bool,
}

impl StepOutcome {
    pub fn success(step_index: usize, step: &StepDefinition) -> Self {
        Self {
            step_index,
            kind: step.kind(),
            description: step.description().to_string(),
            succeeded: true,
            error_message: None,
            condition_result: None,
            selector_used: None,
            fallback_used: false,
            fatal: false,
        }
    }

    pub fn failure(step_index: usize, step: &StepDefinition, error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_message: Some(error.into()),
            ..Self::success(step_index, step)
        }
    }

    pub fn with_condition(mut self, value: bool) -> Self {
        self.condition_result = Some(value);
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>, fallback_used: bool) -> Self {
        self.selector_used = Some(selector.into());
        self.fallback_used = fallback_used;
        self
    }

    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    /// Compact per-step fate for reports: `ok`, `false`, `fail(<error>)`
    pub fn fate(&self) -> String {
        match (self.succeeded, self.condition_result) {
            (true, Some(false)) => "false".to_string(),
            (true, _) if self.fallback_used => "ok(fallback)".to_string(),
            (true, _) => "ok".to_string(),
            (false, _) => format!("fail({})", self.error_message.as_deref().unwrap_or("")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Error,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Success => "success",
            RowStatus::Error => "error",
        }
    }
}

/// Terminal state of the per-row state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowState {
    Completed,
    Aborted,
}

/// Result of running the workflow for one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResult {
    pub row_index: usize,
    pub status: RowStatus,
    pub state: RowState,
    pub input_data: RowContext,
    pub step_outcomes: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Index of the conditional step that stopped the row early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
}

impl RowResult {
    /// A row that ended with an error before or during execution
    pub fn errored(
        row_index: usize,
        input_data: RowContext,
        step_outcomes: Vec<StepOutcome>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row_index,
            status: RowStatus::Error,
            state: RowState::Aborted,
            input_data,
            step_outcomes,
            error_message: Some(message.into()),
            halted_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RowStatus::Success
    }

    pub fn succeeded_steps(&self) -> usize {
        self.step_outcomes.iter().filter(|o| o.succeeded).count()
    }

    /// Human-readable result line used in reports
    pub fn summary(&self) -> String {
        let ok = self.succeeded_steps();
        let total = self.step_outcomes.len();

        if self.status == RowStatus::Error {
            return format!(
                "Failed: {} ({}/{} steps succeeded)",
                self.error_message.as_deref().unwrap_or("unknown error"),
                ok,
                total
            );
        }

        match self.halted_at {
            Some(idx) => format!(
                "Stopped early at step {} ({}/{} steps succeeded)",
                idx + 1,
                ok,
                total
            ),
            None => format!("Workflow completed ({}/{} steps succeeded)", ok, total),
        }
    }

    /// `1:ok;2:false;3:fail(...)`
    pub fn step_fates(&self) -> String {
        self.step_outcomes
            .iter()
            .map(|o| format!("{}:{}", o.step_index + 1, o.fate()))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Result of a whole batch, one entry per input row in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub workflow_name: String,
    pub run_id: String,
    pub rows: Vec<RowResult>,
}

impl BatchResult {
    pub fn new(workflow_name: impl Into<String>, rows: Vec<RowResult>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            rows,
        }
    }

    pub fn success_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.rows.len() - self.success_count()
    }

    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ClickStep, NavigationStep};

    fn nav() -> StepDefinition {
        StepDefinition::Navigation(NavigationStep {
            description: "open".to_string(),
            url: "https://example.com".to_string(),
        })
    }

    fn click() -> StepDefinition {
        StepDefinition::Click(ClickStep {
            description: String::new(),
            css_selector: "#go".to_string(),
            xpath: None,
        })
    }

    fn row(outcomes: Vec<StepOutcome>, halted_at: Option<usize>) -> RowResult {
        RowResult {
            row_index: 0,
            status: RowStatus::Success,
            state: RowState::Completed,
            input_data: RowContext::new(),
            step_outcomes: outcomes,
            error_message: None,
            halted_at,
        }
    }

    #[test]
    fn test_summary_completed() {
        let r = row(
            vec![
                StepOutcome::success(0, &nav()),
                StepOutcome::failure(1, &click(), "not found"),
                StepOutcome::success(2, &click()),
            ],
            None,
        );
        assert_eq!(r.summary(), "Workflow completed (2/3 steps succeeded)");
        assert_eq!(r.step_fates(), "1:ok;2:fail(not found);3:ok");
    }

    #[test]
    fn test_summary_stopped_early() {
        let r = row(
            vec![
                StepOutcome::success(0, &nav()),
                StepOutcome::success(1, &nav()).with_condition(false),
            ],
            Some(1),
        );
        assert_eq!(r.summary(), "Stopped early at step 2 (2/2 steps succeeded)");
        assert_eq!(r.step_fates(), "1:ok;2:false");
    }

    #[test]
    fn test_summary_error() {
        let r = RowResult::errored(4, RowContext::new(), vec![], "Driver disconnected");
        assert_eq!(r.summary(), "Failed: Driver disconnected (0/0 steps succeeded)");
        assert_eq!(r.state, RowState::Aborted);
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = StepOutcome::success(0, &click()).with_selector("//button", true);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["stepIndex"], 0);
        assert_eq!(json["kind"], "click");
        assert_eq!(json["selectorUsed"], "//button");
        assert_eq!(json["fallbackUsed"], true);
        assert!(json.get("errorMessage").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_batch_counts() {
        let batch = BatchResult::new(
            "wf",
            vec![
                row(vec![], None),
                RowResult::errored(1, RowContext::new(), vec![], "boom"),
            ],
        );
        assert_eq!(batch.success_count(), 1);
        assert_eq!(batch.error_count(), 1);
        assert!(!batch.is_success());
        assert_eq!(batch.run_id.len(), 36);
    }
}
