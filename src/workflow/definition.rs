//! Workflow and step definitions
//!
//! Definitions are read from recorded JSON workflows:
//!
//! ```json
//! {
//!   "name": "candidate-lookup",
//!   "steps": [
//!     { "type": "navigation", "url": "https://example.com/c/{candidateId}" },
//!     { "type": "conditional",
//!       "condition": { "selector": ".error-404", "checkType": "not_exists" },
//!       "onFalse": "skipRemaining" },
//!     { "type": "click", "cssSelector": "#open", "xpath": "//button[@id='open']" },
//!     { "type": "input", "cssSelector": "#note", "value": "Checked {candidateId}" }
//!   ]
//! }
//! ```
//!
//! Recorder-only fields (`timestamp`, `tabId`, `elementTag`, ...) are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::RowContext;
use super::template::{resolve, resolve_opt};

// ============================================================================
// Workflow
// ============================================================================

/// A complete workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (required)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Steps, executed in order for every row
    pub steps: Vec<StepDefinition>,
}

/// A definition problem found by [`WorkflowDefinition::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionIssue {
    pub step_index: usize,
    pub message: String,
}

impl fmt::Display for DefinitionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {}", self.step_index + 1, self.message)
    }
}

impl WorkflowDefinition {
    /// Number of conditional steps
    pub fn conditional_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_conditional()).count()
    }

    /// Static checks for a loaded definition.
    ///
    /// The engine does not call this; malformed DOM checks still fail at
    /// evaluation time. It backs the `validate` command.
    pub fn validate(&self) -> Vec<DefinitionIssue> {
        let mut issues = Vec::new();

        for (idx, step) in self.steps.iter().enumerate() {
            let mut push = |message: String| {
                issues.push(DefinitionIssue {
                    step_index: idx,
                    message,
                })
            };

            match step {
                StepDefinition::Navigation(nav) if nav.url.trim().is_empty() => {
                    push("navigation step has an empty url".to_string())
                }
                StepDefinition::Click(click) if click.css_selector.trim().is_empty() => {
                    if click.fallback().is_none() {
                        push("click step has neither cssSelector nor xpath".to_string())
                    }
                }
                StepDefinition::Input(input) if input.css_selector.trim().is_empty() => {
                    push("input step has an empty cssSelector".to_string())
                }
                StepDefinition::Conditional(cond) => match &cond.condition {
                    ConditionSpec::Expression(expr) if expr.trim().is_empty() => {
                        push("conditional step has an empty condition".to_string())
                    }
                    ConditionSpec::DomCheck(check) => {
                        if let Err(e) = check.validate() {
                            push(e)
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        issues
    }
}

// ============================================================================
// Steps
// ============================================================================

/// One declarative step, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDefinition {
    Navigation(NavigationStep),
    Click(ClickStep),
    Input(InputStep),
    Conditional(ConditionalStep),
}

/// Step kind, used in logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigation,
    Click,
    Input,
    Conditional,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Navigation => "navigation",
            StepKind::Click => "click",
            StepKind::Input => "input",
            StepKind::Conditional => "conditional",
        };
        f.write_str(name)
    }
}

impl StepDefinition {
    pub fn kind(&self) -> StepKind {
        match self {
            StepDefinition::Navigation(_) => StepKind::Navigation,
            StepDefinition::Click(_) => StepKind::Click,
            StepDefinition::Input(_) => StepKind::Input,
            StepDefinition::Conditional(_) => StepKind::Conditional,
        }
    }

    /// Human-readable description (diagnostics only)
    pub fn description(&self) -> &str {
        match self {
            StepDefinition::Navigation(s) => &s.description,
            StepDefinition::Click(s) => &s.description,
            StepDefinition::Input(s) => &s.description,
            StepDefinition::Conditional(s) => &s.description,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, StepDefinition::Conditional(_))
    }

    /// One-line rendering with every template field resolved against a row
    pub fn preview(&self, ctx: &RowContext) -> String {
        match self {
            StepDefinition::Navigation(s) => format!("navigate {}", resolve(&s.url, ctx)),
            StepDefinition::Click(s) => {
                let selector = resolve(&s.css_selector, ctx);
                match s.fallback() {
                    Some(xpath) => format!("click {} (fallback {})", selector, resolve(xpath, ctx)),
                    None => format!("click {}", selector),
                }
            }
            StepDefinition::Input(s) => format!(
                "fill {} = {:?}",
                resolve(&s.css_selector, ctx),
                resolve(&s.value, ctx)
            ),
            StepDefinition::Conditional(s) => {
                let condition = match &s.condition {
                    ConditionSpec::Expression(expr) => resolve(expr, ctx),
                    ConditionSpec::DomCheck(check) => check.resolve(Some(ctx)).to_string(),
                };
                let negate = if s.negate { "not " } else { "" };
                format!("if {}{} else {:?}", negate, condition, s.on_false)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStep {
    #[serde(default)]
    pub description: String,
    /// Template string
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickStep {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub css_selector: String,
    /// Structural fallback used when the CSS selector fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

impl ClickStep {
    /// The fallback selector, ignoring empty recordings
    pub fn fallback(&self) -> Option<&str> {
        self.xpath
            .as_deref()
            .map(str::trim)
            .filter(|x| !x.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputStep {
    #[serde(default)]
    pub description: String,
    pub css_selector: String,
    /// Template string
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalStep {
    #[serde(default)]
    pub description: String,
    pub condition: ConditionSpec,
    #[serde(default)]
    pub negate: bool,
    #[serde(default, alias = "on_false")]
    pub on_false: OnFalse,
    /// Message used when this condition halts the row
    #[serde(default, alias = "stop_message", skip_serializing_if = "Option::is_none")]
    pub stop_message: Option<String>,
}

impl ConditionalStep {
    /// Text identifying the condition in logs and errors
    pub fn label(&self) -> String {
        match &self.condition {
            ConditionSpec::Expression(expr) => expr.clone(),
            ConditionSpec::DomCheck(check) => check.to_string(),
        }
    }
}

/// What the runner does when a conditional step evaluates false
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnFalse {
    /// Stop executing further steps, row still completes
    #[default]
    #[serde(alias = "skip_remaining")]
    SkipRemaining,
    /// Fail the row
    #[serde(alias = "abort_row")]
    AbortRow,
    /// Keep going regardless of the result
    Continue,
}

// ============================================================================
// Conditions
// ============================================================================

/// A raw JS boolean expression or a canned DOM predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    /// Template string evaluated as a boolean JS expression in the page
    Expression(String),
    DomCheck(DomCheckSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Exists,
    NotExists,
    ContainsText,
    /// Exists and has an offset parent. Elements hidden with
    /// `visibility: hidden` or zero opacity still count as visible.
    Visible,
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckType::Exists => "exists",
            CheckType::NotExists => "not_exists",
            CheckType::ContainsText => "contains_text",
            CheckType::Visible => "visible",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomCheckSpec {
    /// Template string
    pub selector: String,
    #[serde(alias = "check_type")]
    pub check_type: CheckType,
    /// Template string, required for `contains_text`
    #[serde(default, alias = "expected_text", skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
}

impl DomCheckSpec {
    pub fn new(selector: impl Into<String>, check_type: CheckType) -> Self {
        Self {
            selector: selector.into(),
            check_type,
            expected_text: None,
        }
    }

    pub fn contains_text(selector: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            check_type: CheckType::ContainsText,
            expected_text: Some(expected.into()),
        }
    }

    /// Copy with `selector` and `expected_text` resolved against a row
    pub fn resolve(&self, ctx: Option<&RowContext>) -> Self {
        Self {
            selector: resolve_opt(&self.selector, ctx),
            check_type: self.check_type,
            expected_text: self.expected_text.as_deref().map(|t| resolve_opt(t, ctx)),
        }
    }

    /// `expected_text` must be present and non-empty for `contains_text`
    pub fn validate(&self) -> Result<(), String> {
        if self.check_type == CheckType::ContainsText
            && self.expected_text.as_deref().map_or(true, str::is_empty)
        {
            return Err(format!(
                "expectedText is required for contains_text check on '{}'",
                self.selector
            ));
        }
        Ok(())
    }
}

impl fmt::Display for DomCheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expected_text {
            Some(text) => write!(f, "{}({}, '{}')", self.check_type, self.selector, text),
            None => write!(f, "{}({})", self.check_type, self.selector),
        }
    }
}
