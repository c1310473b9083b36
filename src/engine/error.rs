//! Engine error types

use std::time::Duration;

use crate::bridge::DriverError;

/// Why a condition could not be evaluated
#[derive(Debug, thiserror::Error)]
pub enum ConditionFailure {
    #[error("no active page to evaluate against")]
    NoActivePage,

    #[error("{0}")]
    Driver(#[from] DriverError),

    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid DOM check: {0}")]
    InvalidDomCheck(String),
}

/// The single error a condition evaluation can produce
#[derive(Debug, thiserror::Error)]
#[error("Failed to evaluate condition '{condition}': {cause}")]
pub struct ConditionEvaluationError {
    /// Condition text as written in the definition (before templating)
    pub condition: String,
    #[source]
    pub cause: ConditionFailure,
}

impl ConditionEvaluationError {
    pub fn new(condition: impl Into<String>, cause: ConditionFailure) -> Self {
        Self {
            condition: condition.into(),
            cause,
        }
    }

    /// The page connection is gone, not just this condition
    pub fn is_connection_lost(&self) -> bool {
        matches!(&self.cause, ConditionFailure::Driver(e) if e.is_connection_lost())
    }
}

/// Errors that can occur while executing a single step
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    Driver(#[from] DriverError),

    #[error("{action} timed out after {after:?}")]
    Timeout { action: String, after: Duration },

    #[error("{0}")]
    Condition(#[from] ConditionEvaluationError),
}

impl StepError {
    /// Connection-level failure: no later step on this page can succeed
    pub fn is_fatal(&self) -> bool {
        match self {
            StepError::Driver(e) => e.is_connection_lost(),
            StepError::Condition(e) => e.is_connection_lost(),
            StepError::Timeout { .. } => false,
        }
    }
}

/// Batch configuration errors, detected before any row starts
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Concurrent mode needs one page per row, but the driver factory shares a single page")]
    SharedPageInConcurrentMode,

    #[error("Batch size must be at least 1")]
    ZeroBatchSize,
}
