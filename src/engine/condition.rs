//! Condition evaluation
//!
//! Conditions are boolean JS expressions evaluated in the page by the
//! driver, either written out in the definition or synthesized from a
//! [`DomCheckSpec`]. Every failure along the way (no page, driver error,
//! timeout, malformed DOM check) surfaces as one
//! [`ConditionEvaluationError`] carrying the condition text and the cause.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{ConditionEvaluationError, ConditionFailure};
use crate::bridge::Driver;
use crate::workflow::template::resolve_opt;
use crate::workflow::{CheckType, ConditionSpec, DomCheckSpec, RowContext};

pub struct ConditionEvaluator {
    driver: Arc<dyn Driver>,
    timeout: Duration,
}

impl ConditionEvaluator {
    pub fn new(driver: Arc<dyn Driver>, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    /// Evaluate a JS expression against the active page.
    ///
    /// `{column}` placeholders are resolved first when a context is given.
    pub async fn evaluate(
        &self,
        condition: &str,
        ctx: Option<&RowContext>,
        negate: bool,
    ) -> Result<bool, ConditionEvaluationError> {
        let expression = resolve_opt(condition, ctx);
        info!("Evaluating condition: {}", expression);

        let value = self
            .evaluate_expression(&expression)
            .await
            .map_err(|cause| ConditionEvaluationError::new(condition, cause))?;

        let final_result = if negate { !value } else { value };
        info!(
            "Condition result: {} (raw: {}, negated: {})",
            final_result, value, negate
        );
        Ok(final_result)
    }

    /// Evaluate one of the canned DOM predicates
    pub async fn evaluate_dom_check(
        &self,
        check: &DomCheckSpec,
        ctx: Option<&RowContext>,
    ) -> Result<bool, ConditionEvaluationError> {
        let label = check.to_string();

        let resolved = check.resolve(ctx);

        let expression = build_dom_expression(&resolved)
            .map_err(|cause| ConditionEvaluationError::new(label.as_str(), cause))?;
        debug!("DOM check {} -> {}", resolved, expression);

        let value = self
            .evaluate_expression(&expression)
            .await
            .map_err(|cause| ConditionEvaluationError::new(label.as_str(), cause))?;
        info!("DOM check {}: {}", resolved, value);
        Ok(value)
    }

    /// Evaluate whichever form a conditional step carries, applying `negate`
    pub async fn evaluate_spec(
        &self,
        condition: &ConditionSpec,
        ctx: Option<&RowContext>,
        negate: bool,
    ) -> Result<bool, ConditionEvaluationError> {
        match condition {
            ConditionSpec::Expression(expr) => self.evaluate(expr, ctx, negate).await,
            ConditionSpec::DomCheck(check) => {
                let value = self.evaluate_dom_check(check, ctx).await?;
                Ok(if negate { !value } else { value })
            }
        }
    }

    async fn evaluate_expression(&self, expression: &str) -> Result<bool, ConditionFailure> {
        let page = tokio::time::timeout(self.timeout, self.driver.current_page())
            .await
            .map_err(|_| ConditionFailure::Timeout(self.timeout))??
            .ok_or(ConditionFailure::NoActivePage)?;

        let raw = tokio::time::timeout(self.timeout, self.driver.evaluate(&page, expression))
            .await
            .map_err(|_| ConditionFailure::Timeout(self.timeout))??;

        Ok(coerce(&raw))
    }
}

/// Synthesize the JS expression for a DOM check.
///
/// Selector and expected text are embedded as JSON string literals.
pub fn build_dom_expression(check: &DomCheckSpec) -> Result<String, ConditionFailure> {
    check.validate().map_err(ConditionFailure::InvalidDomCheck)?;

    let selector = js_string(&check.selector);
    let expression = match check.check_type {
        CheckType::Exists => format!("document.querySelector({}) !== null", selector),
        CheckType::NotExists => format!("document.querySelector({}) === null", selector),
        CheckType::Visible => format!(
            "(() => {{ const el = document.querySelector({}); \
             return el !== null && el.offsetParent !== null; }})()",
            selector
        ),
        CheckType::ContainsText => {
            let text = js_string(check.expected_text.as_deref().unwrap_or_default());
            format!(
                "(() => {{ const el = document.querySelector({}); \
                 return el !== null && el.textContent.includes({}); }})()",
                selector, text
            )
        }
    };
    Ok(expression)
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// JS truthiness for a non-boolean evaluation result
pub fn coerce(value: &Value) -> bool {
    let coerced = match value {
        Value::Bool(b) => return *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    };
    warn!("Condition result was not boolean ({}), coerced to {}", value, coerced);
    coerced
}
