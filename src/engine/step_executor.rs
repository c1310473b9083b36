//! Step execution
//!
//! Dispatches one [`StepDefinition`] to the driver. Failures never escape
//! `execute`: they come back as a failed [`StepOutcome`], and the runner
//! decides what happens next.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument};

use super::condition::ConditionEvaluator;
use super::error::StepError;
use super::result::StepOutcome;
use super::selector::resolve_and_act;
use crate::bridge::{Driver, DriverError};
use crate::workflow::template::resolve;
use crate::workflow::{PacingConfig, RowContext, StepDefinition, TimeoutConfig};

pub struct StepExecutor {
    driver: Arc<dyn Driver>,
    evaluator: ConditionEvaluator,
    timeouts: TimeoutConfig,
    pacing: PacingConfig,
}

impl StepExecutor {
    pub fn new(driver: Arc<dyn Driver>, timeouts: TimeoutConfig, pacing: PacingConfig) -> Self {
        let evaluator = ConditionEvaluator::new(driver.clone(), timeouts.action());
        Self {
            driver,
            evaluator,
            timeouts,
            pacing,
        }
    }

    /// Execute one step, then wait out the step pacing delay
    #[instrument(skip(self, step, ctx), fields(kind = %step.kind()))]
    pub async fn execute(
        &self,
        step_index: usize,
        step: &StepDefinition,
        ctx: &RowContext,
    ) -> StepOutcome {
        if step.description().is_empty() {
            info!("Executing step {}: {}", step_index + 1, step.kind());
        } else {
            info!(
                "Executing step {}: {} ({})",
                step_index + 1,
                step.kind(),
                step.description()
            );
        }

        let outcome = match self.dispatch(step_index, step, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Step {} failed: {}", step_index + 1, e);
                StepOutcome::failure(step_index, step, e.to_string()).with_fatal(e.is_fatal())
            }
        };

        let delay = self.pacing.step_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        outcome
    }

    async fn dispatch(
        &self,
        step_index: usize,
        step: &StepDefinition,
        ctx: &RowContext,
    ) -> Result<StepOutcome, StepError> {
        match step {
            StepDefinition::Navigation(nav) => {
                let url = resolve(&nav.url, ctx);
                info!("Navigating to {}", url);
                bounded("navigate", self.timeouts.action(), self.driver.navigate(&url)).await?;
                Ok(StepOutcome::success(step_index, step))
            }

            StepDefinition::Click(click) => {
                let primary = resolve(&click.css_selector, ctx);
                let fallback = click.fallback().map(|xpath| resolve(xpath, ctx));
                let timeout = self.timeouts.click();
                let driver = &self.driver;

                let resolved =
                    resolve_and_act(&primary, fallback.as_deref(), |selector| async move {
                        bounded("click", timeout, driver.click(&selector, timeout)).await
                    })
                    .await?;

                info!("Clicked {}", resolved.selector);
                Ok(StepOutcome::success(step_index, step)
                    .with_selector(resolved.selector, resolved.fallback_used))
            }

            StepDefinition::Input(input) => {
                let selector = resolve(&input.css_selector, ctx);
                let value = resolve(&input.value, ctx);
                info!("Filling {}", selector);
                bounded(
                    "fill",
                    self.timeouts.action(),
                    self.driver.fill(&selector, &value),
                )
                .await?;
                Ok(StepOutcome::success(step_index, step))
            }

            StepDefinition::Conditional(cond) => {
                let value = self
                    .evaluator
                    .evaluate_spec(&cond.condition, Some(ctx), cond.negate)
                    .await?;
                Ok(StepOutcome::success(step_index, step).with_condition(value))
            }
        }
    }
}

/// Bound a driver call so an unresponsive page cannot hang the row
async fn bounded<T>(
    action: &str,
    after: Duration,
    call: impl Future<Output = Result<T, DriverError>>,
) -> Result<T, StepError> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StepError::Timeout {
            action: action.to_string(),
            after,
        }),
    }
}
