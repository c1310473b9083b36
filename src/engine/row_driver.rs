//! Row driver
//!
//! Runs a workflow once per input row, sequentially or with bounded
//! concurrency:
//!
//! - `Sequential`: rows run one after another, `row_delay` apart.
//! - `Concurrent { batch_size }`: up to `batch_size` rows in flight, each on
//!   its own page from the [`DriverFactory`]. Row starts are still spaced
//!   `row_delay` apart.
//!
//! A batch always yields one [`RowResult`] per input row, in input order.
//! Failures inside a row (including a panic) never stop the batch.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::error::RunError;
use super::result::{BatchResult, RowResult};
use super::runner::WorkflowRunner;
use crate::bridge::DriverFactory;
use crate::workflow::{
    BatchMode, PacingConfig, RowContext, RunnerConfig, TimeoutConfig, WorkflowDefinition,
};

/// Error message for rows skipped after a shutdown request
pub const INTERRUPTED_MESSAGE: &str = "Run interrupted before row started";

pub struct RowDriver {
    workflow: Arc<WorkflowDefinition>,
    factory: Arc<dyn DriverFactory>,
    mode: BatchMode,
    pacing: PacingConfig,
    timeouts: TimeoutConfig,
    shutdown: Arc<AtomicBool>,
}

impl RowDriver {
    pub fn new(workflow: WorkflowDefinition, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            workflow: Arc::new(workflow),
            factory,
            mode: BatchMode::Sequential,
            pacing: PacingConfig::default(),
            timeouts: TimeoutConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(
        workflow: WorkflowDefinition,
        factory: Arc<dyn DriverFactory>,
        config: &RunnerConfig,
    ) -> Self {
        Self::new(workflow, factory)
            .mode(config.batch_mode())
            .pacing(config.pacing.clone())
            .timeouts(config.timeouts.clone())
    }

    pub fn mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Share a flag that stops new rows from starting once set
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run the workflow for every row
    #[instrument(skip(self, rows), fields(workflow = %self.workflow.name, rows = rows.len()))]
    pub async fn run(&self, rows: Vec<RowContext>) -> Result<BatchResult, RunError> {
        let runner = Arc::new(
            WorkflowRunner::new(self.workflow.clone())
                .pacing(self.pacing.clone())
                .timeouts(self.timeouts.clone()),
        );

        let results = match self.mode {
            BatchMode::Sequential => {
                info!("Processing {} rows sequentially", rows.len());
                self.run_sequential(runner, rows).await
            }
            BatchMode::Concurrent { batch_size } => {
                if batch_size == 0 {
                    return Err(RunError::ZeroBatchSize);
                }
                if self.factory.shares_page() {
                    return Err(RunError::SharedPageInConcurrentMode);
                }
                info!(
                    "Processing {} rows, up to {} at a time",
                    rows.len(),
                    batch_size
                );
                self.run_concurrent(runner, rows, batch_size).await
            }
        };

        let batch = BatchResult::new(self.workflow.name.clone(), results);
        info!(
            "Batch finished: {} rows, {} successful, {} errors",
            batch.rows.len(),
            batch.success_count(),
            batch.error_count()
        );
        Ok(batch)
    }

    async fn run_sequential(
        &self,
        runner: Arc<WorkflowRunner>,
        rows: Vec<RowContext>,
    ) -> Vec<RowResult> {
        let total = rows.len();
        let mut results = Vec::with_capacity(total);

        for (idx, ctx) in rows.into_iter().enumerate() {
            let row_delay = self.pacing.row_delay();
            if idx > 0 && !row_delay.is_zero() && !self.interrupted() {
                tokio::time::sleep(row_delay).await;
            }

            if self.interrupted() {
                warn!("Shutdown requested, skipping row {}", idx + 1);
                results.push(RowResult::errored(idx, ctx, vec![], INTERRUPTED_MESSAGE));
                continue;
            }

            info!("Processing row {}/{}", idx + 1, total);
            let result = run_one(&runner, &self.factory, idx, ctx).await;
            log_row_finished(&result, total);
            results.push(result);
        }

        results
    }

    async fn run_concurrent(
        &self,
        runner: Arc<WorkflowRunner>,
        rows: Vec<RowContext>,
        batch_size: usize,
    ) -> Vec<RowResult> {
        let row_delay = self.pacing.row_delay();
        let total = rows.len();
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let last_start: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let finished = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, ctx)| {
                let semaphore = semaphore.clone();
                let last_start = last_start.clone();
                let finished = finished.clone();
                let runner = runner.clone();
                let factory = self.factory.clone();
                let shutdown = self.shutdown.clone();

                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return RowResult::errored(idx, ctx, vec![], "Row scheduler closed");
                    };

                    // Space row starts out, as in sequential mode
                    {
                        let mut last = last_start.lock().await;
                        if let Some(prev) = *last {
                            if !shutdown.load(Ordering::SeqCst) {
                                tokio::time::sleep_until(prev + row_delay).await;
                            }
                        }
                        *last = Some(Instant::now());
                    }

                    if shutdown.load(Ordering::SeqCst) {
                        warn!("Shutdown requested, skipping row {}", idx + 1);
                        return RowResult::errored(idx, ctx, vec![], INTERRUPTED_MESSAGE);
                    }

                    info!("Starting row {}/{}", idx + 1, total);
                    let result = run_one(&runner, &factory, idx, ctx).await;
                    let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("Progress: {}/{} rows finished", done, total);
                    log_row_finished(&result, total);
                    result
                }
            })
            .collect();

        join_all(futures).await
    }
}

/// Acquire a page, run the row on its own task, give the page back
async fn run_one(
    runner: &Arc<WorkflowRunner>,
    factory: &Arc<dyn DriverFactory>,
    idx: usize,
    ctx: RowContext,
) -> RowResult {
    let driver = match factory.acquire(idx).await {
        Ok(driver) => driver,
        Err(e) => {
            error!("Could not open a page for row {}: {}", idx + 1, e);
            return RowResult::errored(idx, ctx, vec![], format!("Failed to open page: {}", e));
        }
    };

    let task = {
        let runner = runner.clone();
        let driver = driver.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { runner.run_row(idx, ctx, driver).await })
    };

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Row {} crashed: {}", idx + 1, e);
            RowResult::errored(idx, ctx, vec![], format!("Row execution panicked: {}", e))
        }
    };

    factory.release(driver).await;
    result
}

fn log_row_finished(result: &RowResult, total: usize) {
    if result.is_success() {
        info!("Row {}/{}: {}", result.row_index + 1, total, result.summary());
    } else {
        error!("Row {}/{}: {}", result.row_index + 1, total, result.summary());
    }
}
