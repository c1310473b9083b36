#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use replay_actions::bridge::{Driver, DriverError, DriverFactory, PageHandle};
use replay_actions::workflow::{
    PacingConfig, RowContext, RunnerConfig, TimeoutConfig, WorkflowDefinition, WorkflowLoader,
};
use serde_json::{json, Value};
use tempfile::TempDir;

// ============================================================================
// Filesystem helpers
// ============================================================================

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_workflow(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write workflow file");
}

pub fn write_runner_config(dir: &Path, content: &str) {
    fs::write(dir.join("runner.yaml"), content).expect("Failed to write runner.yaml");
}

// ============================================================================
// Workflow builders
// ============================================================================

pub fn nav(url: &str) -> Value {
    json!({ "type": "navigation", "url": url })
}

pub fn click(css: &str) -> Value {
    json!({ "type": "click", "cssSelector": css })
}

pub fn click_with_xpath(css: &str, xpath: &str) -> Value {
    json!({ "type": "click", "cssSelector": css, "xpath": xpath })
}

pub fn input(css: &str, value: &str) -> Value {
    json!({ "type": "input", "cssSelector": css, "value": value })
}

pub fn conditional(condition: &str, on_false: &str) -> Value {
    json!({ "type": "conditional", "condition": condition, "onFalse": on_false })
}

pub fn dom_conditional(selector: &str, check_type: &str, on_false: &str) -> Value {
    json!({
        "type": "conditional",
        "condition": { "selector": selector, "checkType": check_type },
        "onFalse": on_false
    })
}

pub fn workflow_json(name: &str, steps: Vec<Value>) -> String {
    serde_json::to_string_pretty(&json!({ "name": name, "steps": steps })).unwrap()
}

pub fn workflow(name: &str, steps: Vec<Value>) -> WorkflowDefinition {
    WorkflowLoader::load_str(&workflow_json(name, steps)).expect("valid workflow")
}

pub fn row(pairs: &[(&str, &str)]) -> RowContext {
    RowContext::from_pairs(pairs.iter().copied())
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        click_ms: 200,
        action_ms: 200,
    }
}

/// Config with no pacing and short timeouts
pub fn fast_config() -> RunnerConfig {
    RunnerConfig {
        pacing: PacingConfig::none(),
        timeouts: fast_timeouts(),
        ..RunnerConfig::default()
    }
}

// ============================================================================
// Stub driver
// ============================================================================

static SELECTOR_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"querySelector\(("(?:[^"\\]|\\.)*")\)"#).unwrap());
static INCLUDES_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"includes\(("(?:[^"\\]|\\.)*")\)"#).unwrap());

#[derive(Debug, Clone)]
pub struct StubElement {
    pub text: String,
    pub visible: bool,
}

/// A fake DOM: selector -> element
#[derive(Debug, Clone, Default)]
pub struct StubPage {
    pub elements: HashMap<String, StubElement>,
}

impl StubPage {
    /// Answer the expressions produced for DOM checks
    fn answer_dom_check(&self, expression: &str) -> Option<Value> {
        let selector: String = serde_json::from_str(&SELECTOR_ARG.captures(expression)?[1]).ok()?;
        let element = self.elements.get(&selector);

        let value = if expression.contains("offsetParent") {
            element.map_or(false, |e| e.visible)
        } else if let Some(cap) = INCLUDES_ARG.captures(expression) {
            let expected: String = serde_json::from_str(&cap[1]).ok()?;
            element.map_or(false, |e| e.text.contains(&expected))
        } else if expression.contains("=== null") {
            element.is_none()
        } else {
            element.is_some()
        };
        Some(Value::Bool(value))
    }
}

#[derive(Default)]
struct StubState {
    page: Option<StubPage>,
    calls: Vec<String>,
    broken_selectors: HashSet<String>,
    hanging_selectors: HashSet<String>,
    expressions: HashMap<String, Value>,
    evaluate_error: Option<String>,
    disconnect_on: Option<String>,
    panic_on: Option<String>,
    navigate_delay: Duration,
}

/// Scripted in-memory driver
pub struct StubDriver {
    state: Mutex<StubState>,
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StubDriver {
    /// A driver with an empty page
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                page: Some(StubPage::default()),
                ..StubState::default()
            }),
        }
    }

    /// `current_page()` returns `None`
    pub fn without_page(self) -> Self {
        self.state.lock().unwrap().page = None;
        self
    }

    pub fn with_element(self, selector: &str, text: &str) -> Self {
        self.insert_element(selector, text, true)
    }

    /// Present in the DOM but without an offset parent
    pub fn with_hidden_element(self, selector: &str) -> Self {
        self.insert_element(selector, "", false)
    }

    fn insert_element(self, selector: &str, text: &str, visible: bool) -> Self {
        if let Some(page) = self.state.lock().unwrap().page.as_mut() {
            page.elements.insert(
                selector.to_string(),
                StubElement {
                    text: text.to_string(),
                    visible,
                },
            );
        }
        self
    }

    /// Clicks and fills on this selector fail
    pub fn with_broken_selector(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .broken_selectors
            .insert(selector.to_string());
        self
    }

    /// Clicks on this selector never return
    pub fn with_hanging_selector(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .hanging_selectors
            .insert(selector.to_string());
        self
    }

    /// Result for a raw expression
    pub fn with_expression(self, expression: &str, value: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .expressions
            .insert(expression.to_string(), value);
        self
    }

    pub fn with_evaluate_error(self, message: &str) -> Self {
        self.state.lock().unwrap().evaluate_error = Some(message.to_string());
        self
    }

    /// Navigating to `url` fails with a lost connection
    pub fn disconnect_on(self, url: &str) -> Self {
        self.state.lock().unwrap().disconnect_on = Some(url.to_string());
        self
    }

    /// Navigating to `url` panics
    pub fn panic_on(self, url: &str) -> Self {
        self.state.lock().unwrap().panic_on = Some(url.to_string());
        self
    }

    pub fn with_navigate_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().navigate_delay = delay;
        self
    }

    /// Every driver call made so far, e.g. `click:#go`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.record(format!("navigate:{}", url));
        let (delay, disconnect, panic) = {
            let state = self.state.lock().unwrap();
            (
                state.navigate_delay,
                state.disconnect_on.as_deref() == Some(url),
                state.panic_on.as_deref() == Some(url),
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if panic {
            panic!("stub driver panicked on {}", url);
        }
        if disconnect {
            return Err(DriverError::Disconnected);
        }
        Ok(())
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.record(format!("click:{}", selector));
        let (broken, hanging) = {
            let state = self.state.lock().unwrap();
            (
                state.broken_selectors.contains(selector),
                state.hanging_selectors.contains(selector),
            )
        };
        if hanging {
            std::future::pending::<()>().await;
        }
        if broken {
            return Err(DriverError::ServerError(format!(
                "No element matches selector {}",
                selector
            )));
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.record(format!("fill:{}={}", selector, value));
        if self.state.lock().unwrap().broken_selectors.contains(selector) {
            return Err(DriverError::ServerError(format!(
                "No element matches selector {}",
                selector
            )));
        }
        Ok(())
    }

    async fn current_page(&self) -> Result<Option<PageHandle>, DriverError> {
        let has_page = self.state.lock().unwrap().page.is_some();
        Ok(has_page.then(|| PageHandle::new("stub-page")))
    }

    async fn evaluate(&self, _page: &PageHandle, expression: &str) -> Result<Value, DriverError> {
        self.record(format!("evaluate:{}", expression));
        let state = self.state.lock().unwrap();

        if let Some(message) = &state.evaluate_error {
            return Err(DriverError::ServerError(message.clone()));
        }
        if let Some(value) = state.expressions.get(expression) {
            return Ok(value.clone());
        }
        if let Some(value) = state.page.as_ref().and_then(|p| p.answer_dom_check(expression)) {
            return Ok(value);
        }
        Err(DriverError::ServerError(format!(
            "ReferenceError: cannot evaluate {}",
            expression
        )))
    }
}

// ============================================================================
// Stub factory
// ============================================================================

type DriverBuilder = Box<dyn Fn(usize) -> StubDriver + Send + Sync>;

/// Builds a fresh stub driver per row and tracks page usage
pub struct StubFactory {
    build: DriverBuilder,
    failing_rows: HashSet<usize>,
    pub drivers: Mutex<Vec<(usize, Arc<StubDriver>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    released: AtomicUsize,
}

impl StubFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(usize) -> StubDriver + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
            failing_rows: HashSet::new(),
            drivers: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Every row gets an empty default page
    pub fn blank() -> Self {
        Self::new(|_| StubDriver::new())
    }

    /// `acquire` fails for this row
    pub fn failing_for_row(mut self, row_index: usize) -> Self {
        self.failing_rows.insert(row_index);
        self
    }

    /// Highest number of pages held at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.drivers.lock().unwrap().len()
    }

    /// The driver handed to a row
    pub fn driver_for(&self, row_index: usize) -> Option<Arc<StubDriver>> {
        self.drivers
            .lock()
            .unwrap()
            .iter()
            .find(|(idx, _)| *idx == row_index)
            .map(|(_, d)| d.clone())
    }
}

#[async_trait]
impl DriverFactory for StubFactory {
    async fn acquire(&self, row_index: usize) -> Result<Arc<dyn Driver>, DriverError> {
        if self.failing_rows.contains(&row_index) {
            return Err(DriverError::StartupFailed(format!(
                "no page for row {}",
                row_index
            )));
        }

        let driver = Arc::new((self.build)(row_index));
        self.drivers.lock().unwrap().push((row_index, driver.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(driver)
    }

    async fn release(&self, _driver: Arc<dyn Driver>) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
