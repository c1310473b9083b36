//! Driver seam for browser communication
//!
//! The engine never talks to a browser directly. Everything it needs goes
//! through the [`Driver`] trait:
//! - `navigate`, `click`, `fill` - page actions
//! - `current_page` / `evaluate` - page queries for condition evaluation
//!
//! A [`DriverFactory`] hands out one driver per row so concurrently running
//! rows never share a page. Submodules:
//! - `rpc`: JSON-RPC plumbing over a child process's stdin/stdout
//! - `playwright`: Playwright-backed driver via a Node.js server

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod playwright;
pub mod rpc;

pub use playwright::{PlaywrightBridge, PlaywrightDriver, PlaywrightFactory};

/// Common error type for driver operations
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to start driver: {0}")]
    StartupFailed(String),

    #[error("Driver disconnected")]
    Disconnected,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Driver error: {0}")]
    ServerError(String),

    #[error("No active page")]
    NoActivePage,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DriverError {
    /// Connection-level failures after which no further call on this driver can succeed
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DriverError::Disconnected | DriverError::StartupFailed(_))
    }
}

/// Opaque reference to the page a driver is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHandle {
    pub id: String,
}

impl PageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Browser capability used by the engine for a single row
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load a URL in the active page
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Click the element matched by a CSS or XPath selector
    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Replace the value of an input element
    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// The page actions and queries currently target, if any
    async fn current_page(&self) -> Result<Option<PageHandle>, DriverError>;

    /// Evaluate a JS expression in the page and return its value
    async fn evaluate(&self, page: &PageHandle, expression: &str) -> Result<Value, DriverError>;
}

/// Hands out drivers to rows
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a driver (page/context) for a row
    async fn acquire(&self, row_index: usize) -> Result<Arc<dyn Driver>, DriverError>;

    /// Give a driver back once its row is finished
    async fn release(&self, _driver: Arc<dyn Driver>) {}

    /// True if every acquired driver is the same underlying page
    fn shares_page(&self) -> bool {
        false
    }
}

/// Reuses one driver for every row.
///
/// Only valid for sequential runs (e.g. an already open, logged-in browser
/// session); the row driver refuses it in concurrent mode.
pub struct SharedDriverFactory {
    driver: Arc<dyn Driver>,
}

impl SharedDriverFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl DriverFactory for SharedDriverFactory {
    async fn acquire(&self, _row_index: usize) -> Result<Arc<dyn Driver>, DriverError> {
        Ok(self.driver.clone())
    }

    fn shares_page(&self) -> bool {
        true
    }
}
