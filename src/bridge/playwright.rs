//! Playwright driver - Communication with Playwright via JSON-RPC
//!
//! `PlaywrightBridge` owns a Node.js process running the Playwright server
//! script. `PlaywrightFactory` launches (or attaches to) one browser and
//! hands every row its own page, so concurrent rows never share one.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::rpc::{send_request, spawn_communication_task, RequestSender};
use super::{Driver, DriverError, DriverFactory, PageHandle};
use crate::workflow::{BrowserType, DriverConfig};

/// Extra time granted to the RPC round trip on top of Playwright's own timeout
const RPC_MARGIN: Duration = Duration::from_secs(5);

/// Bound for lifecycle calls (launch, new context, close)
const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct PlaywrightBridge {
    request_tx: RequestSender,
    /// Server process, killed when the bridge is dropped
    _child: Option<Mutex<Child>>,
    request_timeout: Duration,
}

impl PlaywrightBridge {
    /// Spawn the Playwright server process
    pub async fn start(
        config: &DriverConfig,
        request_timeout: Duration,
    ) -> Result<Self, DriverError> {
        info!("Starting Playwright driver ({} {})", config.node, config.script);

        let mut child = Command::new(&config.node)
            .arg(&config.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::StartupFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::StartupFailed("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::StartupFailed("driver stdout unavailable".to_string()))?;

        Ok(Self::over_pipes(stdin, stdout, Some(child), request_timeout))
    }

    /// Talk to a server over an already-open pipe pair
    fn over_pipes<W, R>(
        writer: W,
        reader: R,
        child: Option<Child>,
        request_timeout: Duration,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel(100);
        spawn_communication_task(request_rx, writer, reader);

        Self {
            request_tx,
            _child: child.map(Mutex::new),
            request_timeout,
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, DriverError> {
        self.request_with_timeout(method, params, self.request_timeout).await
    }

    async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        send_request(&self.request_tx, method, params, timeout).await
    }

    fn string_field(result: &Value, field: &str) -> Result<String, DriverError> {
        result[field]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DriverError::ServerError(format!("No {} returned", field)))
    }

    // Browser lifecycle
    pub async fn browser_launch(
        &self,
        browser_type: BrowserType,
        headless: bool,
    ) -> Result<String, DriverError> {
        let result = self
            .request_with_timeout(
                "browser.launch",
                json!({ "browserType": browser_type.as_str(), "headless": headless }),
                LIFECYCLE_TIMEOUT,
            )
            .await?;
        Self::string_field(&result, "browserId")
    }

    /// Attach to a running browser over the DevTools protocol
    pub async fn browser_connect(&self, endpoint: &str) -> Result<String, DriverError> {
        let result = self
            .request_with_timeout(
                "browser.connect",
                json!({ "endpoint": endpoint }),
                LIFECYCLE_TIMEOUT,
            )
            .await?;
        Self::string_field(&result, "browserId")
    }

    /// The first existing context of an attached browser (keeps its session cookies)
    pub async fn browser_default_context(&self, browser_id: &str) -> Result<String, DriverError> {
        let result = self
            .request_with_timeout(
                "browser.defaultContext",
                json!({ "browserId": browser_id }),
                LIFECYCLE_TIMEOUT,
            )
            .await?;
        Self::string_field(&result, "contextId")
    }

    pub async fn browser_close(&self, browser_id: &str) -> Result<(), DriverError> {
        self.request_with_timeout(
            "browser.close",
            json!({ "browserId": browser_id }),
            LIFECYCLE_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn context_new(&self, browser_id: &str) -> Result<String, DriverError> {
        let result = self
            .request_with_timeout(
                "context.new",
                json!({ "browserId": browser_id }),
                LIFECYCLE_TIMEOUT,
            )
            .await?;
        Self::string_field(&result, "contextId")
    }

    pub async fn context_close(&self, context_id: &str) -> Result<(), DriverError> {
        self.request_with_timeout(
            "context.close",
            json!({ "contextId": context_id }),
            LIFECYCLE_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    pub async fn page_new(&self, context_id: &str) -> Result<String, DriverError> {
        let result = self
            .request_with_timeout(
                "page.new",
                json!({ "contextId": context_id }),
                LIFECYCLE_TIMEOUT,
            )
            .await?;
        Self::string_field(&result, "pageId")
    }

    pub async fn page_close(&self, page_id: &str) -> Result<(), DriverError> {
        self.request("page.close", json!({ "pageId": page_id })).await?;
        Ok(())
    }

    // Page actions
    pub async fn page_goto(&self, page_id: &str, url: &str) -> Result<(), DriverError> {
        self.request("page.goto", json!({ "pageId": page_id, "url": url }))
            .await?;
        Ok(())
    }

    pub async fn page_evaluate(
        &self,
        page_id: &str,
        expression: &str,
    ) -> Result<Value, DriverError> {
        let result = self
            .request(
                "page.evaluate",
                json!({ "pageId": page_id, "expression": expression }),
            )
            .await?;
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    // Element actions
    pub async fn element_click(
        &self,
        page_id: &str,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        self.request_with_timeout(
            "element.click",
            json!({
                "pageId": page_id,
                "selector": selector,
                "timeout": timeout.as_millis() as u64,
            }),
            timeout + RPC_MARGIN,
        )
        .await?;
        Ok(())
    }

    pub async fn element_fill(
        &self,
        page_id: &str,
        selector: &str,
        value: &str,
    ) -> Result<(), DriverError> {
        self.request(
            "element.fill",
            json!({ "pageId": page_id, "selector": selector, "value": value }),
        )
        .await?;
        Ok(())
    }
}

/// A single Playwright page, bound to one row
pub struct PlaywrightDriver {
    bridge: Arc<PlaywrightBridge>,
    context_id: String,
    owns_context: bool,
    page_id: RwLock<Option<String>>,
}

impl PlaywrightDriver {
    async fn page_id(&self) -> Result<String, DriverError> {
        self.page_id
            .read()
            .await
            .clone()
            .ok_or(DriverError::NoActivePage)
    }

    /// Close the page (and the context if this driver created it)
    pub async fn close(&self) -> Result<(), DriverError> {
        let page_id = self.page_id.write().await.take();
        if self.owns_context {
            self.bridge.context_close(&self.context_id).await
        } else if let Some(page_id) = page_id {
            self.bridge.page_close(&page_id).await
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Driver for PlaywrightDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let page_id = self.page_id().await?;
        self.bridge.page_goto(&page_id, url).await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let page_id = self.page_id().await?;
        self.bridge.element_click(&page_id, selector, timeout).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let page_id = self.page_id().await?;
        self.bridge.element_fill(&page_id, selector, value).await
    }

    async fn current_page(&self) -> Result<Option<PageHandle>, DriverError> {
        Ok(self.page_id.read().await.clone().map(PageHandle::new))
    }

    async fn evaluate(&self, page: &PageHandle, expression: &str) -> Result<Value, DriverError> {
        self.bridge.page_evaluate(&page.id, expression).await
    }
}

/// Opens one page per row on a launched or attached browser
pub struct PlaywrightFactory {
    bridge: Arc<PlaywrightBridge>,
    browser_id: String,
    /// Set when attached to an existing browser: rows open pages in its first context
    shared_context: Option<String>,
    drivers: Mutex<Vec<Arc<PlaywrightDriver>>>,
}

impl PlaywrightFactory {
    pub async fn launch(
        config: &DriverConfig,
        request_timeout: Duration,
    ) -> Result<Self, DriverError> {
        let bridge = Arc::new(PlaywrightBridge::start(config, request_timeout).await?);

        let (browser_id, shared_context) = match &config.cdp_endpoint {
            Some(endpoint) => {
                info!("Attaching to existing browser at {}", endpoint);
                let browser_id = bridge.browser_connect(endpoint).await?;
                let context_id = bridge.browser_default_context(&browser_id).await?;
                (browser_id, Some(context_id))
            }
            None => {
                info!(
                    "Launching {} (headless: {})",
                    config.browser.as_str(),
                    config.headless
                );
                let browser_id = bridge.browser_launch(config.browser, config.headless).await?;
                (browser_id, None)
            }
        };

        Ok(Self {
            bridge,
            browser_id,
            shared_context,
            drivers: Mutex::new(Vec::new()),
        })
    }

    /// Close the launched browser. An attached browser is left open for its user.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        if self.shared_context.is_some() {
            debug!("Leaving attached browser open");
            return Ok(());
        }
        self.bridge.browser_close(&self.browser_id).await
    }
}

#[async_trait]
impl DriverFactory for PlaywrightFactory {
    async fn acquire(&self, row_index: usize) -> Result<Arc<dyn Driver>, DriverError> {
        let (context_id, owns_context) = match &self.shared_context {
            Some(context_id) => (context_id.clone(), false),
            None => (self.bridge.context_new(&self.browser_id).await?, true),
        };
        let page_id = match self.bridge.page_new(&context_id).await {
            Ok(page_id) => page_id,
            Err(e) => {
                if owns_context {
                    if let Err(close_err) = self.bridge.context_close(&context_id).await {
                        warn!("Failed to close context {}: {}", context_id, close_err);
                    }
                }
                return Err(e);
            }
        };
        debug!(row_index, page_id = %page_id, "Opened page for row");

        let driver = Arc::new(PlaywrightDriver {
            bridge: self.bridge.clone(),
            context_id,
            owns_context,
            page_id: RwLock::new(Some(page_id)),
        });
        self.drivers.lock().await.push(driver.clone());
        Ok(driver)
    }

    async fn release(&self, driver: Arc<dyn Driver>) {
        let owned = {
            let mut drivers = self.drivers.lock().await;
            let target = Arc::as_ptr(&driver) as *const ();
            drivers
                .iter()
                .position(|d| Arc::as_ptr(d) as *const () == target)
                .map(|idx| drivers.swap_remove(idx))
        };

        if let Some(driver) = owned {
            if let Err(e) = driver.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    type Requests = Arc<std::sync::Mutex<Vec<Value>>>;

    /// In-process Playwright server that records every request.
    /// `page.new` fails when `fail_page_new` is set.
    fn fake_bridge(fail_page_new: bool) -> (PlaywrightBridge, Requests) {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, mut server_write) = tokio::io::split(server);
        let requests: Requests = Arc::default();

        let seen = requests.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                seen.lock().unwrap().push(req.clone());

                let mut reply = match req["method"].as_str() {
                    Some("context.new") => json!({ "result": { "contextId": "c1" } }),
                    Some("page.new") if fail_page_new => json!({
                        "error": { "code": -32000, "message": "Target page has been closed" }
                    }),
                    Some("page.new") => json!({ "result": { "pageId": "p1" } }),
                    _ => json!({ "result": {} }),
                };
                reply["jsonrpc"] = json!("2.0");
                reply["id"] = req["id"].clone();
                let out = serde_json::to_string(&reply).unwrap() + "\n";
                server_write.write_all(out.as_bytes()).await.unwrap();
            }
        });

        let bridge =
            PlaywrightBridge::over_pipes(client_write, client_read, None, Duration::from_secs(5));
        (bridge, requests)
    }

    fn factory(bridge: PlaywrightBridge, shared_context: Option<&str>) -> PlaywrightFactory {
        PlaywrightFactory {
            bridge: Arc::new(bridge),
            browser_id: "b1".to_string(),
            shared_context: shared_context.map(str::to_string),
            drivers: Mutex::new(Vec::new()),
        }
    }

    fn methods(requests: &Requests) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_failed_page_closes_new_context() {
        let (bridge, requests) = fake_bridge(true);
        let factory = factory(bridge, None);

        let result = factory.acquire(0).await;
        assert!(matches!(result, Err(DriverError::ServerError(_))));

        assert_eq!(methods(&requests), vec!["context.new", "page.new", "context.close"]);
        assert_eq!(requests.lock().unwrap()[2]["params"]["contextId"], "c1");
        assert!(factory.drivers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_page_leaves_shared_context_open() {
        let (bridge, requests) = fake_bridge(true);
        let factory = factory(bridge, Some("default"));

        assert!(factory.acquire(0).await.is_err());
        assert_eq!(methods(&requests), vec!["page.new"]);
    }

    #[tokio::test]
    async fn test_release_closes_row_context() {
        let (bridge, requests) = fake_bridge(false);
        let factory = factory(bridge, None);

        let driver = match factory.acquire(3).await {
            Ok(driver) => driver,
            Err(e) => panic!("acquire failed: {}", e),
        };
        let page = driver.current_page().await.unwrap();
        assert_eq!(page, Some(PageHandle::new("p1")));

        factory.release(driver).await;
        assert_eq!(methods(&requests), vec!["context.new", "page.new", "context.close"]);
        assert!(factory.drivers.lock().await.is_empty());
    }
}
