//! JSON-RPC plumbing for driver processes
//!
//! Requests and responses are newline-delimited JSON-RPC 2.0 messages
//! exchanged over a child process's stdin/stdout. One background task owns
//! both pipes and routes each response to the caller waiting on its id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::DriverError;

/// JSON-RPC request
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    /// Convert into the caller-facing result
    pub fn into_result(self) -> Result<Value, DriverError> {
        match self.error {
            Some(err) => Err(DriverError::ServerError(format!(
                "[{}] {}",
                err.code, err.message
            ))),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Channel half that delivers one response to its caller
pub type ResponseSender = oneshot::Sender<Result<Value, DriverError>>;

/// Request sender type alias
pub type RequestSender = mpsc::Sender<(RpcRequest, ResponseSender)>;

/// Request receiver type alias
pub type RequestReceiver = mpsc::Receiver<(RpcRequest, ResponseSender)>;

/// Callers waiting on a response, keyed by request id
#[derive(Default)]
struct PendingRequests {
    waiters: HashMap<u64, ResponseSender>,
}

impl PendingRequests {
    /// Register a waiter, dropping those whose caller already gave up
    fn insert(&mut self, id: u64, response_tx: ResponseSender) {
        self.waiters.retain(|_, tx| !tx.is_closed());
        self.waiters.insert(id, response_tx);
    }

    fn complete(&mut self, response: RpcResponse) {
        if let Some(tx) = self.waiters.remove(&response.id) {
            let _ = tx.send(response.into_result());
        }
    }

    fn len(&self) -> usize {
        self.waiters.len()
    }
}

/// Global request ID counter
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Create a new RPC request with auto-incremented ID
pub fn new_request(method: &str, params: Value) -> RpcRequest {
    RpcRequest {
        jsonrpc: "2.0",
        id: REQUEST_ID.fetch_add(1, Ordering::SeqCst),
        method: method.to_string(),
        params,
    }
}

/// Send an RPC request and wait at most `timeout` for the response
pub async fn send_request(
    request_tx: &RequestSender,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<Value, DriverError> {
    let req = new_request(method, params);
    let (tx, rx) = oneshot::channel();

    request_tx
        .send((req, tx))
        .await
        .map_err(|_| DriverError::Disconnected)?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(response) => response.map_err(|_| DriverError::Disconnected)?,
        Err(_) => Err(DriverError::Timeout(timeout)),
    }
}

/// Spawn the background communication task for JSON-RPC over a pipe pair
pub fn spawn_communication_task<W, R>(mut request_rx: RequestReceiver, writer: W, reader: R)
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = writer;
        let mut reader = BufReader::new(reader);
        let mut pending = PendingRequests::default();
        let mut line = String::new();

        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    match request {
                        Some((req, response_tx)) => {
                            let id = req.id;
                            let json = match serde_json::to_string(&req) {
                                Ok(json) => json + "\n",
                                Err(e) => {
                                    let _ = response_tx
                                        .send(Err(DriverError::SerializationError(e)));
                                    continue;
                                }
                            };
                            debug!(id, method = %req.method, "rpc request");
                            if writer.write_all(json.as_bytes()).await.is_err()
                                || writer.flush().await.is_err()
                            {
                                let _ = response_tx.send(Err(DriverError::Disconnected));
                                break;
                            }
                            pending.insert(id, response_tx);
                        }
                        None => break,
                    }
                }

                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            match serde_json::from_str::<RpcResponse>(&line) {
                                Ok(response) => pending.complete(response),
                                Err(_) => {
                                    warn!(
                                        "Ignoring non-RPC output from driver: {}",
                                        line.trim_end()
                                    )
                                }
                            }
                            line.clear();
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Dropping the pending senders wakes every waiter with `Disconnected`
        debug!("rpc communication task stopped ({} requests pending)", pending.len());
    });
}
