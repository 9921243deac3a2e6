//! C1: Gateway Client — talks WebSocket/JSON to the IBM i database gateway.
//!
//! A single persistent WebSocket connection carries JSON-RPC-shaped
//! request/response envelopes (mirroring the MCP wire format used
//! elsewhere in this workspace), correlated by an incrementing request id
//! so many logical operations can be in flight over one socket. There is
//! no retry logic here by design: a failed call surfaces as `DatabaseError`
//! with no retries — the pool manager (C4) is the only layer allowed to retry
//! a *pool initialization*, never an in-flight query.

use crate::error::GatewayError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;

/// Credentials for one connection attempt, decrypted from a handshake or
/// read from static process configuration.
#[derive(Clone)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub ignore_unauthorized: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ignore_unauthorized", &self.ignore_unauthorized)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSizes {
    pub starting: u32,
    pub max: u32,
}

/// One row of column metadata as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Opaque handle to an open server-side cursor, used for `fetch_more` /
/// `close_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHandle(pub String);

/// The outcome of executing (or continuing to fetch) a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResult {
    pub data: Vec<serde_json::Value>,
    pub columns: Vec<ColumnMeta>,
    pub success: bool,
    #[serde(rename = "isDone")]
    pub is_done: bool,
    #[serde(rename = "sqlReturnCode")]
    pub sql_return_code: Option<i32>,
    #[serde(rename = "sqlState")]
    pub sql_state: Option<String>,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    #[serde(rename = "updateCount")]
    pub update_count: Option<u64>,
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
    /// Present only while `is_done` is false — identifies the open cursor
    /// for a subsequent `fetch_more`.
    pub query: Option<QueryHandle>,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn open_pool(
        &self,
        creds: &Credentials,
        sizes: PoolSizes,
    ) -> Result<PoolHandle, GatewayError>;

    async fn execute(
        &self,
        pool: &PoolHandle,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<GatewayResult, GatewayError>;

    async fn fetch_more(
        &self,
        pool: &PoolHandle,
        query: &QueryHandle,
        fetch_size: u32,
    ) -> Result<GatewayResult, GatewayError>;

    async fn close_query(&self, pool: &PoolHandle, query: &QueryHandle) -> Result<(), GatewayError>;

    async fn close_pool(&self, pool: &PoolHandle) -> Result<(), GatewayError>;

    async fn get_root_certificate(&self, endpoint: &str) -> Result<Vec<u8>, GatewayError>;
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    op: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// The transport underneath a [`PoolHandle`]. Kept as a trait object so
/// `PoolHandle` itself carries no `tokio-tungstenite` types — this is what
/// lets the pool manager's tests construct a handle without a live socket.
#[async_trait]
pub(crate) trait PoolTransport: Send + Sync {
    async fn call(&self, op: &str, params: serde_json::Value) -> Result<serde_json::Value, GatewayError>;
}

struct WsPoolTransport {
    sink: Mutex<
        futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            Message,
        >,
    >,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseEnvelope>>>>,
    next_id: AtomicU64,
    reader: tokio::task::JoinHandle<()>,
}

impl Drop for WsPoolTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PoolTransport for WsPoolTransport {
    async fn call(&self, op: &str, params: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let envelope = Envelope { id, op, params };
        let text = serde_json::to_string(&envelope)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| GatewayError::Connect {
                endpoint: "<pool>".to_string(),
                source: e,
            })?;

        let response = rx.await.map_err(|_| GatewayError::ConnectionClosed)?;
        if let Some(err) = response.error {
            return Err(GatewayError::Rejected(err));
        }
        response
            .result
            .ok_or_else(|| GatewayError::MalformedResponse("missing result".to_string()))
    }
}

/// Cloneable handle to one open gateway connection.
#[derive(Clone)]
pub struct PoolHandle {
    inner: Arc<dyn PoolTransport>,
}

impl PoolHandle {
    async fn call(&self, op: &str, params: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        self.inner.call(op, params).await
    }

    /// Construct a handle over an arbitrary transport. Used by this
    /// crate's own test fakes that need a `PoolHandle` without a live
    /// socket; production code only ever obtains one from
    /// [`GatewayClient::open_pool`].
    #[cfg(test)]
    pub(crate) fn from_transport(transport: Arc<dyn PoolTransport>) -> Self {
        Self { inner: transport }
    }

    /// A handle over a transport that answers every call with an empty
    /// JSON object. For fake `GatewayClient` implementations — in this
    /// crate's own tests, or in a downstream crate under the `test-util`
    /// feature — whose `open_pool` needs to return *some* valid handle
    /// without a live socket.
    #[cfg(any(test, feature = "test-util"))]
    pub fn noop() -> Self {
        Self { inner: Arc::new(test_util::NoopPoolTransport) }
    }
}

#[cfg(test)]
pub(crate) use self::test_util::NoopPoolTransport;

#[cfg(any(test, feature = "test-util"))]
mod test_util {
    use super::PoolTransport;
    use crate::error::GatewayError;
    use async_trait::async_trait;

    /// A [`PoolTransport`] that answers every call with an empty JSON
    /// object, for tests that exercise `PoolManager` through a fake
    /// `GatewayClient` and never actually dispatch through the handle.
    #[derive(Debug, Default)]
    pub struct NoopPoolTransport;

    #[async_trait]
    impl PoolTransport for NoopPoolTransport {
        async fn call(&self, _op: &str, _params: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
            Ok(serde_json::json!({}))
        }
    }
}

/// Real `GatewayClient` backed by `tokio-tungstenite`.
pub struct WsGatewayClient;

impl Default for WsGatewayClient {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayClient for WsGatewayClient {
    async fn open_pool(
        &self,
        creds: &Credentials,
        sizes: PoolSizes,
    ) -> Result<PoolHandle, GatewayError> {
        let url = format!("wss://{}:{}/gateway", creds.host, creds.port);
        let started = Instant::now();
        let (ws, _resp) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| GatewayError::Connect {
                endpoint: url.clone(),
                source: e,
            })?;
        tracing::info!(host = %creds.host, port = creds.port, elapsed_ms = started.elapsed().as_millis() as u64, "gateway connection opened");

        let (sink, mut stream) = ws.split();
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseEnvelope>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_reader = pending.clone();

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let Ok(Message::Text(text)) = msg else {
                    continue;
                };
                let Ok(envelope) = serde_json::from_str::<ResponseEnvelope>(&text) else {
                    tracing::warn!("received malformed gateway frame, dropping");
                    continue;
                };
                if let Some(tx) = pending_reader.lock().await.remove(&envelope.id) {
                    let _ = tx.send(envelope);
                }
            }
        });

        let handle = PoolHandle {
            inner: Arc::new(WsPoolTransport {
                sink: Mutex::new(sink),
                pending,
                next_id: AtomicU64::new(1),
                reader,
            }),
        };

        let _ = handle
            .call(
                "auth",
                serde_json::json!({ "user": creds.user, "password": creds.password, "startingSize": sizes.starting, "maxSize": sizes.max }),
            )
            .await?;

        Ok(handle)
    }

    async fn execute(
        &self,
        pool: &PoolHandle,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<GatewayResult, GatewayError> {
        let started = Instant::now();
        let value = pool
            .call("execute", serde_json::json!({ "sql": sql, "params": params }))
            .await?;
        let mut result: GatewayResult = serde_json::from_value(value)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if result.execution_time_ms == 0 {
            result.execution_time_ms = started.elapsed().as_millis() as u64;
        }
        Ok(result)
    }

    async fn fetch_more(
        &self,
        pool: &PoolHandle,
        query: &QueryHandle,
        fetch_size: u32,
    ) -> Result<GatewayResult, GatewayError> {
        let value = pool
            .call(
                "fetchMore",
                serde_json::json!({ "query": query.0, "fetchSize": fetch_size }),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    async fn close_query(&self, pool: &PoolHandle, query: &QueryHandle) -> Result<(), GatewayError> {
        let _ = pool
            .call("closeQuery", serde_json::json!({ "query": query.0 }))
            .await?;
        Ok(())
    }

    async fn close_pool(&self, pool: &PoolHandle) -> Result<(), GatewayError> {
        let _ = pool.call("closePool", serde_json::json!({})).await?;
        Ok(())
    }

    async fn get_root_certificate(&self, endpoint: &str) -> Result<Vec<u8>, GatewayError> {
        let url = format!("https://{endpoint}/cert");
        let response =
            reqwest::get(&url)
                .await
                .map_err(|e| GatewayError::CertificateFetch {
                    endpoint: endpoint.to_string(),
                    source: e,
                })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::CertificateFetch {
                endpoint: endpoint.to_string(),
                source: e,
            })?;
        Ok(bytes.to_vec())
    }
}
