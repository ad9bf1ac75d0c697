//! Network access for backends and the relay stage.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use url::Url;
use warden_core::WalletError;
use warden_rpc::RpcError;

/// Errors returned by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be reached or answered with a non-success status.
    #[error("request to {url} failed: {reason}")]
    Unreachable { url: String, reason: String },
    /// The node answered with a JSON-RPC error.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<TransportError> for WalletError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rpc(err) => Self::Rpc(err),
            err => Self::unreachable(err),
        }
    }
}

/// Something that can talk to chain nodes and gateways.
///
/// All endpoints are passed explicitly so one transport serves every network a session binds to.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs a JSON-RPC 2.0 call and returns its `result`.
    async fn call(&self, url: &Url, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Performs a GET request and returns the decoded JSON body.
    async fn get(&self, url: &Url) -> Result<Value, TransportError>;

    /// POSTs a JSON body and returns the decoded JSON response.
    async fn post(&self, url: &Url, body: Value) -> Result<Value, TransportError>;
}

/// [`Transport`] over HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|err| {
            TransportError::Unreachable { url: String::new(), reason: err.to_string() }
        })?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, next_id: AtomicU64::new(1) }
    }

    async fn send(
        &self,
        url: &Url,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, TransportError> {
        let unreachable = |err: reqwest::Error| TransportError::Unreachable {
            url: url.to_string(),
            reason: err.to_string(),
        };
        let response = request.send().await.map_err(unreachable)?;
        let status = response.status();
        let body = response.bytes().await.map_err(unreachable)?;
        decode_body(url, status, &body)
    }
}

/// Decodes a response body.
///
/// Error statuses are only passed on when the body carries an `error` member, so node and gateway
/// messages survive a 4xx or 5xx.
fn decode_body(url: &Url, status: StatusCode, body: &[u8]) -> Result<Value, TransportError> {
    let decoded = serde_json::from_slice::<Value>(body);
    if status.is_success() {
        return decoded.map_err(|err| TransportError::Decode(err.to_string()));
    }
    match decoded {
        Ok(value) if carries_error(&value) => Ok(value),
        _ => Err(TransportError::Unreachable {
            url: url.to_string(),
            reason: format!("HTTP status {status}"),
        }),
    }
}

fn carries_error(value: &Value) -> bool {
    match value.get("error") {
        None | Some(Value::Null) => false,
        Some(Value::String(error)) => !error.is_empty(),
        Some(_) => true,
    }
}

/// The members of a JSON-RPC response we care about.
#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, url: &Url, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(target: "transport", %url, method, id, "sending rpc request");
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self.send(url, self.client.post(url.clone()).json(&body)).await?;
        let response: RpcResponse = serde_json::from_value(response)
            .map_err(|err| TransportError::Decode(err.to_string()))?;
        match response {
            RpcResponse { error: Some(err), .. } => {
                debug!(target: "transport", method, %err, "node returned an error");
                Err(err.into())
            }
            RpcResponse { result, .. } => Ok(result.unwrap_or(Value::Null)),
        }
    }

    async fn get(&self, url: &Url) -> Result<Value, TransportError> {
        trace!(target: "transport", %url, "GET");
        self.send(url, self.client.get(url.clone())).await
    }

    async fn post(&self, url: &Url, body: Value) -> Result<Value, TransportError> {
        trace!(target: "transport", %url, "POST");
        self.send(url, self.client.post(url.clone()).json(&body)).await
    }
}

/// Joins `path` onto a gateway base url, keeping any path the base already has.
pub fn join_path(base: &Url, path: &str) -> Result<Url, WalletError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(path.trim_start_matches('/')).map_err(WalletError::unreachable)
}
