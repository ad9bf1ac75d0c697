use super::Middleware;
use crate::{signer::SigningBackend, transport::Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;
use warden_core::Result;
use warden_rpc::RemoteCall;

/// Forwards any call verbatim to the primary RPC endpoint of the network.
///
/// Always the last stage. Node errors are passed through unchanged.
#[derive(Debug)]
pub struct NetworkRelay {
    url: Url,
    transport: Arc<dyn Transport>,
}

impl NetworkRelay {
    pub fn new(url: Url, transport: Arc<dyn Transport>) -> Self {
        Self { url, transport }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Middleware for NetworkRelay {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn handles(&self, _method: &str) -> bool {
        true
    }

    async fn handle(&self, call: &RemoteCall, _backend: &dyn SigningBackend) -> Result<Value> {
        let params = Value::Array(call.params.clone());
        Ok(self.transport.call(&self.url, &call.method, params).await?)
    }
}
