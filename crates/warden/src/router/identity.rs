use super::Middleware;
use crate::signer::SigningBackend;
use async_trait::async_trait;
use serde_json::Value;
use warden_core::{ChainFamily, ChainId, Result};
use warden_rpc::RemoteCall;

/// Answers chain id queries from the binding, without a network round trip.
#[derive(Debug)]
pub struct NetworkIdentity {
    family: ChainFamily,
    chain_id: ChainId,
}

impl NetworkIdentity {
    pub const METHODS: [&'static str; 3] = ["eth_chainId", "net_version", "getChainId"];

    pub fn new(family: ChainFamily, chain_id: ChainId) -> Self {
        Self { family, chain_id }
    }
}

#[async_trait]
impl Middleware for NetworkIdentity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn handles(&self, method: &str) -> bool {
        Self::METHODS.contains(&method)
    }

    async fn handle(&self, call: &RemoteCall, _backend: &dyn SigningBackend) -> Result<Value> {
        let id = match call.method.as_str() {
            // net_version is always the plain network id
            "net_version" => self.chain_id.to_string(),
            _ => self.family.format_chain_id(&self.chain_id),
        };
        Ok(Value::String(id))
    }
}
