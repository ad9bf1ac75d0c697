//! ed25519 backend for MultiversX.
//!
//! MultiversX gateways are REST, not JSON-RPC, so this backend uses [`Transport::get`] and
//! [`Transport::post`] and the router installs no relay stage for it.

use super::SigningBackend;
use crate::transport::{Transport, join_path};
use alloy_primitives::{hex, keccak256};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bech32::{Bech32, Hrp};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};
use warden_core::{
    Account, ChainConfig, ChainFamily, Ed25519Variant, Result, SignatureScheme, WalletError,
};

/// Human readable part of account addresses.
pub const ADDRESS_HRP: Hrp = Hrp::parse_unchecked("erd");

/// Prefix of signed messages.
pub const MESSAGE_PREFIX: &str = "\x17Elrond Signed Message:\n";

pub const MIN_GAS_PRICE: u64 = 1_000_000_000;
pub const MIN_GAS_LIMIT: u64 = 50_000;
pub const GAS_PER_DATA_BYTE: u64 = 1_500;

/// Signs MultiversX transactions and messages.
pub struct MultiversXBackend {
    key: SigningKey,
    account: Account,
    network: ChainConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for MultiversXBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiversXBackend")
            .field("address", &self.account.address())
            .field("network", &self.network.chain_id)
            .finish_non_exhaustive()
    }
}

impl MultiversXBackend {
    pub fn new(
        key: SigningKey,
        network: ChainConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let public_key = key.verifying_key().to_bytes();
        let address = bech32::encode::<Bech32>(ADDRESS_HRP, &public_key)
            .map_err(|err| WalletError::validation("address", err))?;
        let account = Account::new(
            address,
            hex::encode(public_key),
            SignatureScheme::Ed25519(Ed25519Variant::MultiversX),
        );
        Ok(Self { key, account, network, transport })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = join_path(self.network.rpc_url()?, path)?;
        let response = self.transport.get(&url).await?;
        gateway_data(response)
    }

    async fn nonce(&self) -> Result<u64> {
        let data = self.get(&format!("address/{}/nonce", self.account.address())).await?;
        data.get("nonce")
            .and_then(Value::as_u64)
            .ok_or_else(|| WalletError::validation("nonce", "unexpected gateway response"))
    }

    async fn sign_request(&self, tx: &Value) -> Result<Transaction> {
        let request: TransactionRequest = serde_json::from_value(tx.clone())
            .map_err(|err| WalletError::validation("transaction", err))?;
        if let Some(sender) = &request.sender {
            self.account.ensure(sender)?;
        }
        validate_address(&request.receiver, "receiver")?;
        let chain_id = self.network.chain_id.to_string();
        if let Some(requested) = request.chain_id.as_ref().filter(|id| **id != chain_id) {
            return Err(WalletError::validation(
                "chainID",
                format!("transaction is for chain {requested}, wallet is on {chain_id}"),
            ));
        }
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => self.nonce().await?,
        };
        let data = request.data.filter(|data| !data.is_empty());
        let gas_limit = request.gas_limit.unwrap_or_else(|| {
            MIN_GAS_LIMIT + GAS_PER_DATA_BYTE * data.as_ref().map_or(0, |d| d.len() as u64)
        });

        let mut transaction = Transaction {
            nonce,
            value: request.value.unwrap_or_else(|| "0".to_string()),
            receiver: request.receiver,
            sender: self.account.address().to_string(),
            gas_price: request.gas_price.unwrap_or(MIN_GAS_PRICE),
            gas_limit,
            data: data.map(|data| STANDARD.encode(data)),
            chain_id,
            version: request.version.unwrap_or(1),
            options: request.options,
            signature: None,
        };
        let payload = serde_json::to_vec(&transaction)
            .map_err(|err| WalletError::validation("transaction", err))?;
        transaction.signature = Some(hex::encode(self.key.sign(&payload).to_bytes()));
        trace!(target: "signer::multiversx", nonce, "signed transaction");
        Ok(transaction)
    }
}

#[async_trait]
impl SigningBackend for MultiversXBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::MultiversX
    }

    fn account(&self) -> &Account {
        &self.account
    }

    fn sign(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        Ok(hex::encode(self.key.sign(message).to_bytes()))
    }

    /// Signs keccak256 of the prefixed message.
    fn sign_personal(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        let mut prefixed = format!("{MESSAGE_PREFIX}{}", message.len()).into_bytes();
        prefixed.extend_from_slice(message);
        let hash = keccak256(&prefixed);
        Ok(hex::encode(self.key.sign(hash.as_slice()).to_bytes()))
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<Value> {
        let transaction = self.sign_request(tx).await?;
        serde_json::to_value(transaction).map_err(|err| WalletError::validation("transaction", err))
    }

    async fn send_transaction(&self, tx: &Value) -> Result<String> {
        let transaction = self.sign_request(tx).await?;
        let body = serde_json::to_value(&transaction)
            .map_err(|err| WalletError::validation("transaction", err))?;
        let url = join_path(self.network.rpc_url()?, "transaction/send")?;
        debug!(
            target: "signer::multiversx",
            network = %self.network.chain_id,
            "broadcasting transaction"
        );
        let response = self
            .transport
            .post(&url, body)
            .await
            .map_err(|err| WalletError::from(err).into_broadcast())?;
        let data = gateway_data(response).map_err(|err| match err {
            WalletError::Validation { reason, .. } => WalletError::broadcast(reason),
            err => err,
        })?;
        data.get("txHash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WalletError::broadcast("gateway returned no transaction hash"))
    }

    async fn balance(&self, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        let data = self.get(&format!("address/{}/balance", self.account.address())).await?;
        data.get("balance")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WalletError::validation("balance", "unexpected gateway response"))
    }

    fn network(&self) -> &ChainConfig {
        &self.network
    }

    fn set_network(&mut self, network: ChainConfig) -> Result<()> {
        network.validate()?;
        self.network = network;
        Ok(())
    }
}

/// Unwraps the `data` member of a gateway response, failing on a gateway error.
fn gateway_data(mut response: Value) -> Result<Value> {
    match response.get("error").and_then(Value::as_str) {
        Some(error) if !error.is_empty() => Err(WalletError::validation("gateway", error)),
        _ => Ok(response.get_mut("data").map(Value::take).unwrap_or(Value::Null)),
    }
}

fn validate_address(address: &str, field: &str) -> Result<()> {
    let (hrp, data) = bech32::decode(address).map_err(|err| WalletError::validation(field, err))?;
    if hrp != ADDRESS_HRP || data.len() != 32 {
        return Err(WalletError::validation(field, format!("{address} is not an account address")));
    }
    Ok(())
}

/// A transaction as dApps submit it. `data` is plain text.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    #[serde(default)]
    nonce: Option<u64>,
    #[serde(default)]
    value: Option<String>,
    receiver: String,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    gas_price: Option<u64>,
    #[serde(default)]
    gas_limit: Option<u64>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default, rename = "chainID")]
    chain_id: Option<String>,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    options: Option<u32>,
}

/// The canonical form that gets signed. Field order is part of the signature.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Transaction {
    nonce: u64,
    value: String,
    receiver: String,
    sender: String,
    gas_price: u64,
    gas_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(rename = "chainID")]
    chain_id: String,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}
