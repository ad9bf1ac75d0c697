//! ed25519 backend for Sui.

use super::SigningBackend;
use crate::transport::Transport;
use alloy_primitives::hex;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use blake2::{Blake2b, Digest, digest::consts::U32};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{Value, json};
use std::{fmt, sync::Arc};
use warden_core::{
    Account, ChainConfig, ChainFamily, Ed25519Variant, Result, SignatureScheme, WalletError,
};

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag of ed25519 keys.
const ED25519_FLAG: u8 = 0x00;

/// Intent prefixes, `[scope, version, app id]`.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];
const PERSONAL_MESSAGE_INTENT: [u8; 3] = [3, 0, 0];

/// Signs Sui transaction blocks and personal messages.
pub struct SuiBackend {
    key: SigningKey,
    account: Account,
    network: ChainConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for SuiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiBackend")
            .field("address", &self.account.address())
            .field("network", &self.network.chain_id)
            .finish_non_exhaustive()
    }
}

impl SuiBackend {
    pub fn new(key: SigningKey, network: ChainConfig, transport: Arc<dyn Transport>) -> Self {
        let mut flagged = vec![ED25519_FLAG];
        flagged.extend_from_slice(key.verifying_key().as_bytes());
        let address = hex::encode_prefixed(Blake2b256::digest(&flagged));
        let account = Account::new(
            address,
            STANDARD.encode(&flagged),
            SignatureScheme::Ed25519(Ed25519Variant::Sui),
        );
        Self { key, account, network, transport }
    }

    /// Serialized signature: flag, signature, public key.
    fn serialize_signature(&self, message: &[u8]) -> String {
        let mut out = vec![ED25519_FLAG];
        out.extend_from_slice(&self.key.sign(message).to_bytes());
        out.extend_from_slice(self.key.verifying_key().as_bytes());
        STANDARD.encode(out)
    }

    /// Signs blake2b-256 of the intent message.
    fn sign_intent(&self, intent: [u8; 3], payload: &[u8]) -> String {
        let mut hasher = Blake2b256::new();
        hasher.update(intent);
        hasher.update(payload);
        self.serialize_signature(&hasher.finalize())
    }

    /// Signs a transaction block given as base64 bytes or as `{ transactionBlock, sender }`.
    ///
    /// `account` is accepted in place of `sender`, either as an address or as an account object.
    fn sign_request(&self, tx: &Value) -> Result<(String, String)> {
        if let Some(sender) = sender(tx) {
            self.account.ensure(sender)?;
        }
        let encoded = tx
            .as_str()
            .or_else(|| tx.get("transactionBlock").and_then(Value::as_str))
            .ok_or_else(|| WalletError::validation("transactionBlock", "expected base64 bytes"))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|err| WalletError::validation("transactionBlock", err))?;
        if bytes.is_empty() {
            return Err(WalletError::validation("transactionBlock", "empty transaction"));
        }
        Ok((encoded.to_string(), self.sign_intent(TRANSACTION_INTENT, &bytes)))
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let url = self.network.rpc_url()?;
        Ok(self.transport.call(url, method, params).await?)
    }
}

#[async_trait]
impl SigningBackend for SuiBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::Sui
    }

    fn account(&self) -> &Account {
        &self.account
    }

    fn sign(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        Ok(self.serialize_signature(message))
    }

    /// Signs a personal message, bcs encoded as a byte vector under the personal message intent.
    fn sign_personal(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        let mut payload = uleb128(message.len());
        payload.extend_from_slice(message);
        Ok(self.sign_intent(PERSONAL_MESSAGE_INTENT, &payload))
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<Value> {
        let (bytes, signature) = self.sign_request(tx)?;
        Ok(json!({ "transactionBlockBytes": bytes, "signature": signature }))
    }

    async fn send_transaction(&self, tx: &Value) -> Result<String> {
        let (bytes, signature) = self.sign_request(tx)?;
        debug!(
            target: "signer::sui",
            network = %self.network.chain_id,
            "executing transaction block"
        );
        let response = self
            .rpc(
                "sui_executeTransactionBlock",
                json!([bytes, [signature], { "showEffects": true }, "WaitForLocalExecution"]),
            )
            .await
            .map_err(WalletError::into_broadcast)?;
        response
            .get("digest")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WalletError::broadcast("node returned no digest"))
    }

    async fn balance(&self, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        let balance = self.rpc("suix_getBalance", json!([self.account.address()])).await?;
        balance
            .get("totalBalance")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                WalletError::validation("balance", "unexpected suix_getBalance response")
            })
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

fn sender(tx: &Value) -> Option<&str> {
    tx.get("sender").or_else(|| tx.get("account")).and_then(|sender| {
        sender.as_str().or_else(|| sender.get("address").and_then(Value::as_str))
    })
}

fn uleb128(mut value: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}
