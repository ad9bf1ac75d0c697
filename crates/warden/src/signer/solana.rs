//! ed25519 backend for Solana.

use super::SigningBackend;
use crate::transport::Transport;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::{SIGNATURE_LENGTH, Signer, SigningKey};
use serde_json::{Value, json};
use std::{fmt, sync::Arc};
use warden_core::{
    Account, ChainConfig, ChainFamily, Ed25519Variant, Result, SignatureScheme, WalletError,
};

const PUBKEY_LENGTH: usize = 32;

/// Signs Solana wire transactions and messages.
pub struct SolanaBackend {
    key: SigningKey,
    account: Account,
    network: ChainConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for SolanaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaBackend")
            .field("address", &self.account.address())
            .field("network", &self.network.chain_id)
            .finish_non_exhaustive()
    }
}

impl SolanaBackend {
    pub fn new(key: SigningKey, network: ChainConfig, transport: Arc<dyn Transport>) -> Self {
        let address = bs58::encode(key.verifying_key().as_bytes()).into_string();
        let account = Account::new(
            address.clone(),
            address,
            SignatureScheme::Ed25519(Ed25519Variant::Solana),
        );
        Self { key, account, network, transport }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let url = self.network.rpc_url()?;
        Ok(self.transport.call(url, method, params).await?)
    }

    /// Decodes the base58 wire transaction and fills the signature slot of the managed key.
    fn sign_wire(&self, tx: &Value) -> Result<WireTransaction> {
        let encoded = tx
            .as_str()
            .or_else(|| tx.get("transaction").and_then(Value::as_str))
            .ok_or_else(|| WalletError::validation("transaction", "expected a base58 string"))?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|err| WalletError::validation("transaction", err))?;
        let mut wire = WireTransaction::decode(bytes)?;
        let slot = wire.signer_index(self.key.verifying_key().as_bytes()).ok_or_else(|| {
            WalletError::validation("transaction", "the wallet key is not a required signer")
        })?;
        let signature = self.key.sign(wire.message());
        wire.set_signature(slot, &signature.to_bytes());
        Ok(wire)
    }
}

#[async_trait]
impl SigningBackend for SolanaBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn account(&self) -> &Account {
        &self.account
    }

    fn sign(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        Ok(bs58::encode(self.key.sign(message).to_bytes()).into_string())
    }

    /// Solana has no message prefix, this is the same as [`Self::sign`].
    fn sign_personal(&self, address: &str, message: &[u8]) -> Result<String> {
        self.sign(address, message)
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<Value> {
        let wire = self.sign_wire(tx)?;
        Ok(Value::String(bs58::encode(wire.bytes).into_string()))
    }

    async fn send_transaction(&self, tx: &Value) -> Result<String> {
        let wire = self.sign_wire(tx)?;
        let encoded = STANDARD.encode(&wire.bytes);
        debug!(
            target: "signer::solana",
            cluster = %self.network.chain_id,
            "broadcasting transaction"
        );
        let signature = self
            .rpc("sendTransaction", json!([encoded, { "encoding": "base64" }]))
            .await
            .map_err(WalletError::into_broadcast)?;
        signature
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::broadcast("node returned no signature"))
    }

    async fn balance(&self, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        let balance = self.rpc("getBalance", json!([self.account.address()])).await?;
        balance
            .get("value")
            .and_then(Value::as_u64)
            .map(|lamports| lamports.to_string())
            .ok_or_else(|| WalletError::validation("balance", "unexpected getBalance response"))
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

/// A serialized transaction: compact array of signatures followed by the message.
#[derive(Debug)]
struct WireTransaction {
    bytes: Vec<u8>,
    /// Offset of the first signature.
    signatures_offset: usize,
    num_signatures: usize,
    /// Offset of the message.
    message_offset: usize,
    required_signers: Vec<[u8; PUBKEY_LENGTH]>,
}

impl WireTransaction {
    fn decode(bytes: Vec<u8>) -> Result<Self> {
        let invalid = |reason: &str| WalletError::validation("transaction", reason);

        let (num_signatures, signatures_offset) = decode_short_u16(&bytes, 0)?;
        let message_offset = signatures_offset + num_signatures * SIGNATURE_LENGTH;
        let mut cursor = message_offset;

        // versioned messages set the high bit of the first byte, legacy ones start with the header
        let first = *bytes.get(cursor).ok_or_else(|| invalid("missing message"))?;
        if first & 0x80 != 0 {
            if first & 0x7f != 0 {
                return Err(WalletError::unsupported(format!("message version {}", first & 0x7f)));
            }
            cursor += 1;
        }
        let num_required = *bytes.get(cursor).ok_or_else(|| invalid("missing header"))? as usize;
        cursor += 3;

        let (num_keys, keys_offset) = decode_short_u16(&bytes, cursor)?;
        if num_required > num_keys || num_required != num_signatures {
            return Err(invalid("signature count does not match the message header"));
        }
        let keys_end = keys_offset + num_keys * PUBKEY_LENGTH;
        if bytes.len() < keys_end {
            return Err(invalid("truncated account keys"));
        }
        let required_signers = bytes[keys_offset..keys_offset + num_required * PUBKEY_LENGTH]
            .chunks_exact(PUBKEY_LENGTH)
            .map(|key| {
                let mut out = [0u8; PUBKEY_LENGTH];
                out.copy_from_slice(key);
                out
            })
            .collect();

        Ok(Self { bytes, signatures_offset, num_signatures, message_offset, required_signers })
    }

    fn message(&self) -> &[u8] {
        &self.bytes[self.message_offset..]
    }

    fn signer_index(&self, key: &[u8; PUBKEY_LENGTH]) -> Option<usize> {
        self.required_signers.iter().position(|signer| signer == key)
    }

    fn set_signature(&mut self, index: usize, signature: &[u8; SIGNATURE_LENGTH]) {
        debug_assert!(index < self.num_signatures);
        let start = self.signatures_offset + index * SIGNATURE_LENGTH;
        self.bytes[start..start + SIGNATURE_LENGTH].copy_from_slice(signature);
    }
}

/// Decodes a compact-u16 at `offset`, returning the value and the offset after it.
fn decode_short_u16(bytes: &[u8], offset: usize) -> Result<(usize, usize)> {
    let mut value = 0usize;
    for i in 0..3 {
        let byte = *bytes
            .get(offset + i)
            .ok_or_else(|| WalletError::validation("transaction", "truncated length prefix"))?;
        value |= ((byte & 0x7f) as usize) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((value, offset + i + 1));
        }
    }
    Err(WalletError::validation("transaction", "length prefix too long"))
}
