//! ed25519 backend for NEAR.

use super::{SigningBackend, str_field};
use crate::transport::Transport;
use alloy_primitives::{U256, hex};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use borsh::BorshSerialize;
use ed25519_dalek::{Signer, SigningKey};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::{fmt, sync::Arc};
use warden_core::{
    Account, ChainConfig, ChainFamily, Ed25519Variant, Result, SignatureScheme, WalletError,
    serde_helpers::parse_quantity,
};

/// Gas attached to function calls that don't specify it, 30 TGas.
pub const DEFAULT_FUNCTION_CALL_GAS: u64 = 30_000_000_000_000;

/// Signs NEAR transactions for the implicit account of the key.
pub struct NearBackend {
    key: SigningKey,
    account: Account,
    network: ChainConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for NearBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NearBackend")
            .field("account_id", &self.account.address())
            .field("network", &self.network.chain_id)
            .finish_non_exhaustive()
    }
}

impl NearBackend {
    pub fn new(key: SigningKey, network: ChainConfig, transport: Arc<dyn Transport>) -> Self {
        let public_key = key.verifying_key();
        let account = Account::new(
            hex::encode(public_key.as_bytes()),
            format!("ed25519:{}", bs58::encode(public_key.as_bytes()).into_string()),
            SignatureScheme::Ed25519(Ed25519Variant::Near),
        );
        Self { key, account, network, transport }
    }

    async fn query(&self, params: Value) -> Result<Value> {
        let url = self.network.rpc_url()?;
        Ok(self.transport.call(url, "query", params).await?)
    }

    /// Fetches the next nonce and a recent block hash for the wallet's access key.
    async fn access_key(&self) -> Result<(u64, [u8; 32])> {
        let key = self
            .query(json!({
                "request_type": "view_access_key",
                "finality": "final",
                "account_id": self.account.address(),
                "public_key": self.account.public_key(),
            }))
            .await?;
        let nonce = key
            .get("nonce")
            .and_then(Value::as_u64)
            .ok_or_else(|| WalletError::validation("nonce", "missing from access key"))?;
        let block_hash = str_field(&key, "block_hash")?;
        let block_hash = bs58::decode(block_hash)
            .into_vec()
            .ok()
            .and_then(|hash| <[u8; 32]>::try_from(hash).ok())
            .ok_or_else(|| WalletError::validation("block_hash", "expected 32 bytes of base58"))?;
        let nonce = nonce
            .checked_add(1)
            .ok_or_else(|| WalletError::validation("nonce", "quantity out of range"))?;
        Ok((nonce, block_hash))
    }

    /// Builds and signs the transaction, returning its hash and the borsh encoded signed form.
    async fn sign_request(&self, tx: &Value) -> Result<([u8; 32], Vec<u8>)> {
        let request: TransactionRequest = serde_json::from_value(tx.clone())
            .map_err(|err| WalletError::validation("transaction", err))?;
        if let Some(signer_id) = &request.signer_id {
            self.account.ensure(signer_id)?;
        }
        let actions = request.actions.into_iter().map(Action::try_from).collect::<Result<_>>()?;
        let (nonce, block_hash) = self.access_key().await?;

        let transaction = Transaction {
            signer_id: self.account.address().to_string(),
            public_key: PublicKey::Ed25519(self.key.verifying_key().to_bytes()),
            nonce,
            receiver_id: request.receiver_id,
            block_hash,
            actions,
        };
        let encoded = borsh::to_vec(&transaction)
            .map_err(|err| WalletError::validation("transaction", err))?;
        let hash: [u8; 32] = Sha256::digest(&encoded).into();
        let signature = self.key.sign(&hash);

        let signed = SignedTransaction {
            transaction,
            signature: NearSignature::Ed25519(signature.to_bytes()),
        };
        let signed =
            borsh::to_vec(&signed).map_err(|err| WalletError::validation("transaction", err))?;
        trace!(
            target: "signer::near",
            hash = %bs58::encode(hash).into_string(),
            nonce,
            "signed transaction"
        );
        Ok((hash, signed))
    }
}

#[async_trait]
impl SigningBackend for NearBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::Near
    }

    fn account(&self) -> &Account {
        &self.account
    }

    fn sign(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        Ok(STANDARD.encode(self.key.sign(message).to_bytes()))
    }

    fn sign_personal(&self, address: &str, message: &[u8]) -> Result<String> {
        self.sign(address, message)
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<Value> {
        let (hash, signed) = self.sign_request(tx).await?;
        Ok(json!({
            "hash": bs58::encode(hash).into_string(),
            "signedTransaction": STANDARD.encode(signed),
        }))
    }

    async fn send_transaction(&self, tx: &Value) -> Result<String> {
        let (hash, signed) = self.sign_request(tx).await?;
        let url = self.network.rpc_url()?;
        debug!(
            target: "signer::near",
            network = %self.network.chain_id,
            "broadcasting transaction"
        );
        let outcome = self
            .transport
            .call(url, "broadcast_tx_commit", json!([STANDARD.encode(signed)]))
            .await
            .map_err(|err| WalletError::from(err).into_broadcast())?;
        Ok(outcome
            .pointer("/transaction/hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| bs58::encode(hash).into_string()))
    }

    async fn balance(&self, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        let account = self
            .query(json!({
                "request_type": "view_account",
                "finality": "final",
                "account_id": self.account.address(),
            }))
            .await?;
        Ok(str_field(&account, "amount")?.to_string())
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

/// A transaction as dApps submit it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    #[serde(default)]
    signer_id: Option<String>,
    receiver_id: String,
    actions: Vec<ActionRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "params")]
enum ActionRequest {
    CreateAccount,
    DeployContract {
        /// Base64 encoded wasm.
        code: String,
    },
    #[serde(rename_all = "camelCase")]
    FunctionCall {
        method_name: String,
        /// A JSON value, or base64 encoded raw bytes.
        #[serde(default)]
        args: Value,
        #[serde(default)]
        gas: Option<Value>,
        #[serde(default)]
        deposit: Option<Value>,
    },
    Transfer {
        deposit: Value,
    },
}

impl TryFrom<ActionRequest> for Action {
    type Error = WalletError;

    fn try_from(action: ActionRequest) -> Result<Self> {
        Ok(match action {
            ActionRequest::CreateAccount => Self::CreateAccount,
            ActionRequest::DeployContract { code } => Self::DeployContract {
                code: STANDARD.decode(code).map_err(|err| WalletError::validation("code", err))?,
            },
            ActionRequest::FunctionCall { method_name, args, gas, deposit } => {
                let args = match args {
                    Value::Null => Vec::new(),
                    Value::String(encoded) => STANDARD
                        .decode(encoded)
                        .map_err(|err| WalletError::validation("args", err))?,
                    args => serde_json::to_vec(&args)
                        .map_err(|err| WalletError::validation("args", err))?,
                };
                let gas = match gas {
                    Some(gas) => amount(&gas, "gas")?,
                    None => DEFAULT_FUNCTION_CALL_GAS,
                };
                let deposit = match deposit {
                    Some(deposit) => amount(&deposit, "deposit")?,
                    None => 0,
                };
                Self::FunctionCall { method_name, args, gas, deposit }
            }
            ActionRequest::Transfer { deposit } => {
                Self::Transfer { deposit: amount(&deposit, "deposit")? }
            }
        })
    }
}

fn amount<T: TryFrom<U256>>(value: &Value, field: &str) -> Result<T> {
    let amount = parse_quantity(value).map_err(|err| WalletError::validation(field, err))?;
    T::try_from(amount).map_err(|_| WalletError::validation(field, "amount out of range"))
}

#[derive(Debug, BorshSerialize)]
struct Transaction {
    signer_id: String,
    public_key: PublicKey,
    nonce: u64,
    receiver_id: String,
    block_hash: [u8; 32],
    actions: Vec<Action>,
}

#[derive(Debug, BorshSerialize)]
enum PublicKey {
    Ed25519([u8; 32]),
}

#[derive(Debug, BorshSerialize)]
enum NearSignature {
    Ed25519([u8; 64]),
}

/// Supported actions, in protocol variant order.
#[derive(Debug, BorshSerialize)]
enum Action {
    CreateAccount,
    DeployContract { code: Vec<u8> },
    FunctionCall { method_name: String, args: Vec<u8>, gas: u64, deposit: u128 },
    Transfer { deposit: u128 },
}

#[derive(Debug, BorshSerialize)]
struct SignedTransaction {
    transaction: Transaction,
    signature: NearSignature,
}
