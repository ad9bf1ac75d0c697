//! secp256k1 backend for EVM chains.

use super::{SigningBackend, str_field};
use crate::transport::Transport;
use alloy_dyn_abi::TypedData;
use alloy_eips::eip2718::Encodable2718;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, B256, Bytes, U256, hex};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::{SignerSync, k256::elliptic_curve::sec1::ToEncodedPoint};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolCall, sol};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use crypto_box::{PublicKey, SalsaBox, SecretKey, aead::Aead};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{fmt, sync::Arc};
use warden_core::{
    Account, ChainConfig, ChainFamily, Result, SignatureScheme, WalletError,
    serde_helpers::{parse_quantity, to_quantity},
};

sol! {
    /// ERC-20 transfer.
    function transfer(address to, uint256 amount) external returns (bool);
}

/// The only envelope version `eth_decrypt` understands.
const ENCRYPTION_VERSION: &str = "x25519-xsalsa20-poly1305";

/// A message sealed to the account's encryption public key.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedData {
    version: String,
    nonce: String,
    ephem_public_key: String,
    ciphertext: String,
}

/// Signs and sends EVM transactions with a local private key.
pub struct EvmBackend {
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
    encryption_key: SecretKey,
    account: Account,
    network: ChainConfig,
    chain_id: u64,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for EvmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmBackend")
            .field("address", &self.signer.address())
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl EvmBackend {
    pub fn new(secret: B256, network: ChainConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let signer = PrivateKeySigner::from_bytes(&secret)
            .map_err(|_| WalletError::validation("privateKey", "not a valid secp256k1 key"))?;
        let public_key = signer.credential().verifying_key().as_affine().to_encoded_point(false);
        let account = Account::new(
            signer.address().to_checksum(None),
            hex::encode_prefixed(public_key.as_bytes()),
            SignatureScheme::Secp256k1,
        );
        let chain_id = numeric_chain_id(&network)?;
        Ok(Self {
            wallet: EthereumWallet::from(signer.clone()),
            encryption_key: SecretKey::from(secret.0),
            signer,
            account,
            network,
            chain_id,
            transport,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Estimates the gas a transaction request would use.
    pub async fn estimate_gas(&self, tx: &Value) -> Result<u64> {
        let mut request = self.prepare(tx)?;
        request.gas = None;
        self.fill_gas(&mut request).await?;
        request.gas.ok_or_else(|| WalletError::validation("gas", "node returned no estimate"))
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let url = self.network.rpc_url()?;
        Ok(self.transport.call(url, method, params).await?)
    }

    /// Decodes the request, checking sender and chain id.
    fn prepare(&self, tx: &Value) -> Result<TransactionRequest> {
        let mut request: TransactionRequest = serde_json::from_value(tx.clone())
            .map_err(|err| WalletError::validation("transaction", err))?;
        match request.from {
            Some(from) if from != self.address() => {
                return Err(WalletError::UnknownAddress(from.to_checksum(None)));
            }
            _ => request.from = Some(self.address()),
        }
        match request.chain_id {
            Some(chain_id) if chain_id != self.chain_id => {
                return Err(WalletError::validation(
                    "chainId",
                    format!("transaction is for chain {chain_id}, wallet is on {}", self.chain_id),
                ));
            }
            _ => request.chain_id = Some(self.chain_id),
        }
        Ok(request)
    }

    /// Fills nonce, fees and gas limit from the node where the request leaves them out.
    async fn fill(&self, request: &mut TransactionRequest) -> Result<()> {
        if request.nonce.is_none() {
            let nonce =
                self.rpc("eth_getTransactionCount", json!([self.address(), "pending"])).await?;
            request.nonce = Some(quantity(&nonce, "nonce")?);
        }

        if request.gas_price.is_none() && request.max_fee_per_gas.is_none() {
            let block = self.rpc("eth_getBlockByNumber", json!(["latest", false])).await?;
            match block.get("baseFeePerGas").filter(|fee| !fee.is_null()) {
                Some(base_fee) => {
                    let base_fee: u128 = quantity(base_fee, "baseFeePerGas")?;
                    let priority_fee = match request.max_priority_fee_per_gas {
                        Some(fee) => fee,
                        None => self.priority_fee().await?,
                    };
                    let max_fee = base_fee
                        .checked_mul(2)
                        .and_then(|fee| fee.checked_add(priority_fee))
                        .ok_or_else(|| {
                            WalletError::validation("baseFeePerGas", "quantity out of range")
                        })?;
                    request.max_priority_fee_per_gas = Some(priority_fee);
                    request.max_fee_per_gas = Some(max_fee);
                }
                None if request.max_priority_fee_per_gas.is_some() => {
                    return Err(WalletError::validation(
                        "maxPriorityFeePerGas",
                        "the network does not support EIP-1559 fees",
                    ));
                }
                None => {
                    let gas_price = self.rpc("eth_gasPrice", json!([])).await?;
                    request.gas_price = Some(quantity(&gas_price, "gasPrice")?);
                }
            }
        } else if let (Some(max_fee), None) =
            (request.max_fee_per_gas, request.max_priority_fee_per_gas)
        {
            request.max_priority_fee_per_gas = Some(self.priority_fee().await?.min(max_fee));
        }

        if request.gas.is_none() {
            self.fill_gas(request).await?;
        }
        Ok(())
    }

    async fn priority_fee(&self) -> Result<u128> {
        let fee = self.rpc("eth_maxPriorityFeePerGas", json!([])).await?;
        quantity(&fee, "maxPriorityFeePerGas")
    }

    async fn fill_gas(&self, request: &mut TransactionRequest) -> Result<()> {
        let estimate = self.rpc("eth_estimateGas", json!([request])).await?;
        request.gas = Some(quantity(&estimate, "gas")?);
        Ok(())
    }

    /// Signs the request, returning the EIP-2718 encoding and the transaction hash.
    async fn sign_request(&self, tx: &Value) -> Result<(Bytes, B256)> {
        let mut request = self.prepare(tx)?;
        self.fill(&mut request).await?;
        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|err| WalletError::validation("transaction", err))?;
        trace!(target: "signer::evm", hash = %envelope.tx_hash(), "signed transaction");
        Ok((envelope.encoded_2718().into(), *envelope.tx_hash()))
    }
}

#[async_trait]
impl SigningBackend for EvmBackend {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn account(&self) -> &Account {
        &self.account
    }

    /// `eth_sign`: signs a 32 byte hash as is.
    fn sign(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        let hash = B256::try_from(message)
            .map_err(|_| WalletError::validation("message", "eth_sign expects a 32 byte hash"))?;
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|err| WalletError::validation("message", err))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }

    /// `personal_sign`: signs the EIP-191 prefixed message.
    fn sign_personal(&self, address: &str, message: &[u8]) -> Result<String> {
        self.account.ensure(address)?;
        let signature = self
            .signer
            .sign_message_sync(message)
            .map_err(|err| WalletError::validation("message", err))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }

    fn sign_typed_data(&self, address: &str, payload: &Value) -> Result<String> {
        self.account.ensure(address)?;
        let typed_data: TypedData = match payload {
            Value::String(json) => serde_json::from_str(json),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|err| WalletError::validation("typedData", err))?;
        let hash = typed_data
            .eip712_signing_hash()
            .map_err(|err| WalletError::validation("typedData", err))?;
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|err| WalletError::validation("typedData", err))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }

    fn decrypt(&self, ciphertext: &str, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        let invalid = |reason: &str| WalletError::validation("ciphertext", reason);

        let envelope = hex::decode(ciphertext).map_err(|_| invalid("expected hex"))?;
        let data: EncryptedData = serde_json::from_slice(&envelope)
            .map_err(|err| WalletError::validation("ciphertext", err))?;
        if data.version != ENCRYPTION_VERSION {
            return Err(WalletError::unsupported(format!("encryption version {}", data.version)));
        }

        let nonce = STANDARD.decode(&data.nonce).map_err(|_| invalid("bad nonce"))?;
        let nonce: [u8; 24] = nonce.try_into().map_err(|_| invalid("nonce must be 24 bytes"))?;
        let ephemeral = STANDARD.decode(&data.ephem_public_key).map_err(|_| invalid("bad key"))?;
        let ephemeral: [u8; 32] =
            ephemeral.try_into().map_err(|_| invalid("ephemeral key must be 32 bytes"))?;
        let sealed = STANDARD.decode(&data.ciphertext).map_err(|_| invalid("bad ciphertext"))?;

        let salsa_box = SalsaBox::new(&PublicKey::from(ephemeral), &self.encryption_key);
        let plaintext = salsa_box
            .decrypt(&nonce.into(), sealed.as_slice())
            .map_err(|_| invalid("decryption failed"))?;
        String::from_utf8(plaintext).map_err(|_| invalid("plaintext is not utf-8"))
    }

    fn encryption_public_key(&self, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        Ok(STANDARD.encode(self.encryption_key.public_key().as_bytes()))
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<Value> {
        let (raw, _) = self.sign_request(tx).await?;
        Ok(Value::String(raw.to_string()))
    }

    async fn send_transaction(&self, tx: &Value) -> Result<String> {
        let (raw, hash) = self.sign_request(tx).await?;
        debug!(target: "signer::evm", %hash, chain_id = self.chain_id, "broadcasting transaction");
        let sent = self
            .rpc("eth_sendRawTransaction", json!([raw]))
            .await
            .map_err(WalletError::into_broadcast)?;
        Ok(sent.as_str().map(str::to_string).unwrap_or_else(|| hash.to_string()))
    }

    async fn balance(&self, address: &str) -> Result<String> {
        self.account.ensure(address)?;
        let balance = self.rpc("eth_getBalance", json!([self.address(), "latest"])).await?;
        parse_quantity(&balance)
            .map(|balance| balance.to_string())
            .map_err(|err| WalletError::validation("balance", err))
    }

    fn network(&self) -> &ChainConfig {
        &self.network
    }

    fn set_network(&mut self, network: ChainConfig) -> Result<()> {
        network.validate()?;
        self.chain_id = numeric_chain_id(&network)?;
        self.network = network;
        Ok(())
    }

    async fn transfer_token(&self, token: &str, to: &str, amount: U256) -> Result<String> {
        let token: Address = token.parse().map_err(|err| WalletError::validation("token", err))?;
        let to: Address = to.parse().map_err(|err| WalletError::validation("to", err))?;
        let input = transferCall { to, amount }.abi_encode();
        let tx = json!({
            "from": self.address(),
            "to": token,
            "data": Bytes::from(input),
            "value": to_quantity(U256::ZERO),
        });
        self.send_transaction(&tx).await
    }
}

fn numeric_chain_id(network: &ChainConfig) -> Result<u64> {
    network.chain_id.as_u64().ok_or_else(|| {
        WalletError::validation("chainId", format!("{} is not an EVM chain id", network.chain_id))
    })
}

fn quantity<T: TryFrom<U256>>(value: &Value, field: &str) -> Result<T> {
    let quantity = parse_quantity(value).map_err(|err| WalletError::validation(field, err))?;
    T::try_from(quantity).map_err(|_| WalletError::validation(field, "quantity out of range"))
}

/// Reads the recipient of a transaction request, if it has one.
pub(crate) fn recipient(tx: &Value) -> Option<String> {
    str_field(tx, "to").ok().map(str::to_string)
}

/// Whether the request carries calldata.
pub(crate) fn has_calldata(tx: &Value) -> bool {
    ["data", "input"]
        .iter()
        .filter_map(|field| tx.get(*field).and_then(Value::as_str))
        .any(|data| !matches!(data, "" | "0x"))
}

