//! Chain backends owning the session key.

use crate::transport::Transport;
use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, sync::Arc};
use warden_core::{Account, ChainConfig, ChainFamily, ChainId, Result, WalletError};

pub mod evm;
pub mod key;
pub mod multiversx;
pub mod near;
pub mod solana;
pub mod sui;

pub use evm::EvmBackend;
pub use multiversx::MultiversXBackend;
pub use near::NearBackend;
pub use solana::SolanaBackend;
pub use sui::SuiBackend;

/// One private key bound to one chain family and one network.
///
/// Every operation that takes an address fails with [`WalletError::UnknownAddress`] if it isn't
/// the managed account. Only the backend knows how to interpret transaction payloads.
#[async_trait]
pub trait SigningBackend: Send + Sync + fmt::Debug {
    fn family(&self) -> ChainFamily;

    /// The managed account.
    fn account(&self) -> &Account;

    /// The managed address as a one element list.
    fn accounts(&self) -> Vec<String> {
        vec![self.account().address().to_string()]
    }

    fn public_key(&self, address: &str) -> Result<String> {
        self.account().ensure(address)?;
        Ok(self.account().public_key().to_string())
    }

    /// Signs `message` with the scheme's raw signing operation.
    fn sign(&self, address: &str, message: &[u8]) -> Result<String>;

    /// Signs `message` with the scheme's message prefix or intent, if it has one.
    fn sign_personal(&self, address: &str, message: &[u8]) -> Result<String>;

    /// Signs EIP-712 typed data.
    fn sign_typed_data(&self, address: &str, _payload: &Value) -> Result<String> {
        self.account().ensure(address)?;
        Err(WalletError::unsupported(format!("typed data signing on {}", self.family())))
    }

    /// Decrypts a message sealed to [`Self::encryption_public_key`].
    fn decrypt(&self, _ciphertext: &str, address: &str) -> Result<String> {
        self.account().ensure(address)?;
        Err(WalletError::unsupported(format!("decryption on {}", self.family())))
    }

    fn encryption_public_key(&self, address: &str) -> Result<String> {
        self.account().ensure(address)?;
        Err(WalletError::unsupported(format!("encryption keys on {}", self.family())))
    }

    /// Completes and signs a chain-native transaction without broadcasting it.
    async fn sign_transaction(&self, tx: &Value) -> Result<Value>;

    /// Completes, signs and broadcasts a transaction, returning its hash.
    async fn send_transaction(&self, tx: &Value) -> Result<String>;

    /// Balance of `address` in the chain's smallest unit.
    async fn balance(&self, address: &str) -> Result<String>;

    /// The network the backend is bound to.
    fn network(&self) -> &ChainConfig;

    fn chain_id(&self) -> &ChainId {
        &self.network().chain_id
    }

    /// Rebinds the backend to another network.
    fn set_network(&mut self, network: ChainConfig) -> Result<()>;

    /// Transfers `amount` of a fungible token contract to `to`, returning the transaction hash.
    async fn transfer_token(&self, _token: &str, _to: &str, _amount: U256) -> Result<String> {
        Err(WalletError::unsupported(format!("token transfers on {}", self.family())))
    }
}

/// Creates the backend for `family` from a secret key.
pub fn backend(
    family: ChainFamily,
    secret: &str,
    network: ChainConfig,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn SigningBackend>> {
    network.validate()?;
    let backend: Box<dyn SigningBackend> = match family {
        ChainFamily::Evm => {
            Box::new(EvmBackend::new(key::parse_secp256k1(secret)?, network, transport)?)
        }
        ChainFamily::Solana => {
            Box::new(SolanaBackend::new(key::parse_ed25519(secret)?, network, transport))
        }
        ChainFamily::Near => {
            Box::new(NearBackend::new(key::parse_ed25519(secret)?, network, transport))
        }
        ChainFamily::MultiversX => {
            Box::new(MultiversXBackend::new(key::parse_ed25519(secret)?, network, transport)?)
        }
        ChainFamily::Sui => {
            Box::new(SuiBackend::new(key::parse_ed25519(secret)?, network, transport))
        }
    };
    debug!(target: "signer", %family, address = backend.account().address(), "created backend");
    Ok(backend)
}

/// Reads a required string member of a transaction payload.
pub(crate) fn str_field<'a>(tx: &'a Value, field: &str) -> Result<&'a str> {
    tx.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| WalletError::validation(field, "expected a string"))
}
