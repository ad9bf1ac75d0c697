//! Persistence behind an abstract key-value store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{collections::HashMap, fmt, sync::Arc};
use warden_core::{ChainId, Result, WalletError};

/// String key-value storage provided by the host.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    /// Removes the key, returning whether it existed.
    fn delete(&self, key: &str) -> bool;
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}

/// A fungible token added with `wallet_watchAsset`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomToken {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display,
)]
pub enum NftStandard {
    #[serde(rename = "ERC721")]
    #[strum(serialize = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    #[strum(serialize = "ERC1155")]
    Erc1155,
}

/// A non-fungible token added with `wallet_watchAsset`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftAsset {
    pub address: String,
    pub token_id: String,
    pub standard: NftStandard,
    pub chain_id: ChainId,
}

/// Per-account token and NFT lists, JSON encoded in a [`KeyValueStore`].
///
/// Tokens are kept per (account, chain), NFTs per account.
#[derive(Clone, Debug)]
pub struct AssetStore {
    store: Arc<dyn KeyValueStore>,
}

impl AssetStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn tokens(&self, account: &str, chain_id: &ChainId) -> Result<Vec<CustomToken>> {
        self.load(&tokens_key(account, chain_id))
    }

    /// Appends a token, failing if the contract is already in the list.
    pub fn add_token(&self, account: &str, chain_id: &ChainId, token: CustomToken) -> Result<()> {
        let key = tokens_key(account, chain_id);
        let mut tokens: Vec<CustomToken> = self.load(&key)?;
        if tokens.iter().any(|known| known.address.eq_ignore_ascii_case(&token.address)) {
            return Err(WalletError::validation(
                "address",
                format!("token {} is already added", token.address),
            ));
        }
        tokens.push(token);
        self.save(&key, &tokens)
    }

    pub fn nfts(&self, account: &str) -> Result<Vec<NftAsset>> {
        self.load(&nfts_key(account))
    }

    /// Appends an NFT, failing if the same token of the same contract is already in the list.
    pub fn add_nft(&self, account: &str, nft: NftAsset) -> Result<()> {
        let key = nfts_key(account);
        let mut nfts: Vec<NftAsset> = self.load(&key)?;
        if nfts.iter().any(|known| {
            known.chain_id == nft.chain_id &&
                known.token_id == nft.token_id &&
                known.address.eq_ignore_ascii_case(&nft.address)
        }) {
            return Err(WalletError::validation(
                "tokenId",
                format!("token {} of {} is already added", nft.token_id, nft.address),
            ));
        }
        nfts.push(nft);
        self.save(&key, &nfts)
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.store.get(key) {
            Some(json) => {
                serde_json::from_str(&json).map_err(|err| WalletError::validation(key, err))
            }
            None => Ok(Vec::new()),
        }
    }

    fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let json = serde_json::to_string(items).map_err(|err| WalletError::validation(key, err))?;
        self.store.set(key, json);
        Ok(())
    }
}

fn tokens_key(account: &str, chain_id: &ChainId) -> String {
    format!("tokens/{}/{chain_id}", account.to_ascii_lowercase())
}

fn nfts_key(account: &str) -> String {
    format!("nfts/{}", account.to_ascii_lowercase())
}
