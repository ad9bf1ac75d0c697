//! Network descriptions.

use crate::{
    account::{Ed25519Variant, SignatureScheme},
    error::{Result, WalletError},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};
use url::Url;

/// A signature scheme plus transaction format grouping.
///
/// Selected once per session; decides which backend owns the key.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChainFamily {
    #[default]
    Evm,
    Solana,
    Near,
    MultiversX,
    Sui,
}

impl ChainFamily {
    /// The signature scheme accounts of this family sign with.
    pub const fn scheme(self) -> SignatureScheme {
        match self {
            Self::Evm => SignatureScheme::Secp256k1,
            Self::Solana => SignatureScheme::Ed25519(Ed25519Variant::Solana),
            Self::Near => SignatureScheme::Ed25519(Ed25519Variant::Near),
            Self::MultiversX => SignatureScheme::Ed25519(Ed25519Variant::MultiversX),
            Self::Sui => SignatureScheme::Ed25519(Ed25519Variant::Sui),
        }
    }

    /// Whether the family's nodes speak JSON-RPC, so unknown methods can be relayed verbatim.
    pub const fn has_rpc_relay(self) -> bool {
        !matches!(self, Self::MultiversX)
    }

    /// Formats a chain id the way hosts of this family expect it in events.
    ///
    /// EVM chain ids are hex quantities, see
    /// [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193#chainchanged).
    pub fn format_chain_id(self, chain_id: &ChainId) -> String {
        match (self, chain_id.as_u64()) {
            (Self::Evm, Some(id)) => format!("{id:#x}"),
            _ => chain_id.to_string(),
        }
    }
}

/// Identifier of a network.
///
/// Numeric ids are normalised to their decimal form, so `0x89` and `137` are the same chain.
/// Everything else (`mainnet-beta`, `testnet`, `D`) is kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        let numeric = if let Some(hex) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).ok()
        } else if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
            id.parse::<u64>().ok()
        } else {
            None
        };
        match numeric {
            Some(id) => Self(id.to_string()),
            None => Self(id.to_string()),
        }
    }

    /// Returns the numeric value of the id, if it is numeric.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl FromStr for ChainId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(u64),
            Str(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Num(id) => Self::from(id),
            Repr::Str(id) => Self::new(id),
        })
    }
}

/// The native currency of a network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A network binding, supplied by the host whenever the active network changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    /// RPC endpoints, the first one is the primary.
    pub rpc_urls: Vec<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub explorer_urls: Vec<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_currency: Option<NativeCurrency>,
}

impl ChainConfig {
    pub fn new(chain_id: impl Into<ChainId>, name: impl Into<String>, rpc_url: Url) -> Self {
        Self {
            chain_id: chain_id.into(),
            name: name.into(),
            rpc_urls: vec![rpc_url],
            explorer_urls: Vec::new(),
            native_currency: None,
        }
    }

    /// Returns the primary RPC endpoint.
    pub fn rpc_url(&self) -> Result<&Url> {
        self.rpc_urls
            .first()
            .ok_or_else(|| {
                WalletError::unreachable(format!("no rpc url configured for {}", self.name))
            })
    }

    /// Checks that the config can be bound to.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_urls.is_empty() {
            return Err(WalletError::validation("rpcUrls", "at least one rpc url is required"));
        }
        let unsupported =
            self.rpc_urls.iter().find(|url| !matches!(url.scheme(), "http" | "https"));
        if let Some(url) = unsupported {
            return Err(WalletError::validation("rpcUrls", format!("unsupported scheme in {url}")));
        }
        if self.chain_id.as_str().is_empty() {
            return Err(WalletError::validation("chainId", "chain id must not be empty"));
        }
        Ok(())
    }
}

/// Outcome of [`NetworkRegistry::upsert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// The networks a session knows about, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRegistry {
    networks: Vec<ChainConfig>,
}

impl NetworkRegistry {
    pub fn new(networks: impl IntoIterator<Item = ChainConfig>) -> Self {
        let mut registry = Self::default();
        for network in networks {
            registry.upsert(network);
        }
        registry
    }

    pub fn get(&self, chain_id: &ChainId) -> Option<&ChainConfig> {
        self.networks.iter().find(|network| &network.chain_id == chain_id)
    }

    pub fn contains(&self, chain_id: &ChainId) -> bool {
        self.get(chain_id).is_some()
    }

    /// Inserts the network, or merges it into the known network with the same chain id.
    ///
    /// On merge the new RPC urls take precedence and previously known ones are kept as
    /// fallbacks, explorer urls and currency are replaced when given.
    pub fn upsert(&mut self, network: ChainConfig) -> Upsert {
        let Some(existing) = self.networks.iter_mut().find(|n| n.chain_id == network.chain_id)
        else {
            self.networks.push(network);
            return Upsert::Inserted;
        };

        let mut rpc_urls = network.rpc_urls;
        for url in existing.rpc_urls.drain(..) {
            if !rpc_urls.contains(&url) {
                rpc_urls.push(url);
            }
        }
        existing.rpc_urls = rpc_urls;
        if !network.explorer_urls.is_empty() {
            existing.explorer_urls = network.explorer_urls;
        }
        if network.native_currency.is_some() {
            existing.native_currency = network.native_currency;
        }
        Upsert::Updated
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.networks.iter()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
