//! Session configuration.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use warden_core::{ChainConfig, ChainFamily, ChainId, NetworkRegistry, UiMode};

/// Errors while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Extract(#[from] Box<figment::Error>),
    #[error("no {0} network is configured")]
    NoNetwork(ChainFamily),
    #[error("default chain {0} is not among the configured networks")]
    UnknownDefaultChain(ChainId),
    #[error("invalid network {name}: {reason}")]
    InvalidNetwork { name: String, reason: String },
}

/// Configuration of a wallet session.
///
/// Loaded from defaults, then `warden.toml`, then `WARDEN_` prefixed environment variables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// How the wallet is presented, decides which calls need approval.
    pub mode: UiMode,
    /// The chain family of the session key.
    pub family: ChainFamily,
    /// The network to bind to at startup, the first configured network if unset.
    pub default_chain: Option<ChainId>,
    /// Known networks.
    pub networks: Vec<ChainConfig>,
    /// Smart contract wallet address used by the `scw` account type.
    pub smart_account: Option<String>,
    /// `tracing` filter, overridden by `RUST_LOG`.
    pub log: String,
    /// Timeout of network requests in seconds.
    pub request_timeout: u64,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            mode: UiMode::default(),
            family: ChainFamily::default(),
            default_chain: None,
            networks: Vec::new(),
            smart_account: None,
            log: "warden=info".to_string(),
            request_timeout: 30,
        }
    }
}

impl WardenConfig {
    /// The default config file name.
    pub const FILE_NAME: &'static str = "warden.toml";

    /// Environment variable prefix.
    pub const ENV_PREFIX: &'static str = "WARDEN_";

    /// Returns the figment for `path`, or [`Self::FILE_NAME`] in the working directory.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(Self::FILE_NAME));
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(Self::ENV_PREFIX).ignore(&["PRIVATE_KEY"]))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path).extract().map_err(|err| ConfigError::Extract(Box::new(err)))
    }

    pub fn registry(&self) -> NetworkRegistry {
        NetworkRegistry::new(self.networks.iter().cloned())
    }

    /// The network the session binds to at startup.
    pub fn active_network(&self) -> Result<ChainConfig, ConfigError> {
        let network = match &self.default_chain {
            Some(chain_id) => self
                .networks
                .iter()
                .find(|network| &network.chain_id == chain_id)
                .ok_or_else(|| ConfigError::UnknownDefaultChain(chain_id.clone()))?,
            None => self.networks.first().ok_or(ConfigError::NoNetwork(self.family))?,
        };
        network.validate().map_err(|err| ConfigError::InvalidNetwork {
            name: network.name.clone(),
            reason: err.to_string(),
        })?;
        Ok(network.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
