//! Drains the process queue.
//!
//! The processor is the error boundary of a session: every entry it pops is answered exactly
//! once, with the id it arrived with, whatever happens while it is handled.

use crate::{
    queue::ProcessQueueEntry,
    session::{AccountType, Session},
    signer::evm,
    store::{CustomToken, NftAsset, NftStandard},
};
use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use url::Url;
use warden_core::{
    ActivityKind, ActivityRecord, ChainConfig, ChainFamily, ChainId, NativeCurrency, Result,
    ToRpcResponseResult, Upsert, WalletError, WalletMethod, serde_helpers::normalize_quantity,
};
use warden_rpc::{CallResult, RemoteCall, RpcError};

/// Longest accepted ERC-20 symbol.
pub const MAX_TOKEN_SYMBOL_LEN: usize = 11;

/// Largest accepted ERC-20 decimals.
pub const MAX_TOKEN_DECIMALS: u8 = 36;

/// Decimals every EVM native currency must have.
pub const NATIVE_CURRENCY_DECIMALS: u8 = 18;

/// Transaction fields that are coerced to hex quantities.
const QUANTITY_FIELDS: &[&str] =
    &["value", "gas", "gasPrice", "maxFeePerGas", "maxPriorityFeePerGas", "nonce", "chainId"];

/// Transaction fields that are never forwarded to the backend.
const STRIPPED_FIELDS: &[&str] = &["type", "gasLimit"];

/// Processes decided calls one at a time, in order.
#[derive(Clone, Debug)]
pub struct RequestProcessor {
    session: Arc<Session>,
}

impl RequestProcessor {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Processes the next entry, if any, and returns the reply that was sent.
    pub async fn process_next(&self) -> Option<CallResult> {
        let _guard = self.session.drain_lock().lock().await;
        self.process_one().await
    }

    /// Processes entries until the process queue is empty.
    ///
    /// Concurrent drains are serialised, a second drain finds nothing left to do.
    pub async fn drain(&self) -> Vec<CallResult> {
        let _guard = self.session.drain_lock().lock().await;
        let mut replies = Vec::new();
        while let Some(reply) = self.process_one().await {
            replies.push(reply);
        }
        replies
    }

    /// Drains the queue every time the session signals new work. Never returns.
    pub async fn run(self) {
        loop {
            let replies = self.drain().await;
            if !replies.is_empty() {
                trace!(target: "wallet::processor", count = replies.len(), "drained queue");
            }
            self.session.notified().await;
        }
    }

    async fn process_one(&self) -> Option<CallResult> {
        let entry = self.session.pop()?;
        let reply = self.process(entry).await;
        self.session.router().reply(reply.clone());
        self.session.publish();
        Some(reply)
    }

    async fn process(&self, entry: ProcessQueueEntry) -> CallResult {
        let id = entry.id();
        if !entry.permission_granted {
            debug!(
                target: "wallet::processor",
                id,
                method = %entry.request.method,
                "denied by user"
            );
            return CallResult::error(id, RpcError::user_denied());
        }

        let method = WalletMethod::parse(&entry.request.method);
        let result = match method {
            Some(method) if method.is_administrative() => {
                self.administrate(method, &entry.request).await
            }
            _ => return self.forward(entry, method).await,
        };
        if let Err(err) = &result {
            debug!(
                target: "wallet::processor",
                id,
                method = %entry.request.method,
                %err,
                "request failed"
            );
        }
        CallResult::new(id, result.to_rpc_result())
    }

    async fn administrate(&self, method: WalletMethod, call: &RemoteCall) -> Result<Value> {
        let family = self.session.family();
        if !method.supported_by(family) {
            return Err(WalletError::unsupported(format!("{method} on {family}")));
        }
        match method {
            WalletMethod::WalletAddEthereumChain => self.add_chain(call).await,
            WalletMethod::WalletSwitchEthereumChain => self.switch_chain(call).await,
            WalletMethod::WalletWatchAsset => self.watch_asset(call).await,
            WalletMethod::SwitchAccountType => self.switch_account_type(call).await,
            other => Err(WalletError::unsupported(other.to_string())),
        }
    }

    /// Sanitizes and dispatches a call through the router.
    async fn forward(&self, entry: ProcessQueueEntry, method: Option<WalletMethod>) -> CallResult {
        let router = self.session.router();
        let call = sanitize(router.family(), entry.request);
        let Some(method) = method.filter(|method| method.is_network_bound()) else {
            return router.request(call).await;
        };

        let chain_id = router.network().await.chain_id;
        let reply = router.dispatch(call.clone(), entry.generation).await;
        if method.broadcasts() &&
            let Some(hash) = reply.success().and_then(Value::as_str)
        {
            let from = router.account().await.address().to_string();
            self.session.record_activity(chain_id, activity(router.family(), &call, hash, from));
        }
        reply
    }

    async fn add_chain(&self, call: &RemoteCall) -> Result<Value> {
        let params: AddChainParams = decode_param(call)?;
        let network = params.into_config()?;
        let chain_id = network.chain_id.clone();

        let url = network.rpc_url()?;
        let reported = self.session.transport().call(url, "eth_chainId", json!([])).await?;
        let reported = reported
            .as_str()
            .map(ChainId::new)
            .ok_or_else(|| WalletError::validation("rpcUrls", "eth_chainId returned no chain id"))?;
        if reported != chain_id {
            return Err(WalletError::validation(
                "chainId",
                format!("{url} reports chain id {reported}, expected {chain_id}"),
            ));
        }

        match self.session.upsert_network(network) {
            Upsert::Inserted => debug!(target: "wallet::processor", %chain_id, "added network"),
            Upsert::Updated => debug!(target: "wallet::processor", %chain_id, "updated network"),
        }
        Ok(Value::Null)
    }

    async fn switch_chain(&self, call: &RemoteCall) -> Result<Value> {
        let params: SwitchChainParams = decode_param(call)?;
        self.session.switch_network(&params.chain_id).await?;
        Ok(Value::Null)
    }

    async fn watch_asset(&self, call: &RemoteCall) -> Result<Value> {
        let params: WatchAssetParams = decode_param(call)?;
        let router = self.session.router();
        let account = router.account().await.address().to_string();
        let chain_id = router.network().await.chain_id;
        let address = checksum(&params.options.address)?;

        if params.kind.eq_ignore_ascii_case("ERC20") {
            let symbol = params
                .options
                .symbol
                .filter(|symbol| !symbol.is_empty())
                .ok_or_else(|| WalletError::validation("symbol", "a token symbol is required"))?;
            if symbol.chars().count() > MAX_TOKEN_SYMBOL_LEN {
                return Err(WalletError::validation(
                    "symbol",
                    format!("must be at most {MAX_TOKEN_SYMBOL_LEN} characters"),
                ));
            }
            let decimals = params
                .options
                .decimals
                .ok_or_else(|| WalletError::validation("decimals", "token decimals are required"))?;
            if decimals > u64::from(MAX_TOKEN_DECIMALS) {
                return Err(WalletError::validation(
                    "decimals",
                    format!("must be at most {MAX_TOKEN_DECIMALS}"),
                ));
            }
            let token = CustomToken {
                address,
                symbol,
                decimals: decimals as u8,
                image: params.options.image,
            };
            self.session.assets().add_token(&account, &chain_id, token)?;
        } else {
            let standard: NftStandard = params
                .kind
                .to_ascii_uppercase()
                .parse()
                .map_err(|_| {
                    WalletError::validation("type", format!("unknown asset type {}", params.kind))
                })?;
            let token_id = params
                .options
                .token_id
                .as_ref()
                .map(token_id)
                .transpose()?
                .ok_or_else(|| WalletError::validation("tokenId", "a token id is required"))?;
            let nft = NftAsset { address, token_id, standard, chain_id };
            self.session.assets().add_nft(&account, nft)?;
        }
        Ok(Value::Bool(true))
    }

    async fn switch_account_type(&self, call: &RemoteCall) -> Result<Value> {
        let kind = match call.param(0) {
            Some(Value::String(kind)) => kind.as_str(),
            Some(Value::Object(params)) => {
                params.get("type").and_then(Value::as_str).unwrap_or_default()
            }
            _ => "",
        };
        let account_type: AccountType = kind.parse().map_err(|_| {
            WalletError::validation("type", format!("expected eoa or scw, got {kind:?}"))
        })?;
        self.session.set_account_type(account_type).await.map(Value::String)
    }
}

/// Normalises a call before it reaches the router.
///
/// EVM transactions get `gas` from `gasLimit`, hex quantities and no `type`. `personal_sign`
/// params given as `[address, message]` are put back in order.
pub fn sanitize(family: ChainFamily, mut call: RemoteCall) -> RemoteCall {
    if family != ChainFamily::Evm {
        return call;
    }
    match WalletMethod::parse(&call.method) {
        Some(WalletMethod::EthSendTransaction | WalletMethod::EthSignTransaction) => {
            if let Some(Value::Object(tx)) = call.params.first_mut() {
                sanitize_transaction(tx);
            }
        }
        Some(WalletMethod::PersonalSign) => {
            if let [first, second, ..] = call.params.as_mut_slice() &&
                is_address(first) &&
                !is_address(second)
            {
                std::mem::swap(first, second);
            }
        }
        _ => {}
    }
    call
}

fn sanitize_transaction(tx: &mut Map<String, Value>) {
    if !tx.contains_key("gas") &&
        let Some(gas) = tx.get("gasLimit").cloned()
    {
        tx.insert("gas".to_string(), gas);
    }
    for field in STRIPPED_FIELDS {
        tx.remove(*field);
    }
    for field in QUANTITY_FIELDS {
        if let Some(value) = tx.get_mut(*field) {
            *value = normalize_quantity(value);
        }
    }
}

fn is_address(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.len() == 42 && s.parse::<Address>().is_ok())
}

/// Builds the activity record of a broadcast transaction.
fn activity(family: ChainFamily, call: &RemoteCall, hash: &str, from: String) -> ActivityRecord {
    let tx = call.param(0).unwrap_or(&Value::Null);
    let kind = match family {
        ChainFamily::Evm if evm::has_calldata(tx) => ActivityKind::ContractCall,
        ChainFamily::Evm => ActivityKind::Transfer,
        _ => ActivityKind::Transaction,
    };
    let mut record = ActivityRecord::pending(hash, kind, from);
    if let Some(to) = evm::recipient(tx).or_else(|| {
        tx.get("receiverId").and_then(Value::as_str).map(str::to_string)
    }) {
        record = record.with_to(to);
    }
    if let Some(value) = tx.get("value").and_then(Value::as_str) {
        record = record.with_amount(value);
    }
    record
}

fn decode_param<T: serde::de::DeserializeOwned>(call: &RemoteCall) -> Result<T> {
    let param = call
        .param(0)
        .cloned()
        .ok_or_else(|| WalletError::validation("params", "missing parameter 0"))?;
    serde_json::from_value(param).map_err(|err| WalletError::validation("params", err))
}

fn checksum(address: &str) -> Result<String> {
    address
        .parse::<Address>()
        .map(|address| address.to_checksum(None))
        .map_err(|err| WalletError::validation("address", err))
}

fn token_id(value: &Value) -> Result<String> {
    match value {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(WalletError::validation("tokenId", format!("invalid token id {other}"))),
    }
}

/// `wallet_addEthereumChain` params, as in EIP-3085.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddChainParams {
    chain_id: String,
    #[serde(default)]
    chain_name: String,
    #[serde(default)]
    rpc_urls: Vec<String>,
    #[serde(default)]
    block_explorer_urls: Option<Vec<String>>,
    native_currency: Option<NativeCurrency>,
}

impl AddChainParams {
    fn into_config(self) -> Result<ChainConfig> {
        let chain_id = ChainId::new(&self.chain_id);
        if chain_id.as_u64().is_none_or(|id| id == 0) {
            return Err(WalletError::validation(
                "chainId",
                format!("{} is not a valid chain id", self.chain_id),
            ));
        }
        if self.chain_name.trim().is_empty() {
            return Err(WalletError::validation("chainName", "a chain name is required"));
        }
        let rpc_urls = parse_urls("rpcUrls", &self.rpc_urls)?;
        let explorer_urls =
            parse_urls("blockExplorerUrls", &self.block_explorer_urls.unwrap_or_default())?;
        if let Some(currency) = &self.native_currency &&
            currency.decimals != NATIVE_CURRENCY_DECIMALS
        {
            return Err(WalletError::validation(
                "nativeCurrency",
                format!("decimals must be {NATIVE_CURRENCY_DECIMALS}"),
            ));
        }

        let network = ChainConfig {
            chain_id,
            name: self.chain_name,
            rpc_urls,
            explorer_urls,
            native_currency: self.native_currency,
        };
        network.validate()?;
        Ok(network)
    }
}

fn parse_urls(field: &str, urls: &[String]) -> Result<Vec<Url>> {
    urls.iter()
        .map(|url| {
            let url = Url::parse(url).map_err(|err| WalletError::validation(field, err))?;
            if matches!(url.scheme(), "http" | "https") {
                Ok(url)
            } else {
                Err(WalletError::validation(field, format!("{url} is not an http(s) url")))
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchChainParams {
    chain_id: ChainId,
}

/// `wallet_watchAsset` params, as in EIP-747.
#[derive(Debug, Deserialize)]
struct WatchAssetParams {
    #[serde(rename = "type")]
    kind: String,
    options: AssetOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetOptions {
    address: String,
    symbol: Option<String>,
    decimals: Option<u64>,
    image: Option<String>,
    token_id: Option<Value>,
}
