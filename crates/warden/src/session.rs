//! A wallet session: one backend, its router and everything the request processor mutates.

use crate::{
    channel::HostChannel,
    config::WardenConfig,
    queue::{Placement, QueueSnapshot, RequestQueue},
    router::RemoteCallRouter,
    signer::{self, SigningBackend},
    store::{AssetStore, KeyValueStore},
    transport::Transport,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use warden_core::{
    ActivityLog, ActivityRecord, ChainConfig, ChainFamily, ChainId, HostMessage, NetworkRegistry,
    PermissionPolicy, Result, TxStatus, Upsert, WalletError,
};
use warden_rpc::{CallResult, RemoteCall, RequestId, RpcError};

/// Which account the session presents to the page.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountType {
    /// The key's own address.
    #[default]
    Eoa,
    /// The configured smart contract wallet.
    Scw,
}

/// Owns the router, the queues, the network registry, the activity log and the asset store.
///
/// Inbound calls enter through [`Session::on_call`], decisions through [`Session::approve`] and
/// [`Session::deny`]. A [`RequestProcessor`](crate::RequestProcessor) drains the session.
#[derive(Debug)]
pub struct Session {
    router: Arc<RemoteCallRouter>,
    queue: Mutex<RequestQueue>,
    /// Signalled whenever the process queue may have grown.
    notify: Notify,
    /// Held while an entry is processed.
    drain: AsyncMutex<()>,
    registry: Mutex<NetworkRegistry>,
    activity: Mutex<ActivityLog>,
    assets: AssetStore,
    account_type: Mutex<AccountType>,
    snapshot: watch::Sender<QueueSnapshot>,
    smart_account: Option<String>,
    transport: Arc<dyn Transport>,
}

impl Session {
    /// Creates a session around an existing backend.
    ///
    /// The backend's network is added to the configured networks if it isn't one of them.
    pub fn new(
        config: &WardenConfig,
        backend: Box<dyn SigningBackend>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let mut registry = config.registry();
        if !registry.contains(backend.chain_id()) {
            registry.upsert(backend.network().clone());
        }
        let router = RemoteCallRouter::new(backend, Arc::clone(&transport))?;
        let (snapshot, _) = watch::channel(QueueSnapshot::default());
        Ok(Self {
            router: Arc::new(router),
            queue: Mutex::new(RequestQueue::new(PermissionPolicy::new(config.mode))),
            notify: Notify::new(),
            drain: AsyncMutex::new(()),
            registry: Mutex::new(registry),
            activity: Mutex::new(ActivityLog::default()),
            assets: AssetStore::new(store),
            account_type: Mutex::new(AccountType::default()),
            snapshot,
            smart_account: config.smart_account.clone(),
            transport,
        })
    }

    /// Creates the backend for the configured family and active network, then the session.
    pub fn from_config(
        config: &WardenConfig,
        secret: &str,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let network =
            config.active_network().map_err(|err| WalletError::validation("config", err))?;
        let backend = signer::backend(config.family, secret, network, Arc::clone(&transport))?;
        Self::new(config, backend, transport, store)
    }

    pub fn router(&self) -> &Arc<RemoteCallRouter> {
        &self.router
    }

    pub fn family(&self) -> ChainFamily {
        self.router.family()
    }

    /// Attaches the outbound channel and emits `connect` if it wasn't emitted yet.
    pub async fn attach(&self, channel: Arc<dyn HostChannel>) -> bool {
        self.router.attach_channel(channel);
        self.router.connect().await
    }

    /// Accepts a call from the page.
    ///
    /// The call is stamped with the current network generation. A call that can't be queued is
    /// answered right away and `None` is returned.
    pub async fn on_call(&self, call: RemoteCall) -> Option<Placement> {
        let id = call.id_or_default();
        let generation = self.router.generation().await;
        let placement = self.queue.lock().enqueue(call, generation);
        match placement {
            Ok(placement) => {
                if placement == Placement::Queued {
                    self.notify.notify_one();
                }
                self.publish();
                Some(placement)
            }
            Err(err) => {
                warn!(target: "wallet::session", id, %err, "rejected call");
                self.router.reply(CallResult::error(id, RpcError::from(err)));
                None
            }
        }
    }

    /// Approves a pending call. Unknown ids are logged and ignored.
    pub fn approve(&self, id: RequestId) -> Result<()> {
        self.decide(id, true)
    }

    /// Denies a pending call. Unknown ids are logged and ignored.
    pub fn deny(&self, id: RequestId) -> Result<()> {
        self.decide(id, false)
    }

    fn decide(&self, id: RequestId, granted: bool) -> Result<()> {
        let decided = {
            let mut queue = self.queue.lock();
            if granted { queue.approve(id) } else { queue.deny(id) }
        };
        if let Err(err) = &decided {
            warn!(target: "wallet::session", id, granted, %err, "ignoring decision");
            return decided;
        }
        self.notify.notify_one();
        self.publish();
        Ok(())
    }

    /// Observes the queue, updated after every transition.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.queue.lock().snapshot()
    }

    pub(crate) fn publish(&self) {
        let snapshot = self.queue.lock().snapshot();
        self.snapshot.send_replace(snapshot);
    }

    pub(crate) fn pop(&self) -> Option<crate::queue::ProcessQueueEntry> {
        self.queue.lock().pop()
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await
    }

    pub(crate) fn drain_lock(&self) -> &AsyncMutex<()> {
        &self.drain
    }

    pub fn registry(&self) -> NetworkRegistry {
        self.registry.lock().clone()
    }

    pub fn network(&self, chain_id: &ChainId) -> Option<ChainConfig> {
        self.registry.lock().get(chain_id).cloned()
    }

    pub(crate) fn upsert_network(&self, network: ChainConfig) -> Upsert {
        self.registry.lock().upsert(network)
    }

    /// Rebinds the router to a known network.
    pub async fn switch_network(&self, chain_id: &ChainId) -> Result<()> {
        let network = self.network(chain_id).ok_or_else(|| {
            RpcError::unrecognized_chain(format!("unrecognized chain id {chain_id}"))
        })?;
        self.router.set_network(network).await
    }

    pub fn activity(&self, chain_id: &ChainId) -> Vec<ActivityRecord> {
        self.activity.lock().records(chain_id).to_vec()
    }

    pub(crate) fn record_activity(&self, chain_id: ChainId, record: ActivityRecord) {
        debug!(
            target: "wallet::session",
            %chain_id,
            hash = %record.hash,
            kind = %record.kind,
            "recorded activity"
        );
        self.activity.lock().append(chain_id, record);
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn account_type(&self) -> AccountType {
        *self.account_type.lock()
    }

    /// Switches the presented account and returns its address.
    pub(crate) async fn set_account_type(&self, account_type: AccountType) -> Result<String> {
        let address = match account_type {
            AccountType::Eoa => self.router.account().await.address().to_string(),
            AccountType::Scw => self
                .smart_account
                .clone()
                .ok_or_else(|| WalletError::validation("type", "no smart account is configured"))?,
        };
        *self.account_type.lock() = account_type;
        self.router.emit(HostMessage::AccountsChanged { address: address.clone() });
        Ok(address)
    }

    /// Polls receipts of pending transactions on the active network.
    ///
    /// Returns the number of records that left the pending state. Only EVM sessions have
    /// receipts, other families are left untouched.
    pub async fn refresh_activity(&self) -> Result<usize> {
        if self.family() != ChainFamily::Evm {
            return Ok(0);
        }
        let network = self.router.network().await;
        let url = network.rpc_url()?.clone();
        let pending = self.activity.lock().pending(&network.chain_id);

        let mut resolved = 0;
        for hash in pending {
            let receipt =
                self.transport.call(&url, "eth_getTransactionReceipt", json!([hash])).await?;
            let Some(status) = receipt_status(&receipt) else { continue };
            if self.activity.lock().resolve(&network.chain_id, &hash, status == TxStatus::Success) {
                trace!(target: "wallet::session", %hash, %status, "resolved transaction");
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}

/// Reads the outcome of a transaction receipt, `None` while it isn't mined.
fn receipt_status(receipt: &Value) -> Option<TxStatus> {
    match receipt.get("status")?.as_str()? {
        "0x1" => Some(TxStatus::Success),
        "0x0" => Some(TxStatus::Failed),
        _ => None,
    }
}
