//! Routing of remote calls to the backend or the network.

use crate::{channel::HostChannel, signer::SigningBackend, transport::Transport};
use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use serde_json::Value;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::RwLock;
use warden_core::{
    Account, ChainConfig, ChainFamily, HostMessage, Result, ToRpcResponseResult, WalletError,
};
use warden_rpc::{CallResult, RemoteCall, RpcError};

mod identity;
mod relay;
mod wallet;

pub use identity::NetworkIdentity;
pub use relay::NetworkRelay;
pub use wallet::WalletMiddleware;

/// A stage of the routing pipeline.
#[async_trait]
pub trait Middleware: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether this stage answers `method`.
    fn handles(&self, method: &str) -> bool;

    async fn handle(&self, call: &RemoteCall, backend: &dyn SigningBackend) -> Result<Value>;
}

/// Builds the pipeline for a network: identity, wallet, then the relay for JSON-RPC families.
pub fn pipeline(
    family: ChainFamily,
    network: &ChainConfig,
    transport: &Arc<dyn Transport>,
) -> Result<Vec<Box<dyn Middleware>>> {
    let mut stages: Vec<Box<dyn Middleware>> = vec![
        Box::new(NetworkIdentity::new(family, network.chain_id.clone())),
        Box::new(WalletMiddleware::new(family)),
    ];
    if family.has_rpc_relay() {
        stages.push(Box::new(NetworkRelay::new(network.rpc_url()?.clone(), Arc::clone(transport))));
    }
    Ok(stages)
}

/// Everything that changes together when the network changes.
#[derive(Debug)]
struct Binding {
    /// Bumped on every rebind.
    generation: u64,
    pipeline: Vec<Box<dyn Middleware>>,
    backend: Box<dyn SigningBackend>,
}

impl Binding {
    async fn route(&self, call: &RemoteCall) -> Result<Value> {
        let Some(stage) = self.pipeline.iter().find(|stage| stage.handles(&call.method)) else {
            return Err(RpcError::method_not_found().into());
        };
        trace!(target: "rpc::router", method = %call.method, stage = stage.name(), "routing call");
        stage.handle(call, self.backend.as_ref()).await
    }
}

/// Resolves remote calls against one backend and emits host events.
///
/// Calls hold the shared side of the binding lock for their whole duration, a rebind takes the
/// exclusive side. A call therefore runs entirely against one network.
pub struct RemoteCallRouter {
    family: ChainFamily,
    binding: RwLock<Binding>,
    transport: Arc<dyn Transport>,
    channel: SyncRwLock<Option<Arc<dyn HostChannel>>>,
    /// Whether `connect` was emitted.
    connected: AtomicBool,
}

impl fmt::Debug for RemoteCallRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCallRouter")
            .field("family", &self.family)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl RemoteCallRouter {
    pub fn new(backend: Box<dyn SigningBackend>, transport: Arc<dyn Transport>) -> Result<Self> {
        let family = backend.family();
        let pipeline = pipeline(family, backend.network(), &transport)?;
        Ok(Self {
            family,
            binding: RwLock::new(Binding { generation: 0, pipeline, backend }),
            transport,
            channel: SyncRwLock::new(None),
            connected: AtomicBool::new(false),
        })
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }

    /// Routes a call, assigning the default id if it has none.
    ///
    /// Never fails, errors are returned as the error member of the result.
    pub async fn request(&self, call: RemoteCall) -> CallResult {
        let binding = self.binding.read().await;
        Self::execute(&binding, call).await
    }

    /// Routes a call that was accepted under network `generation`.
    ///
    /// If the network was rebound since, the call is rejected without reaching the backend.
    pub async fn dispatch(&self, call: RemoteCall, generation: u64) -> CallResult {
        let binding = self.binding.read().await;
        if binding.generation != generation {
            debug!(
                target: "rpc::router",
                method = %call.method,
                stamped = generation,
                current = binding.generation,
                "rejecting call from a previous network"
            );
            let err = WalletError::unreachable("the network changed while the request was queued");
            return CallResult::new(call.id_or_default(), Err::<(), _>(err).to_rpc_result());
        }
        Self::execute(&binding, call).await
    }

    async fn execute(binding: &Binding, call: RemoteCall) -> CallResult {
        let id = call.id_or_default();
        let result = binding.route(&call).await;
        if let Err(err) = &result {
            debug!(target: "rpc::router", method = %call.method, id, %err, "call failed");
        }
        CallResult::new(id, result.to_rpc_result())
    }

    /// Rebinds backend and pipeline to `network`, then emits `chainChanged`.
    ///
    /// Waits for in-flight calls to finish. On error nothing changes.
    pub async fn set_network(&self, network: ChainConfig) -> Result<()> {
        network.validate()?;
        let chain_id = self.family.format_chain_id(&network.chain_id);
        {
            let mut binding = self.binding.write().await;
            let pipeline = pipeline(self.family, &network, &self.transport)?;
            binding.backend.set_network(network)?;
            binding.pipeline = pipeline;
            binding.generation += 1;
            debug!(
                target: "rpc::router",
                %chain_id,
                generation = binding.generation,
                "rebound network"
            );
        }
        self.emit(HostMessage::ChainChanged { chain_id });
        Ok(())
    }

    /// The current binding generation, stamped onto queued calls.
    pub async fn generation(&self) -> u64 {
        self.binding.read().await.generation
    }

    pub async fn network(&self) -> ChainConfig {
        self.binding.read().await.backend.network().clone()
    }

    pub async fn account(&self) -> Account {
        self.binding.read().await.backend.account().clone()
    }

    /// Runs `f` against the backend under the shared binding lock.
    pub async fn with_backend<R>(&self, f: impl FnOnce(&dyn SigningBackend) -> R) -> R {
        let binding = self.binding.read().await;
        f(binding.backend.as_ref())
    }

    /// Attaches the outbound channel, replacing any previous one.
    pub fn attach_channel(&self, channel: Arc<dyn HostChannel>) {
        *self.channel.write() = Some(channel);
    }

    /// Emits `connect`, once per router.
    ///
    /// The event is consumed even if no channel is attached yet, so it may be lost.
    pub async fn connect(&self) -> bool {
        if self.connected.swap(true, Ordering::SeqCst) {
            trace!(target: "rpc::router", "connect already emitted");
            return false;
        }
        let chain_id = {
            let binding = self.binding.read().await;
            self.family.format_chain_id(binding.backend.chain_id())
        };
        self.emit(HostMessage::Connect { chain_id })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends a message to the host. Without a channel the message is dropped.
    pub fn emit(&self, message: HostMessage) -> bool {
        let Some(channel) = self.channel.read().clone() else {
            debug!(
                target: "rpc::router",
                event = message.name(),
                "no host channel, dropping event"
            );
            return false;
        };
        let delivered = channel.send(message);
        if !delivered {
            warn!(target: "rpc::router", "host channel closed");
        }
        delivered
    }

    pub fn reply(&self, result: CallResult) -> bool {
        self.emit(HostMessage::Reply(result))
    }
}
