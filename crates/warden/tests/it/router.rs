//! Routing, reply delivery and host events.

use crate::utils::{
    ED25519_SEED, EVM_ADDRESS, EVM_KEY, MAINNET_RPC, MockTransport, mainnet, polygon, url,
};
use serde_json::json;
use std::sync::Arc;
use warden::{
    LocalChannel, RemoteCallRouter,
    core::{ChainConfig, ChainFamily, HostMessage},
    rpc::{ErrorCode, RemoteCall, RpcError},
    signer,
};

fn evm_router(transport: &Arc<MockTransport>) -> RemoteCallRouter {
    let backend = signer::backend(ChainFamily::Evm, EVM_KEY, mainnet(), transport.clone()).unwrap();
    RemoteCallRouter::new(backend, transport.clone()).unwrap()
}

#[tokio::test]
async fn calls_without_id_answer_as_one() {
    let router = evm_router(&MockTransport::new());

    let first = router.request(RemoteCall::new("eth_accounts", vec![])).await;
    let second = router.request(RemoteCall::new("eth_chainId", vec![])).await;
    assert_eq!(first.id, 1);
    assert_eq!(second.id, 1);
    assert_eq!(first.success(), Some(&json!([EVM_ADDRESS])));
    assert_eq!(second.success(), Some(&json!("0x1")));

    let tagged = router.request(RemoteCall::new("eth_accounts", vec![]).with_id(9)).await;
    assert_eq!(tagged.id, 9);
}

#[tokio::test]
async fn answers_identity_locally() {
    let transport = MockTransport::new();
    let router = evm_router(&transport);

    let net_version = router.request(RemoteCall::new("net_version", vec![])).await;
    assert_eq!(net_version.success(), Some(&json!("1")));
    let chain_id = router.request(RemoteCall::new("getChainId", vec![])).await;
    assert_eq!(chain_id.success(), Some(&json!("0x1")));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn relays_unknown_methods_verbatim() {
    let transport = MockTransport::new();
    transport
        .respond("eth_blockNumber", json!("0x10"))
        .fail("eth_call", RpcError::with_message(ErrorCode::ServerError(3), "execution reverted"));
    let router = evm_router(&transport);

    let block = router.request(RemoteCall::new("eth_blockNumber", vec![]).with_id(4)).await;
    assert_eq!(block.success(), Some(&json!("0x10")));
    let relayed = &transport.calls_to("eth_blockNumber")[0];
    assert_eq!(relayed.url, url(MAINNET_RPC));
    assert_eq!(relayed.params, json!([]));

    let call = RemoteCall::new("eth_call", vec![json!({ "to": EVM_ADDRESS })]);
    let reverted = router.request(call).await;
    let err = reverted.as_error().unwrap();
    assert_eq!(err.code, ErrorCode::ServerError(3));
    assert_eq!(err.message, "execution reverted");
    assert_eq!(transport.calls_to("eth_call")[0].params, json!([{ "to": EVM_ADDRESS }]));
}

#[tokio::test]
async fn wallet_methods_of_other_families_are_unsupported() {
    let transport = MockTransport::new();
    let router = evm_router(&transport);

    let reply = router.request(RemoteCall::new("near_signMessage", vec![json!("hi")])).await;
    assert_eq!(reply.as_error().unwrap().code, ErrorCode::UnsupportedMethod);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn multiversx_has_no_relay() {
    let transport = MockTransport::new();
    let network = ChainConfig::new("D", "Devnet", url("https://devnet-gateway.multiversx.com"));
    let backend =
        signer::backend(ChainFamily::MultiversX, ED25519_SEED, network, transport.clone()).unwrap();
    let router = RemoteCallRouter::new(backend, transport.clone()).unwrap();

    let reply = router.request(RemoteCall::new("eth_blockNumber", vec![])).await;
    assert_eq!(reply.as_error().unwrap().code, ErrorCode::MethodNotFound);
    let chain_id = router.request(RemoteCall::new("getChainId", vec![])).await;
    assert_eq!(chain_id.success(), Some(&json!("D")));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn signs_messages_for_the_page() {
    let router = evm_router(&MockTransport::new());

    let reply = router
        .request(RemoteCall::new("personal_sign", vec![json!("0xdead"), json!(EVM_ADDRESS)]))
        .await;
    assert_eq!(
        reply.success(),
        Some(&json!("0x4eb35e0c5be5750efb0436c6fe9154056d3545d7a7e9e94c2e5307d7cdc307370d00ef949c9aad54f96890eee73d23abdee5f8664d2fcb26e03cdc7a51c763901c"))
    );

    let stranger = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    let call = RemoteCall::new("personal_sign", vec![json!("0xdead"), json!(stranger)]);
    let reply = router.request(call).await;
    assert_eq!(reply.as_error().unwrap().code, ErrorCode::Unauthorized);

    let reply = router.request(RemoteCall::new("personal_sign", vec![])).await;
    assert_eq!(reply.as_error().unwrap().code, ErrorCode::InvalidParams);
}

#[tokio::test]
async fn solana_sign_message_returns_the_public_key() {
    let transport = MockTransport::new();
    let network = ChainConfig::new("devnet", "Devnet", url("https://api.devnet.solana.com"));
    let backend =
        signer::backend(ChainFamily::Solana, ED25519_SEED, network, transport.clone()).unwrap();
    let router = RemoteCallRouter::new(backend, transport).unwrap();

    let reply = router.request(RemoteCall::new("signMessage", vec![json!("hello warden")])).await;
    assert_eq!(
        reply.success(),
        Some(&json!({
            "signature": "5EtpcwURf5nMdEq3vrgSMEbXx7684UVRcrv6Z8LL9BhV7e7LzjhVpFMmLT1ZRYZdA2QQLeiXxTucg6wmfTQQYyzH",
            "publicKey": "5CoLy9mVnXz68CSpSSigBVfCLepyX5xF89x4TAG5JRd1",
        }))
    );
}

#[tokio::test]
async fn connect_is_emitted_once() {
    let router = evm_router(&MockTransport::new());
    let (channel, mut rx) = LocalChannel::pair();
    router.attach_channel(Arc::new(channel));

    assert!(router.connect().await);
    assert!(!router.connect().await);
    assert_eq!(rx.try_recv().unwrap(), HostMessage::Connect { chain_id: "0x1".to_string() });
    assert!(rx.try_recv().is_err());
    assert!(router.is_connected());
}

#[tokio::test]
async fn events_without_a_channel_are_dropped() {
    let router = evm_router(&MockTransport::new());

    // consumed even though nobody listens
    assert!(!router.connect().await);
    assert!(!router.emit(HostMessage::AccountsChanged { address: EVM_ADDRESS.to_string() }));

    let (channel, mut rx) = LocalChannel::pair();
    router.attach_channel(Arc::new(channel));
    assert!(!router.connect().await);
    assert!(rx.try_recv().is_err());

    router.set_network(polygon()).await.unwrap();
    assert_eq!(rx.try_recv().unwrap(), HostMessage::ChainChanged { chain_id: "0x89".to_string() });
}

#[tokio::test]
async fn set_network_rebinds_everything() {
    let transport = MockTransport::new();
    transport.respond("eth_blockNumber", json!("0x1"));
    let router = evm_router(&transport);
    assert_eq!(router.generation().await, 0);

    router.set_network(polygon()).await.unwrap();
    assert_eq!(router.generation().await, 1);
    assert_eq!(router.network().await.chain_id.as_u64(), Some(137));

    let chain_id = router.request(RemoteCall::new("eth_chainId", vec![])).await;
    assert_eq!(chain_id.success(), Some(&json!("0x89")));
    router.request(RemoteCall::new("eth_blockNumber", vec![])).await;
    assert_eq!(transport.calls_to("eth_blockNumber")[0].url, url(crate::utils::POLYGON_RPC));

    // invalid networks leave the binding untouched
    let mut broken = polygon();
    broken.rpc_urls.clear();
    assert!(router.set_network(broken).await.is_err());
    assert_eq!(router.generation().await, 1);
}

#[tokio::test]
async fn stale_generations_never_reach_the_backend() {
    let transport = MockTransport::new();
    transport.script_evm().respond("eth_sendRawTransaction", json!("0xfeed"));
    let router = evm_router(&transport);
    router.set_network(polygon()).await.unwrap();

    let call =
        RemoteCall::new("eth_sendTransaction", vec![json!({ "to": EVM_ADDRESS })]).with_id(3);
    let reply = router.dispatch(call, 0).await;
    assert_eq!(reply.id, 3);
    assert_eq!(reply.as_error().unwrap().code, ErrorCode::ChainDisconnected);
    assert!(transport.calls().is_empty());
}
