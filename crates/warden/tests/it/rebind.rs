//! Network rebinds racing queued and in-flight calls.

use crate::utils::{EVM_ADDRESS, MAINNET_RPC, MockTransport, evm_session, polygon, url};
use serde_json::{Value, json};
use std::time::Duration;
use warden::{
    RequestProcessor,
    core::UiMode,
    rpc::{ErrorCode, RemoteCall},
};

fn send(id: u64) -> RemoteCall {
    let tx = json!({ "from": EVM_ADDRESS, "to": EVM_ADDRESS, "value": "0x1" });
    RemoteCall::new("eth_sendTransaction", vec![tx]).with_id(id)
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_transactions_do_not_follow_a_switch() {
    let transport = MockTransport::new();
    transport.script_evm().respond("eth_sendRawTransaction", json!("0xfeed"));
    let (session, _rx) = evm_session(UiMode::Full, transport.clone()).await;
    let processor = RequestProcessor::new(session.clone());

    session.on_call(send(1)).await;
    let switch = RemoteCall::new("wallet_switchEthereumChain", vec![json!({ "chainId": "0x89" })]);
    session.on_call(switch.with_id(2)).await;

    // the switch is approved first and rebinds the session
    session.approve(2).unwrap();
    assert_eq!(processor.process_next().await.unwrap().success(), Some(&Value::Null));

    session.approve(1).unwrap();
    let reply = processor.process_next().await.unwrap();
    assert_eq!(reply.id, 1);
    assert_eq!(reply.as_error().unwrap().code, ErrorCode::ChainDisconnected);
    assert!(transport.calls().is_empty(), "{:?}", transport.calls());

    // a fresh call is stamped with the new network
    session.on_call(send(3)).await;
    session.approve(3).unwrap();
    assert_eq!(processor.process_next().await.unwrap().success(), Some(&json!("0xfeed")));
    assert!(transport.calls().iter().all(|call| call.url == url(crate::utils::POLYGON_RPC)));
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_transactions_finish_on_the_old_network() {
    crate::init_tracing();
    let transport = MockTransport::new();
    transport.script_evm().respond("eth_sendRawTransaction", json!("0xfeed"));
    let gate = transport.gate("eth_getTransactionCount");
    let (session, _rx) = evm_session(UiMode::NoUi, transport.clone()).await;

    session.on_call(send(1)).await;
    let processor = RequestProcessor::new(session.clone());
    let drain = tokio::spawn(async move { processor.drain().await });
    transport.entered().await;

    let router = session.router().clone();
    let rebind = tokio::spawn(async move { router.set_network(polygon()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!rebind.is_finished(), "rebind must wait for the call in flight");

    gate.notify_one();
    let replies = drain.await.unwrap();
    rebind.await.unwrap().unwrap();

    assert_eq!(replies[0].success(), Some(&json!("0xfeed")));
    let sent = transport.calls_to("eth_sendRawTransaction");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, url(MAINNET_RPC));
    assert_eq!(session.router().generation().await, 1);
    assert_eq!(session.router().network().await.chain_id.as_u64(), Some(137));
}
