//! EVM backend behaviour against a scripted node.

use crate::utils::{EVM_ADDRESS, EVM_KEY, MAINNET_RPC, MockTransport, mainnet, polygon, url};
use alloy_consensus::{Transaction, TxEnvelope, transaction::SignerRecoverable};
use alloy_dyn_abi::TypedData;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address, Signature, U256, hex};
use base64::{Engine, engine::general_purpose::STANDARD};
use crypto_box::{PublicKey, SalsaBox, SecretKey, aead::Aead};
use serde_json::{Value, json};
use std::sync::Arc;
use warden::{
    SigningBackend,
    core::{ChainFamily, WalletError},
    rpc::{ErrorCode, RpcError},
    signer::{self, EvmBackend, key},
};

fn backend(transport: &Arc<MockTransport>) -> Box<dyn SigningBackend> {
    signer::backend(ChainFamily::Evm, EVM_KEY, mainnet(), transport.clone()).unwrap()
}

fn address() -> Address {
    EVM_ADDRESS.parse().unwrap()
}

fn decode_raw(raw: &Value) -> TxEnvelope {
    let raw = hex::decode(raw.as_str().unwrap()).unwrap();
    TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap()
}

#[test]
fn typed_data_recovers_signer() {
    let payload = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "Person": [
                { "name": "name", "type": "string" },
                { "name": "wallet", "type": "address" }
            ],
            "Mail": [
                { "name": "from", "type": "Person" },
                { "name": "to", "type": "Person" },
                { "name": "contents", "type": "string" }
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
            "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
            "contents": "Hello, Bob!"
        }
    });
    let backend = backend(&MockTransport::new());

    let signature = backend.sign_typed_data(EVM_ADDRESS, &payload).unwrap();
    let typed: TypedData = serde_json::from_value(payload.clone()).unwrap();
    let hash = typed.eip712_signing_hash().unwrap();
    let parsed: Signature = signature.parse().unwrap();
    let recovered = parsed.recover_address_from_prehash(&hash).unwrap();
    assert_eq!(recovered, address());

    // some dApps send the payload as a JSON string
    let as_string =
        backend.sign_typed_data(EVM_ADDRESS, &Value::String(payload.to_string())).unwrap();
    assert_eq!(as_string, signature);
}

#[test]
fn decrypts_sealed_box() {
    let backend = backend(&MockTransport::new());
    let public_key = STANDARD.decode(backend.encryption_public_key(EVM_ADDRESS).unwrap()).unwrap();
    let public_key = PublicKey::from(<[u8; 32]>::try_from(public_key).unwrap());

    let ephemeral = SecretKey::from([7u8; 32]);
    let nonce = [9u8; 24];
    let ciphertext = SalsaBox::new(&public_key, &ephemeral)
        .encrypt(&nonce.into(), b"the eagle has landed".as_slice())
        .unwrap();
    let envelope = |version: &str, nonce: [u8; 24]| {
        let envelope = json!({
            "version": version,
            "nonce": STANDARD.encode(nonce),
            "ephemPublicKey": STANDARD.encode(ephemeral.public_key().as_bytes()),
            "ciphertext": STANDARD.encode(&ciphertext),
        });
        hex::encode_prefixed(envelope.to_string())
    };

    let sealed = envelope("x25519-xsalsa20-poly1305", nonce);
    assert_eq!(backend.decrypt(&sealed, EVM_ADDRESS).unwrap(), "the eagle has landed");

    let unknown_version = envelope("x25519-aes", nonce);
    assert!(matches!(
        backend.decrypt(&unknown_version, EVM_ADDRESS),
        Err(WalletError::UnsupportedOperation(_))
    ));
    let wrong_nonce = envelope("x25519-xsalsa20-poly1305", [1u8; 24]);
    let err = backend.decrypt(&wrong_nonce, EVM_ADDRESS).unwrap_err();
    assert!(matches!(err, WalletError::Validation { .. }), "{err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn fills_and_signs_london_transactions() {
    let transport = MockTransport::new();
    transport.script_evm();
    let backend = backend(&transport);

    let tx = json!({
        "from": EVM_ADDRESS,
        "to": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "value": "0x3e8",
    });
    let raw = backend.sign_transaction(&tx).await.unwrap();
    let envelope = decode_raw(&raw);

    assert!(envelope.as_eip1559().is_some());
    assert_eq!(envelope.recover_signer().unwrap(), address());
    assert_eq!(envelope.chain_id(), Some(1));
    assert_eq!(envelope.nonce(), 7);
    assert_eq!(envelope.gas_limit(), 21000);
    assert_eq!(envelope.max_priority_fee_per_gas(), Some(1_500_000_000));
    assert_eq!(envelope.max_fee_per_gas(), 3_500_000_000);
    assert_eq!(envelope.value(), U256::from(1000u64));
    assert!(transport.calls_to("eth_gasPrice").is_empty());
    assert!(transport.calls_to("eth_sendRawTransaction").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn falls_back_to_legacy_gas_price() {
    let transport = MockTransport::new();
    transport
        .script_evm()
        .respond("eth_getBlockByNumber", json!({ "number": "0x10" }))
        .respond("eth_gasPrice", json!("0x4a817c800"));
    let backend = backend(&transport);

    let raw = backend
        .sign_transaction(&json!({
            "to": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
            "gas": "0x5208",
        }))
        .await
        .unwrap();
    let envelope = decode_raw(&raw);
    assert!(envelope.as_legacy().is_some());
    assert_eq!(envelope.gas_price(), Some(20_000_000_000));
    assert!(transport.calls_to("eth_estimateGas").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcasts_to_the_primary_endpoint() {
    let transport = MockTransport::new();
    transport.script_evm().respond("eth_sendRawTransaction", json!("0xfeed"));
    let backend = backend(&transport);

    let tx = json!({ "to": EVM_ADDRESS, "value": "0x1" });
    let hash = backend.send_transaction(&tx).await.unwrap();
    assert_eq!(hash, "0xfeed");

    let sent = transport.calls_to("eth_sendRawTransaction");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, url(MAINNET_RPC));
    assert_eq!(decode_raw(&sent[0].params[0]).recover_signer().unwrap(), address());
}

#[tokio::test(flavor = "multi_thread")]
async fn classifies_transaction_failures() {
    let transport = MockTransport::new();
    transport.script_evm().fail(
        "eth_sendRawTransaction",
        RpcError::with_message(
            ErrorCode::ServerError(-32010),
            "insufficient funds for gas * price + value",
        ),
    );
    let backend = backend(&transport);

    let err = backend.send_transaction(&json!({ "to": EVM_ADDRESS })).await.unwrap_err();
    assert!(matches!(&err, WalletError::Broadcast { .. }), "{err}");
    assert_eq!(RpcError::from(err).message, "insufficient funds");

    let stranger = json!({
        "from": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "to": EVM_ADDRESS,
    });
    let err = backend.sign_transaction(&stranger).await.unwrap_err();
    assert!(matches!(err, WalletError::UnknownAddress(_)), "{err}");

    let wrong_chain = json!({ "to": EVM_ADDRESS, "chainId": "0x89" });
    assert!(matches!(
        backend.sign_transaction(&wrong_chain).await,
        Err(WalletError::Validation { field, .. }) if field == "chainId"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn rebinding_changes_the_signed_chain() {
    let transport = MockTransport::new();
    transport.script_evm();
    let key = key::parse_secp256k1(EVM_KEY).unwrap();
    let mut backend = EvmBackend::new(key, mainnet(), transport.clone()).unwrap();
    backend.set_network(polygon()).unwrap();

    let raw = backend.sign_transaction(&json!({ "to": EVM_ADDRESS })).await.unwrap();
    assert_eq!(decode_raw(&raw).chain_id(), Some(137));
    assert!(transport.calls().iter().all(|call| call.url == url(crate::utils::POLYGON_RPC)));

    let solana_style =
        warden::core::ChainConfig::new("devnet", "Devnet", url("https://devnet.example.com"));
    assert!(backend.set_network(solana_style).is_err());
    assert_eq!(backend.chain_id().as_u64(), Some(137));
}

#[tokio::test(flavor = "multi_thread")]
async fn reads_balances_and_estimates() {
    let transport = MockTransport::new();
    transport.script_evm().respond("eth_getBalance", json!("0xde0b6b3a7640000"));
    let key = key::parse_secp256k1(EVM_KEY).unwrap();
    let evm = EvmBackend::new(key, mainnet(), transport.clone()).unwrap();

    assert_eq!(evm.balance(EVM_ADDRESS).await.unwrap(), "1000000000000000000");
    assert_eq!(evm.estimate_gas(&json!({ "to": EVM_ADDRESS, "gas": "0x1" })).await.unwrap(), 21000);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_node_at_broadcast_is_a_broadcast_failure() {
    let transport = MockTransport::new();
    transport.script_evm();
    let backend = backend(&transport);

    let err = backend.send_transaction(&json!({ "to": EVM_ADDRESS })).await.unwrap_err();
    let WalletError::Broadcast { cause } = &err else {
        panic!("expected a broadcast error: {err}");
    };
    assert!(cause.contains("eth_sendRawTransaction"), "{cause}");
    assert_eq!(RpcError::from(err).code, ErrorCode::TransactionRejected);
    assert_eq!(transport.calls_to("eth_sendRawTransaction").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn keeps_the_requested_priority_fee() {
    let transport = MockTransport::new();
    transport.script_evm();
    let backend = backend(&transport);

    let tx = json!({ "to": EVM_ADDRESS, "maxPriorityFeePerGas": "0x1" });
    let envelope = decode_raw(&backend.sign_transaction(&tx).await.unwrap());
    assert_eq!(envelope.max_priority_fee_per_gas(), Some(1));
    assert_eq!(envelope.max_fee_per_gas(), 2_000_000_001);
    assert!(transport.calls_to("eth_maxPriorityFeePerGas").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn priority_fee_needs_a_london_network() {
    let transport = MockTransport::new();
    transport.script_evm().respond("eth_getBlockByNumber", json!({ "number": "0x10" }));
    let backend = backend(&transport);

    let tx = json!({ "to": EVM_ADDRESS, "maxPriorityFeePerGas": "0x1" });
    assert!(matches!(
        backend.sign_transaction(&tx).await,
        Err(WalletError::Validation { field, .. }) if field == "maxPriorityFeePerGas"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_out_of_range_base_fees() {
    let transport = MockTransport::new();
    transport.script_evm().respond(
        "eth_getBlockByNumber",
        json!({ "number": "0x10", "baseFeePerGas": format!("{:#x}", u128::MAX) }),
    );
    let backend = backend(&transport);

    let err = backend.sign_transaction(&json!({ "to": EVM_ADDRESS })).await.unwrap_err();
    assert!(
        matches!(&err, WalletError::Validation { field, .. } if field == "baseFeePerGas"),
        "{err}"
    );
}
