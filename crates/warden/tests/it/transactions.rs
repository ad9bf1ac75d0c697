//! ed25519 families: transaction signatures verify against the managed key.

use crate::utils::{ED25519_SEED, MockTransport, url};
use alloy_primitives::hex;
use base64::{Engine, engine::general_purpose::STANDARD};
use blake2::{Blake2b, Digest, digest::consts::U32};
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use warden::{
    SigningBackend,
    core::{ChainConfig, ChainFamily, WalletError},
    signer,
};

fn verifying_key() -> VerifyingKey {
    let seed: [u8; 32] = hex::decode(ED25519_SEED).unwrap().try_into().unwrap();
    SigningKey::from_bytes(&seed).verifying_key()
}

fn backend(
    family: ChainFamily,
    network: ChainConfig,
    transport: &Arc<MockTransport>,
) -> Box<dyn SigningBackend> {
    signer::backend(family, ED25519_SEED, network, transport.clone()).unwrap()
}

/// A legacy message with `signers` as the required signers and one read-only program account.
fn solana_wire(signers: &[[u8; 32]]) -> Vec<u8> {
    let mut message = vec![signers.len() as u8, 0, 1];
    message.push(signers.len() as u8 + 1);
    for signer in signers {
        message.extend_from_slice(signer);
    }
    message.extend_from_slice(&[0u8; 32]);
    message.extend_from_slice(&[42u8; 32]);
    message.push(0);

    let mut wire = vec![signers.len() as u8];
    wire.extend(std::iter::repeat_n(0u8, 64 * signers.len()));
    wire.extend(message);
    wire
}

#[tokio::test]
async fn solana_fills_its_signature_slot() {
    let transport = MockTransport::new();
    let network = ChainConfig::new("devnet", "Devnet", url("https://api.devnet.solana.com"));
    let backend = backend(ChainFamily::Solana, network, &transport);
    let key = verifying_key();
    let fee_payer = [5u8; 32];

    let wire = solana_wire(&[fee_payer, key.to_bytes()]);
    let signed = backend.sign_transaction(&json!(bs58::encode(&wire).into_string())).await.unwrap();
    let signed = bs58::decode(signed.as_str().unwrap()).into_vec().unwrap();

    assert_eq!(signed.len(), wire.len());
    // the fee payer's slot is left alone
    assert_eq!(&signed[1..65], &[0u8; 64]);
    let signature = Signature::from_slice(&signed[65..129]).unwrap();
    key.verify(&signed[129..], &signature).unwrap();
}

#[tokio::test]
async fn solana_rejects_foreign_transactions() {
    let transport = MockTransport::new();
    let network = ChainConfig::new("devnet", "Devnet", url("https://api.devnet.solana.com"));
    let backend = backend(ChainFamily::Solana, network, &transport);

    let wire = solana_wire(&[[5u8; 32]]);
    let encoded = bs58::encode(&wire).into_string();
    let err = backend.sign_transaction(&json!(encoded)).await.unwrap_err();
    assert!(matches!(err, WalletError::Validation { .. }), "{err}");

    let err = backend.sign_transaction(&json!("not base58 0OIl")).await.unwrap_err();
    assert!(matches!(err, WalletError::Validation { .. }), "{err}");
}

#[tokio::test]
async fn solana_broadcasts_base64() {
    let transport = MockTransport::new();
    transport.respond("sendTransaction", json!("5sig"));
    let network = ChainConfig::new("devnet", "Devnet", url("https://api.devnet.solana.com"));
    let backend = backend(ChainFamily::Solana, network, &transport);

    let wire = solana_wire(&[verifying_key().to_bytes()]);
    let tx = json!({ "transaction": bs58::encode(&wire).into_string() });
    let signature = backend.send_transaction(&tx).await;
    assert_eq!(signature.unwrap(), "5sig");

    let sent = transport.calls_to("sendTransaction");
    assert_eq!(sent[0].params[1], json!({ "encoding": "base64" }));
    let bytes = STANDARD.decode(sent[0].params[0].as_str().unwrap()).unwrap();
    assert_eq!(bytes.len(), wire.len());
}

#[tokio::test]
async fn near_signs_the_transaction_hash() {
    let transport = MockTransport::new();
    transport.respond(
        "query",
        json!({
            "nonce": 41,
            "block_hash": bs58::encode([1u8; 32]).into_string(),
            "block_height": 10,
        }),
    );
    let network = ChainConfig::new("testnet", "NEAR Testnet", url("https://rpc.testnet.near.org"));
    let backend = backend(ChainFamily::Near, network, &transport);

    let tx = json!({
        "receiverId": "bob.testnet",
        "actions": [
            { "type": "Transfer", "params": { "deposit": "1000000000000000000000000" } },
            { "type": "FunctionCall", "params": { "methodName": "ping", "args": { "n": 1 } } }
        ]
    });
    let signed = backend.sign_transaction(&tx).await.unwrap();
    let bytes = STANDARD.decode(signed["signedTransaction"].as_str().unwrap()).unwrap();

    // borsh: transaction, then the signature enum tag and 64 bytes
    let (transaction, signature) = bytes.split_at(bytes.len() - 65);
    assert_eq!(signature[0], 0);
    let hash = Sha256::digest(transaction);
    assert_eq!(signed["hash"], json!(bs58::encode(hash).into_string()));
    verifying_key().verify(&hash, &Signature::from_slice(&signature[1..]).unwrap()).unwrap();

    // signer id (u32 length + 64 hex chars), public key (tag + 32 bytes), then the nonce
    let nonce = u64::from_le_bytes(transaction[101..109].try_into().unwrap());
    assert_eq!(nonce, 42);

    let query = &transport.calls_to("query")[0].params;
    assert_eq!(query["request_type"], "view_access_key");
    assert_eq!(query["public_key"], "ed25519:5CoLy9mVnXz68CSpSSigBVfCLepyX5xF89x4TAG5JRd1");
}

#[tokio::test]
async fn near_rejects_other_signers() {
    let transport = MockTransport::new();
    let network = ChainConfig::new("testnet", "NEAR Testnet", url("https://rpc.testnet.near.org"));
    let backend = backend(ChainFamily::Near, network, &transport);

    let tx = json!({ "signerId": "alice.testnet", "receiverId": "bob.testnet", "actions": [] });
    assert!(matches!(backend.sign_transaction(&tx).await, Err(WalletError::UnknownAddress(_))));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn multiversx_fetches_the_nonce_from_the_gateway() {
    let transport = MockTransport::new();
    let backend = backend(
        ChainFamily::MultiversX,
        ChainConfig::new("D", "Devnet", url("https://devnet-gateway.multiversx.com")),
        &transport,
    );
    let address = backend.account().address().to_string();
    transport.respond(
        &format!("GET /address/{address}/nonce"),
        json!({ "data": { "nonce": 12 }, "error": "", "code": "successful" }),
    );

    let receiver = "erd1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq6gq4hu";
    let signed = backend
        .sign_transaction(&json!({ "receiver": receiver, "value": "1000", "data": "hi" }))
        .await
        .unwrap();

    assert_eq!(signed["nonce"], 12);
    assert_eq!(signed["gasLimit"], 50_000 + 1_500 * 2);
    let payload = format!(
        r#"{{"nonce":12,"value":"1000","receiver":"{receiver}","sender":"{address}","gasPrice":1000000000,"gasLimit":53000,"data":"aGk=","chainID":"D","version":1}}"#
    );
    let signature = hex::decode(signed["signature"].as_str().unwrap()).unwrap();
    let signature = Signature::from_slice(&signature).unwrap();
    verifying_key().verify(payload.as_bytes(), &signature).unwrap();
}

#[tokio::test]
async fn multiversx_surfaces_gateway_errors() {
    let transport = MockTransport::new();
    transport.respond(
        "POST /transaction/send",
        json!({ "data": null, "error": "insufficient funds", "code": "bad_request" }),
    );
    let backend = backend(
        ChainFamily::MultiversX,
        ChainConfig::new("D", "Devnet", url("https://devnet-gateway.multiversx.com")),
        &transport,
    );

    let receiver = "erd1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq6gq4hu";
    let tx = json!({ "nonce": 1, "receiver": receiver });
    let err = backend.send_transaction(&tx).await.unwrap_err();
    assert!(
        matches!(&err, WalletError::Broadcast { cause } if cause.contains("insufficient funds")),
        "{err}"
    );

    let foreign = json!({ "nonce": 1, "receiver": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8" });
    let err = backend.sign_transaction(&foreign).await.unwrap_err();
    assert!(matches!(err, WalletError::Validation { .. }), "{err}");
}

#[tokio::test]
async fn sui_signs_with_the_transaction_intent() {
    let transport = MockTransport::new();
    transport.respond("sui_executeTransactionBlock", json!({ "digest": "Dig3st" }));
    let backend = backend(
        ChainFamily::Sui,
        ChainConfig::new("testnet", "Sui Testnet", url("https://fullnode.testnet.sui.io")),
        &transport,
    );
    let tx_bytes = [0u8, 1, 2, 3, 4, 5];
    let encoded = STANDARD.encode(tx_bytes);

    let signed = backend.sign_transaction(&json!(encoded)).await.unwrap();
    assert_eq!(signed["transactionBlockBytes"], json!(encoded));
    let serialized = STANDARD.decode(signed["signature"].as_str().unwrap()).unwrap();
    assert_eq!(serialized.len(), 1 + 64 + 32);
    assert_eq!(serialized[0], 0);
    assert_eq!(&serialized[65..], verifying_key().as_bytes());

    let mut intent_message = vec![0u8, 0, 0];
    intent_message.extend_from_slice(&tx_bytes);
    let digest = Blake2b::<U32>::digest(&intent_message);
    verifying_key().verify(&digest, &Signature::from_slice(&serialized[1..65]).unwrap()).unwrap();

    let digest = backend.send_transaction(&json!({ "transactionBlock": encoded })).await.unwrap();
    assert_eq!(digest, "Dig3st");
}

#[tokio::test]
async fn near_rejects_an_exhausted_access_key_nonce() {
    let transport = MockTransport::new();
    transport.respond(
        "query",
        json!({ "nonce": u64::MAX, "block_hash": bs58::encode([1u8; 32]).into_string() }),
    );
    let network = ChainConfig::new("testnet", "NEAR Testnet", url("https://rpc.testnet.near.org"));
    let backend = backend(ChainFamily::Near, network, &transport);

    let tx = json!({ "receiverId": "bob.testnet", "actions": [] });
    assert!(matches!(
        backend.sign_transaction(&tx).await,
        Err(WalletError::Validation { field, .. }) if field == "nonce"
    ));
}

#[tokio::test]
async fn solana_broadcast_failures_keep_the_node_message() {
    let transport = MockTransport::new();
    let network = ChainConfig::new("devnet", "Devnet", url("https://api.devnet.solana.com"));
    let backend = backend(ChainFamily::Solana, network, &transport);

    let wire = solana_wire(&[verifying_key().to_bytes()]);
    let encoded = bs58::encode(&wire).into_string();
    let err = backend.send_transaction(&json!(encoded)).await.unwrap_err();
    assert!(
        matches!(&err, WalletError::Broadcast { cause } if cause.contains("sendTransaction")),
        "{err}"
    );
}

#[tokio::test]
async fn sui_refuses_blocks_from_foreign_senders() {
    let transport = MockTransport::new();
    transport.respond("sui_executeTransactionBlock", json!({ "digest": "Dig3st" }));
    let backend = backend(
        ChainFamily::Sui,
        ChainConfig::new("testnet", "Sui Testnet", url("https://fullnode.testnet.sui.io")),
        &transport,
    );
    let encoded = STANDARD.encode([0u8, 1, 2, 3]);
    let owner = backend.account().address().to_string();
    let stranger = format!("0x{}", "ab".repeat(32));

    let tx = json!({ "transactionBlock": encoded, "sender": stranger });
    let err = backend.sign_transaction(&tx).await.unwrap_err();
    assert!(matches!(&err, WalletError::UnknownAddress(address) if *address == stranger), "{err}");

    let tx = json!({ "transactionBlock": encoded, "account": { "address": stranger } });
    let err = backend.send_transaction(&tx).await.unwrap_err();
    assert!(matches!(err, WalletError::UnknownAddress(_)), "{err}");
    assert!(transport.calls().is_empty());

    let tx = json!({ "transactionBlock": encoded, "sender": owner.to_uppercase() });
    assert!(backend.sign_transaction(&tx).await.is_ok());
}
