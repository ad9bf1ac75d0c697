use super::Middleware;
use crate::signer::SigningBackend;
use alloy_primitives::hex;
use async_trait::async_trait;
use serde_json::{Value, json};
use warden_core::{ChainFamily, Result, WalletError, WalletMethod};
use warden_rpc::RemoteCall;

/// Answers every [`WalletMethod`] from the backend.
///
/// This is where positional params are decoded into backend arguments. Wallet methods the
/// family doesn't support fail here instead of leaking to the network.
#[derive(Debug)]
pub struct WalletMiddleware {
    family: ChainFamily,
}

impl WalletMiddleware {
    pub fn new(family: ChainFamily) -> Self {
        Self { family }
    }
}

#[async_trait]
impl Middleware for WalletMiddleware {
    fn name(&self) -> &'static str {
        "wallet"
    }

    fn handles(&self, method: &str) -> bool {
        WalletMethod::parse(method).is_some()
    }

    async fn handle(&self, call: &RemoteCall, backend: &dyn SigningBackend) -> Result<Value> {
        let Some(method) = WalletMethod::parse(&call.method) else {
            return Err(WalletError::unsupported(call.method.clone()));
        };
        if !method.supported_by(self.family) {
            return Err(WalletError::unsupported(format!("{method} on {}", self.family)));
        }

        let own = backend.account().address().to_string();
        match method {
            WalletMethod::EthAccounts |
            WalletMethod::EthRequestAccounts |
            WalletMethod::GetAccounts => Ok(json!(backend.accounts())),
            WalletMethod::GetPublicKey => {
                let address = optional_address(call, 0)?.unwrap_or(own);
                backend.public_key(&address).map(Value::String)
            }
            WalletMethod::GetBalance => {
                let address = optional_address(call, 0)?.unwrap_or(own);
                backend.balance(&address).await.map(Value::String)
            }
            WalletMethod::EthSign => {
                let address = str_param(call, 0)?;
                let data = hex::decode(str_param(call, 1)?)
                    .map_err(|err| WalletError::validation("message", err))?;
                backend.sign(address, &data).map(Value::String)
            }
            WalletMethod::PersonalSign => {
                let message = message_bytes(param(call, 0)?)?;
                let address = str_param(call, 1)?;
                backend.sign_personal(address, &message).map(Value::String)
            }
            WalletMethod::EthSignTypedDataV4 => {
                let address = str_param(call, 0)?;
                backend.sign_typed_data(address, param(call, 1)?).map(Value::String)
            }
            WalletMethod::EthDecrypt => {
                let ciphertext = str_param(call, 0)?;
                let address = str_param(call, 1)?;
                backend.decrypt(ciphertext, address).map(Value::String)
            }
            WalletMethod::EthGetEncryptionPublicKey => {
                backend.encryption_public_key(str_param(call, 0)?).map(Value::String)
            }
            WalletMethod::SignMessage | WalletMethod::NearSignMessage => {
                let message = message_bytes(param(call, 0)?)?;
                backend.sign_personal(&own, &message).map(|signature| {
                    json!({ "signature": signature, "publicKey": backend.account().public_key() })
                })
            }
            WalletMethod::EthSignTransaction | WalletMethod::SignTransaction => {
                backend.sign_transaction(param(call, 0)?).await
            }
            WalletMethod::SignAllTransactions => {
                let txs = match call.params.as_slice() {
                    [Value::Array(txs)] => txs.as_slice(),
                    txs => txs,
                };
                let mut signed = Vec::with_capacity(txs.len());
                for tx in txs {
                    signed.push(backend.sign_transaction(tx).await?);
                }
                Ok(Value::Array(signed))
            }
            WalletMethod::EthSendTransaction |
            WalletMethod::SignAndSendTransaction |
            WalletMethod::NearSignAndSendTransaction => {
                backend.send_transaction(param(call, 0)?).await.map(Value::String)
            }
            WalletMethod::WalletAddEthereumChain |
            WalletMethod::WalletSwitchEthereumChain |
            WalletMethod::WalletWatchAsset |
            WalletMethod::SwitchAccountType => {
                Err(WalletError::unsupported(format!("{method} outside the request processor")))
            }
        }
    }
}

fn param(call: &RemoteCall, index: usize) -> Result<&Value> {
    call.param(index)
        .ok_or_else(|| WalletError::validation("params", format!("missing parameter {index}")))
}

fn str_param(call: &RemoteCall, index: usize) -> Result<&str> {
    param(call, index)?.as_str().ok_or_else(|| {
        WalletError::validation("params", format!("parameter {index} must be a string"))
    })
}

/// An address given as a string or as `{ "address": .. }`, if any.
fn optional_address(call: &RemoteCall, index: usize) -> Result<Option<String>> {
    match call.param(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(address)) => Ok(Some(address.clone())),
        Some(value) => value
            .get("address")
            .and_then(Value::as_str)
            .map(|address| Some(address.to_string()))
            .ok_or_else(|| WalletError::validation("address", "expected an address")),
    }
}

/// Decodes a message to sign.
///
/// Strings are `0x` hex if they decode as such and UTF-8 text otherwise, arrays are raw bytes,
/// and objects carry the message in their `message` member.
pub(crate) fn message_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(message) => match message.strip_prefix("0x").map(hex::decode) {
            Some(Ok(bytes)) => Ok(bytes),
            _ => Ok(message.as_bytes().to_vec()),
        },
        Value::Array(bytes) => bytes
            .iter()
            .map(|byte| byte.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| WalletError::validation("message", "expected an array of bytes")),
        Value::Object(object) => match object.get("message") {
            Some(message) => message_bytes(message),
            None => Err(WalletError::validation("message", "missing message")),
        },
        _ => Err(WalletError::validation("message", "expected a string or bytes")),
    }
}
