//! Parsing of secret keys handed to the session.
//!
//! Parse errors never include the secret itself.

use alloy_primitives::{B256, hex};
use ed25519_dalek::{KEYPAIR_LENGTH, SECRET_KEY_LENGTH, SigningKey};
use warden_core::{Result, WalletError};

const FIELD: &str = "privateKey";

/// Parses a secp256k1 secret given as 32 bytes of hex, with or without `0x`.
pub fn parse_secp256k1(secret: &str) -> Result<B256> {
    let bytes = hex::decode(secret.trim())
        .map_err(|_| WalletError::validation(FIELD, "expected a hex encoded secret"))?;
    B256::try_from(bytes.as_slice())
        .map_err(|_| WalletError::validation(FIELD, "expected 32 bytes"))
}

/// Parses an ed25519 secret.
///
/// Accepted forms are a 32 byte hex seed, `ed25519:<base58>` and bare base58, where the base58
/// payload is either a 32 byte seed or a 64 byte keypair (seed followed by public key).
pub fn parse_ed25519(secret: &str) -> Result<SigningKey> {
    let secret = secret.trim();
    if let Some(encoded) = secret.strip_prefix("ed25519:") {
        return from_base58(encoded);
    }
    match hex::decode(secret) {
        Ok(bytes) if bytes.len() == SECRET_KEY_LENGTH => seed(&bytes),
        _ => from_base58(secret),
    }
}

fn from_base58(encoded: &str) -> Result<SigningKey> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| WalletError::validation(FIELD, "expected a base58 encoded key"))?;
    match bytes.len() {
        SECRET_KEY_LENGTH => seed(&bytes),
        KEYPAIR_LENGTH => {
            let mut keypair = [0u8; KEYPAIR_LENGTH];
            keypair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&keypair)
                .map_err(|_| WalletError::validation(FIELD, "public key does not match the seed"))
        }
        len => Err(WalletError::validation(FIELD, format!("unexpected key length {len}"))),
    }
}

fn seed(bytes: &[u8]) -> Result<SigningKey> {
    let mut seed = [0u8; SECRET_KEY_LENGTH];
    seed.copy_from_slice(bytes);
    Ok(SigningKey::from_bytes(&seed))
}
