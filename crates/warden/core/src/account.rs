use crate::error::{Result, WalletError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The chain flavour of an ed25519 account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ed25519Variant {
    Near,
    Solana,
    MultiversX,
    Sui,
}

/// The signature scheme an [`Account`] signs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    /// ECDSA over secp256k1
    Secp256k1,
    /// EdDSA over ed25519
    Ed25519(Ed25519Variant),
}

impl SignatureScheme {
    /// Whether addresses of this scheme are hex encoded and therefore compared
    /// case-insensitively.
    pub const fn hex_addresses(&self) -> bool {
        matches!(self, Self::Secp256k1 | Self::Ed25519(Ed25519Variant::Sui))
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secp256k1 => f.write_str("secp256k1"),
            Self::Ed25519(variant) => write!(f, "ed25519/{variant:?}"),
        }
    }
}

/// The identity bound to one private key.
///
/// Derived once from the key when a backend is created and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    address: String,
    public_key: String,
    scheme: SignatureScheme,
}

impl Account {
    pub fn new(
        address: impl Into<String>,
        public_key: impl Into<String>,
        scheme: SignatureScheme,
    ) -> Self {
        Self { address: address.into(), public_key: public_key.into(), scheme }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Returns `true` if `address` refers to this account.
    pub fn matches(&self, address: &str) -> bool {
        if self.scheme.hex_addresses() {
            self.address.eq_ignore_ascii_case(address)
        } else {
            self.address == address
        }
    }

    /// Fails with [`WalletError::UnknownAddress`] unless `address` refers to this account.
    pub fn ensure(&self, address: &str) -> Result<()> {
        if self.matches(address) {
            Ok(())
        } else {
            Err(WalletError::UnknownAddress(address.to_string()))
        }
    }
}
