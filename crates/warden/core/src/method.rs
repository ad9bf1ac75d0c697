//! The wallet methods the router intercepts before they reach the network.

use crate::chain::ChainFamily;

/// A method handled by the wallet itself rather than relayed to a node.
///
/// Method names not listed here are chain queries and go to the network relay.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::AsRefStr,
    strum::IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
pub enum WalletMethod {
    #[strum(serialize = "eth_accounts")]
    EthAccounts,
    #[strum(serialize = "eth_requestAccounts")]
    EthRequestAccounts,
    #[strum(serialize = "eth_sign")]
    EthSign,
    #[strum(serialize = "personal_sign")]
    PersonalSign,
    #[strum(serialize = "eth_signTypedData_v4")]
    EthSignTypedDataV4,
    #[strum(serialize = "eth_sendTransaction")]
    EthSendTransaction,
    #[strum(serialize = "eth_signTransaction")]
    EthSignTransaction,
    #[strum(serialize = "eth_decrypt")]
    EthDecrypt,
    #[strum(serialize = "eth_getEncryptionPublicKey")]
    EthGetEncryptionPublicKey,
    #[strum(serialize = "wallet_addEthereumChain")]
    WalletAddEthereumChain,
    #[strum(serialize = "wallet_switchEthereumChain")]
    WalletSwitchEthereumChain,
    #[strum(serialize = "wallet_watchAsset")]
    WalletWatchAsset,
    #[strum(serialize = "_arcana_switchAccountType")]
    SwitchAccountType,
    #[strum(serialize = "getAccounts")]
    GetAccounts,
    #[strum(serialize = "getPublicKey")]
    GetPublicKey,
    #[strum(serialize = "getBalance")]
    GetBalance,
    #[strum(serialize = "signMessage")]
    SignMessage,
    #[strum(serialize = "signTransaction")]
    SignTransaction,
    #[strum(serialize = "signAllTransactions")]
    SignAllTransactions,
    #[strum(serialize = "signAndSendTransaction")]
    SignAndSendTransaction,
    #[strum(serialize = "near_signMessage")]
    NearSignMessage,
    #[strum(serialize = "near_signAndSendTransaction")]
    NearSignAndSendTransaction,
}

impl WalletMethod {
    /// Parses a method name, returning `None` for methods the wallet doesn't intercept.
    pub fn parse(method: &str) -> Option<Self> {
        method.parse().ok()
    }

    /// Whether the method may use key material or change wallet state.
    ///
    /// This is the static permission table; see [`PermissionPolicy`](crate::PermissionPolicy) for
    /// how the UI mode affects it.
    pub const fn requires_permission(self) -> bool {
        match self {
            Self::EthSign |
            Self::PersonalSign |
            Self::EthSignTypedDataV4 |
            Self::EthSendTransaction |
            Self::EthSignTransaction |
            Self::EthDecrypt |
            Self::WalletAddEthereumChain |
            Self::WalletSwitchEthereumChain |
            Self::WalletWatchAsset |
            Self::SwitchAccountType |
            Self::SignMessage |
            Self::SignTransaction |
            Self::SignAllTransactions |
            Self::SignAndSendTransaction |
            Self::NearSignMessage |
            Self::NearSignAndSendTransaction => true,
            Self::EthAccounts |
            Self::EthRequestAccounts |
            Self::EthGetEncryptionPublicKey |
            Self::GetAccounts |
            Self::GetPublicKey |
            Self::GetBalance => false,
        }
    }

    /// Methods handled by the request processor itself instead of a backend.
    pub const fn is_administrative(self) -> bool {
        matches!(
            self,
            Self::WalletAddEthereumChain |
                Self::WalletSwitchEthereumChain |
                Self::WalletWatchAsset |
                Self::SwitchAccountType
        )
    }

    /// Methods whose result depends on the network the call was approved for.
    ///
    /// These are rejected if the network changes between enqueue and dispatch.
    pub const fn is_network_bound(self) -> bool {
        matches!(
            self,
            Self::EthSendTransaction |
                Self::EthSignTransaction |
                Self::SignTransaction |
                Self::SignAllTransactions |
                Self::SignAndSendTransaction |
                Self::NearSignAndSendTransaction
        )
    }

    /// Methods that put a transaction on chain and leave an activity record behind.
    pub const fn broadcasts(self) -> bool {
        matches!(
            self,
            Self::EthSendTransaction |
                Self::SignAndSendTransaction |
                Self::NearSignAndSendTransaction
        )
    }

    /// Whether a session of the given family handles the method.
    pub const fn supported_by(self, family: ChainFamily) -> bool {
        match family {
            ChainFamily::Evm => matches!(
                self,
                Self::EthAccounts |
                    Self::EthRequestAccounts |
                    Self::EthSign |
                    Self::PersonalSign |
                    Self::EthSignTypedDataV4 |
                    Self::EthSendTransaction |
                    Self::EthSignTransaction |
                    Self::EthDecrypt |
                    Self::EthGetEncryptionPublicKey |
                    Self::WalletAddEthereumChain |
                    Self::WalletSwitchEthereumChain |
                    Self::WalletWatchAsset |
                    Self::SwitchAccountType
            ),
            ChainFamily::Solana | ChainFamily::MultiversX | ChainFamily::Sui => matches!(
                self,
                Self::GetAccounts |
                    Self::GetPublicKey |
                    Self::GetBalance |
                    Self::SignMessage |
                    Self::SignTransaction |
                    Self::SignAllTransactions |
                    Self::SignAndSendTransaction |
                    Self::WalletSwitchEthereumChain
            ),
            ChainFamily::Near => matches!(
                self,
                Self::GetAccounts |
                    Self::GetPublicKey |
                    Self::GetBalance |
                    Self::NearSignMessage |
                    Self::NearSignAndSendTransaction |
                    Self::WalletSwitchEthereumChain
            ),
        }
    }
}
