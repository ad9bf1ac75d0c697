//! Messages sent to the embedding page.

use serde::{Deserialize, Serialize};
use warden_rpc::CallResult;

/// A message on the outbound host channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Sent once per router lifetime, when the wallet is ready.
    Connect {
        #[serde(rename = "chainId")]
        chain_id: String,
    },
    /// The active network changed.
    ChainChanged {
        #[serde(rename = "chainId")]
        chain_id: String,
    },
    /// The active account changed.
    AccountsChanged { address: String },
    /// The reply to a remote call.
    Reply(CallResult),
}

impl HostMessage {
    /// Name of the event, as the host sees it.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::ChainChanged { .. } => "chainChanged",
            Self::AccountsChanged { .. } => "accountsChanged",
            Self::Reply(_) => "reply",
        }
    }

    /// Returns the reply, if this is one.
    pub fn as_reply(&self) -> Option<&CallResult> {
        match self {
            Self::Reply(reply) => Some(reply),
            _ => None,
        }
    }
}

impl From<CallResult> for HostMessage {
    fn from(reply: CallResult) -> Self {
        Self::Reply(reply)
    }
}
