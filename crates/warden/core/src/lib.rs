//! Core types of the warden signing agent.
//!
//! Everything in here is free of I/O: accounts and chain descriptions, the method table and the
//! permission policy derived from it, the activity log, host events and the error taxonomy shared
//! by every backend.

pub mod account;
pub mod activity;
pub mod chain;
pub mod error;
pub mod events;
pub mod method;
pub mod permission;
pub mod serde_helpers;

pub use account::{Account, Ed25519Variant, SignatureScheme};
pub use activity::{ActivityKind, ActivityLog, ActivityRecord, TxStatus};
pub use chain::{ChainConfig, ChainFamily, ChainId, NativeCurrency, NetworkRegistry, Upsert};
pub use error::{FailureKind, Result, ToRpcResponseResult, WalletError};
pub use events::HostMessage;
pub use method::WalletMethod;
pub use permission::{PermissionPolicy, UiMode};
