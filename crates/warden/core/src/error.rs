//! Error taxonomy shared by backends, the router and the request processor.

use serde::Serialize;
use std::fmt;
use warden_rpc::{ErrorCode, RequestId, ResponseResult, RpcError};

pub type Result<T, E = WalletError> = std::result::Result<T, E>;

/// Errors surfaced by any stage of a remote call.
///
/// Backend and router errors never escape the request processor: they are converted into the
/// `error` member of the reply via [`From<WalletError> for RpcError`](RpcError).
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The address is not the one managed by the backend.
    #[error("address {0} is not managed by this wallet")]
    UnknownAddress(String),
    /// The backend or router doesn't implement the operation.
    #[error("{0} is not supported")]
    UnsupportedOperation(String),
    /// No pending request with this id.
    #[error("no pending request with id {0}")]
    UnknownRequest(RequestId),
    /// Broadcasting a signed transaction failed.
    #[error("failed to broadcast transaction: {cause}")]
    Broadcast { cause: String },
    /// The user denied the request.
    #[error("user denied the request")]
    UserDenied,
    /// A parameter failed validation.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    /// The network could not be reached, or changed while the call was queued.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    /// An error returned verbatim by the node.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl WalletError {
    /// Creates a new [`WalletError::Validation`].
    pub fn validation(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Validation { field: field.into(), reason: reason.to_string() }
    }

    /// Creates a new [`WalletError::UnsupportedOperation`].
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation(operation.into())
    }

    /// Creates a new [`WalletError::Broadcast`].
    pub fn broadcast(cause: impl fmt::Display) -> Self {
        Self::Broadcast { cause: cause.to_string() }
    }

    /// Creates a new [`WalletError::NetworkUnreachable`].
    pub fn unreachable(reason: impl fmt::Display) -> Self {
        Self::NetworkUnreachable(reason.to_string())
    }

    /// Reclassifies an error raised while submitting a signed transaction as
    /// [`WalletError::Broadcast`], keeping the node's message as the cause.
    pub fn into_broadcast(self) -> Self {
        match self {
            Self::Broadcast { .. } => self,
            Self::Rpc(err) => Self::broadcast(err.message),
            Self::NetworkUnreachable(reason) => Self::broadcast(reason),
            err => Self::broadcast(err),
        }
    }

    /// Classifies the error into the category shown to the user.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UserDenied => FailureKind::UserDenied,
            Self::UnknownAddress(_) => FailureKind::Unauthorized,
            Self::UnsupportedOperation(_) => FailureKind::Unsupported,
            Self::NetworkUnreachable(_) => FailureKind::Network,
            Self::Validation { .. } | Self::UnknownRequest(_) => FailureKind::Validation,
            Self::Broadcast { cause } if is_insufficient_funds(cause) => {
                FailureKind::InsufficientFunds
            }
            Self::Rpc(err) if is_insufficient_funds(&err.message) => FailureKind::InsufficientFunds,
            Self::Rpc(_) => FailureKind::Rpc,
            Self::Broadcast { .. } => FailureKind::Generic,
        }
    }
}

/// User facing failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UserDenied,
    InsufficientFunds,
    Validation,
    Rpc,
    Unauthorized,
    Unsupported,
    Network,
    Generic,
}

fn is_insufficient_funds(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("insufficient funds") || message.contains("insufficient balance")
}

impl From<WalletError> for RpcError {
    fn from(err: WalletError) -> Self {
        match err.kind() {
            FailureKind::UserDenied => Self::user_denied(),
            FailureKind::InsufficientFunds => {
                Self::with_message(ErrorCode::InvalidInput, "insufficient funds")
            }
            FailureKind::Unauthorized => {
                Self::with_message(ErrorCode::Unauthorized, err.to_string())
            }
            FailureKind::Unsupported => {
                Self::with_message(ErrorCode::UnsupportedMethod, err.to_string())
            }
            FailureKind::Network => {
                Self::with_message(ErrorCode::ChainDisconnected, err.to_string())
            }
            FailureKind::Validation => Self::invalid_params(err.to_string()),
            FailureKind::Rpc => match err {
                WalletError::Rpc(err) => err,
                other => Self::internal_error_with(other.to_string()),
            },
            FailureKind::Generic => {
                Self::transaction_rejected("transaction could not be broadcast")
            }
        }
    }
}

/// Helper trait to easily convert results to rpc results
pub trait ToRpcResponseResult {
    fn to_rpc_result(self) -> ResponseResult;
}

impl<T: Serialize> ToRpcResponseResult for Result<T> {
    fn to_rpc_result(self) -> ResponseResult {
        match self {
            Ok(val) => match serde_json::to_value(val) {
                Ok(value) => ResponseResult::Success(value),
                Err(err) => ResponseResult::Error(RpcError::internal_error_with(err.to_string())),
            },
            Err(err) => ResponseResult::Error(err.into()),
        }
    }
}
