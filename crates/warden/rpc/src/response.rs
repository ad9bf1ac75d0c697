use crate::{
    error::RpcError,
    request::{RequestId, Version},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The reply to a single [`RemoteCall`](crate::RemoteCall).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// Protocol version
    pub jsonrpc: Version,
    /// The id of the call this answers.
    pub id: RequestId,
    #[serde(flatten)]
    pub result: ResponseResult,
}

impl CallResult {
    /// Creates a new reply for the call with the given id.
    pub fn new(id: RequestId, result: impl Into<ResponseResult>) -> Self {
        Self { jsonrpc: Version::V2, id, result: result.into() }
    }

    /// Creates a new error reply.
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self::new(id, ResponseResult::Error(error))
    }

    /// Returns the success value, if any.
    pub fn success(&self) -> Option<&Value> {
        match &self.result {
            ResponseResult::Success(value) => Some(value),
            ResponseResult::Error(_) => None,
        }
    }

    /// Returns the error, if any.
    pub fn as_error(&self) -> Option<&RpcError> {
        match &self.result {
            ResponseResult::Success(_) => None,
            ResponseResult::Error(err) => Some(err),
        }
    }

    /// Whether this reply carries an error.
    pub fn is_error(&self) -> bool {
        self.as_error().is_some()
    }
}

/// Represents the result of a call either success or error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseResult {
    #[serde(rename = "result")]
    Success(Value),
    #[serde(rename = "error")]
    Error(RpcError),
}

impl ResponseResult {
    pub fn success<S>(content: S) -> Self
    where
        S: Serialize + 'static,
    {
        match serde_json::to_value(&content) {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Error(RpcError::internal_error_with(err.to_string())),
        }
    }

    pub fn error(error: RpcError) -> Self {
        Self::Error(error)
    }
}

impl From<RpcError> for ResponseResult {
    fn from(err: RpcError) -> Self {
        Self::error(err)
    }
}

impl From<Result<Value, RpcError>> for ResponseResult {
    fn from(res: Result<Value, RpcError>) -> Self {
        match res {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Error(err),
        }
    }
}
