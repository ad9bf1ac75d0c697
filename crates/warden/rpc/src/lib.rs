//! JSON-RPC wire types exchanged with the embedding page.

/// JSON-RPC request bindings
pub mod request;

/// JSON-RPC response bindings
pub mod response;

/// JSON-RPC error bindings
pub mod error;

pub use error::{ErrorCode, RpcError};
pub use request::{DEFAULT_REQUEST_ID, RemoteCall, RequestId};
pub use response::{CallResult, ResponseResult};
