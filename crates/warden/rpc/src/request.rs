use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

/// Identifier of a remote call, assigned by the caller.
pub type RequestId = u64;

/// The id given to calls that arrive without one.
///
/// Calls without an id are not deduplicated: two such calls in one session both carry this id.
pub const DEFAULT_REQUEST_ID: RequestId = 1;

/// Represents a JSON-RPC version
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    #[default]
    #[serde(rename = "2.0")]
    V2,
}

/// A remote procedure call issued by the embedding page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCall {
    /// Caller assigned id, echoed in the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// The method to invoke.
    pub method: String,
    /// Positional parameters, opaque to everything but the handler of `method`.
    #[serde(default, deserialize_with = "deserialize_params")]
    pub params: Vec<Value>,
}

impl RemoteCall {
    /// Creates a new call without an id.
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self { id: None, method: method.into(), params }
    }

    /// Sets the id of the call.
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns the id of the call, or [`DEFAULT_REQUEST_ID`] if the caller didn't assign one.
    pub fn id_or_default(&self) -> RequestId {
        self.id.unwrap_or(DEFAULT_REQUEST_ID)
    }

    /// Returns the call with its id filled in.
    pub fn with_default_id(mut self) -> Self {
        self.id = Some(self.id_or_default());
        self
    }

    /// Returns the positional parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }
}

/// Accepts `params` as an array, a single object (treated as a one element list) or nothing.
fn deserialize_params<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(params)) => Ok(params),
        Some(params @ Value::Object(_)) => Ok(vec![params]),
        Some(other) => Err(de::Error::custom(format!("expected params array, got {other}"))),
    }
}
