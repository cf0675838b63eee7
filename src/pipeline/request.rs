//! JSON-RPC request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{RelayError, RelayResult, StageError};

fn default_version() -> String {
    "2.0".to_string()
}

fn default_params() -> Value {
    Value::Array(Vec::new())
}

/// A single JSON-RPC call as received from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    #[serde(default)]
    pub id: Value,

    pub method: String,

    #[serde(default = "default_params")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Positional parameter `index`, if present and not null.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.as_array().and_then(|p| p.get(index)).filter(|v| !v.is_null())
    }

    /// Positional parameter `index`, or `InvalidParams`.
    pub fn required_param(&self, index: usize) -> RelayResult<&Value> {
        self.param(index).ok_or_else(|| {
            RelayError::InvalidParams(format!("{} expects a parameter at position {}", self.method, index))
        })
    }

    /// Positional parameter `index` as a string, or `InvalidParams`.
    pub fn str_param(&self, index: usize) -> RelayResult<&str> {
        self.required_param(index)?.as_str().ok_or_else(|| {
            RelayError::InvalidParams(format!("{} expects a string at position {}", self.method, index))
        })
    }

    /// Stable key for caching: method plus canonical params.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.method, self.params)
    }
}

/// A JSON-RPC response returned to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &StageError) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error.to_rpc_error()),
        }
    }

    /// Protocol-level failure that never reached the pipeline.
    pub fn protocol_error(id: Value, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(json!({ "code": code, "message": message })),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Hex quantity encoding (`0x` + minimal hex).
pub fn to_quantity(n: u64) -> String {
    format!("{:#x}", n)
}

/// Parse a hex quantity (or plain number) that must fit in 64 bits.
pub fn parse_quantity(value: &Value) -> RelayResult<u64> {
    let n = crate::signing::encoder::parse_uint256(value)?;
    u64::try_from(n).map_err(|_| RelayError::Encoding(format!("quantity {} exceeds 64 bits", value)))
}
