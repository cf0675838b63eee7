//! Error taxonomy shared by the signing core and the pipeline.

use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while turning a request into a signed envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// A field value does not fit its declared type.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A signature component does not fit in 256 bits, or a serialized signature is malformed.
    #[error("Invalid signature component: {0}")]
    InvalidSignatureComponent(String),

    /// The key-holder could not locate or use a key.
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    /// The approval gate declined the request.
    #[error("{0} was not approved")]
    NotApproved(String),

    /// The nonce source failed.
    #[error("Nonce unavailable: {0}")]
    NonceUnavailable(String),

    /// The identity resolver failed.
    #[error("Identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Publishing failed and the relayer may still have received the envelope.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The envelope never reached the relayer, or the relayer refused it.
    #[error("Envelope not delivered: {0}")]
    NotDelivered(String),

    /// Remote JSON-RPC query failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A suspension point exceeded its bound.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Request parameters are missing or malformed.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// No pipeline stage answered the method.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Unknown filter id.
    #[error("Filter not found: {0}")]
    FilterNotFound(String),
}

impl RelayError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> i64 {
        match self {
            RelayError::NotApproved(_) => 4001,
            RelayError::Encoding(_) | RelayError::InvalidParams(_) => -32602,
            RelayError::MethodNotFound(_) => -32601,
            RelayError::InvalidSignatureComponent(_) => -32603,
            RelayError::KeyUnavailable(_) => -32000,
            RelayError::NonceUnavailable(_) => -32001,
            RelayError::IdentityUnavailable(_) => -32002,
            RelayError::Timeout { .. } => -32003,
            RelayError::Publish(_) | RelayError::NotDelivered(_) => -32004,
            RelayError::Transport(_) => -32005,
            RelayError::FilterNotFound(_) => -32006,
        }
    }

    /// Short machine-readable name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Encoding(_) => "encoding",
            RelayError::InvalidSignatureComponent(_) => "invalid_signature_component",
            RelayError::KeyUnavailable(_) => "key_unavailable",
            RelayError::NotApproved(_) => "not_approved",
            RelayError::NonceUnavailable(_) => "nonce_unavailable",
            RelayError::IdentityUnavailable(_) => "identity_unavailable",
            RelayError::Publish(_) => "publish",
            RelayError::NotDelivered(_) => "not_delivered",
            RelayError::Transport(_) => "transport",
            RelayError::Timeout { .. } => "timeout",
            RelayError::InvalidParams(_) => "invalid_params",
            RelayError::MethodNotFound(_) => "method_not_found",
            RelayError::FilterNotFound(_) => "filter_not_found",
        }
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Pipeline stage identifiers, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Fixture,
    Cache,
    Filter,
    Nonce,
    Simulator,
    Wallet,
    Transport,
    /// The driver itself (e.g. nothing answered).
    Pipeline,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Fixture => "fixture",
            StageKind::Cache => "cache",
            StageKind::Filter => "filter",
            StageKind::Nonce => "nonce",
            StageKind::Simulator => "simulator",
            StageKind::Wallet => "wallet",
            StageKind::Transport => "transport",
            StageKind::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure surfaced by the pipeline, tagged with the stage that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: StageKind,
    #[source]
    pub source: RelayError,
}

impl StageError {
    pub fn new(stage: StageKind, source: RelayError) -> Self {
        Self { stage, source }
    }

    /// JSON-RPC error object for this failure.
    pub fn to_rpc_error(&self) -> Value {
        json!({
            "code": self.source.code(),
            "message": self.source.to_string(),
            "data": {
                "stage": self.stage.as_str(),
                "kind": self.source.kind(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Timeout { operation: "nonce source", after_ms: 250 };
        assert_eq!(err.to_string(), "nonce source timed out after 250 ms");

        let err = RelayError::NotApproved("eth_sendTransaction".into());
        assert_eq!(err.to_string(), "eth_sendTransaction was not approved");
    }

    #[test]
    fn test_stage_error_rpc_shape() {
        let err = StageError::new(StageKind::Wallet, RelayError::NotApproved("eth_sign".into()));
        let rpc = err.to_rpc_error();
        assert_eq!(rpc["code"], 4001);
        assert_eq!(rpc["data"]["stage"], "wallet");
        assert_eq!(rpc["data"]["kind"], "not_approved");
    }
}
