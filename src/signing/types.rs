//! Request and envelope types, including the staged transaction builder.
//!
//! A transaction moves through `UnsequencedTx -> SequencedTx -> HashedTx ->
//! SignedTx -> MetaTransaction`. Each step consumes the previous value, so a
//! nonce is attached exactly once and an envelope can only be sealed after a
//! signature exists.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, RelayResult};
use crate::signing::encoder::{self, CanonicalField};

/// Action tag carried in the hash and the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Action {
    #[default]
    #[serde(rename = "sendTransaction")]
    SendTransaction,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SendTransaction => "sendTransaction",
        }
    }
}

/// Parameters of an outgoing transaction as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionParams {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub data: Bytes,
    pub action: Action,
}

impl TransactionParams {
    /// Parse the object form used by `eth_sendTransaction`.
    ///
    /// Accepts `gas` as an alias of `gasLimit` and `input` as an alias of `data`.
    /// Missing `value`, `gasPrice`, `gasLimit` and `data` default to zero/empty.
    pub fn from_json(value: &Value) -> RelayResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| RelayError::InvalidParams("transaction must be an object".to_string()))?;

        let field = |names: &[&str]| names.iter().find_map(|n| obj.get(*n)).filter(|v| !v.is_null());
        let uint = |names: &[&str]| match field(names) {
            Some(v) => encoder::parse_uint256(v),
            None => Ok(U256::ZERO),
        };

        let from = field(&["from"])
            .ok_or_else(|| RelayError::InvalidParams("transaction is missing `from`".to_string()))?;
        let to = field(&["to"]).ok_or_else(|| {
            RelayError::Encoding("transaction is missing `to`; contract creation is not relayed".to_string())
        })?;

        if let Some(action) = field(&["action"]) {
            if action.as_str() != Some(Action::SendTransaction.as_str()) {
                return Err(RelayError::Encoding(format!("unsupported action {}", action)));
            }
        }
        if obj.contains_key("nonce") {
            tracing::debug!("Ignoring caller-supplied nonce; the relay assigns it");
        }

        Ok(Self {
            from: encoder::parse_address(from)?,
            to: encoder::parse_address(to)?,
            value: uint(&["value"])?,
            gas_price: uint(&["gasPrice"])?,
            gas_limit: uint(&["gasLimit", "gas"])?,
            data: match field(&["data", "input"]) {
                Some(v) => encoder::parse_bytes(v)?,
                None => Bytes::new(),
            },
            action: Action::SendTransaction,
        })
    }
}

/// A transaction that has not been assigned a nonce yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsequencedTx {
    params: TransactionParams,
}

impl UnsequencedTx {
    pub fn new(params: TransactionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TransactionParams {
        &self.params
    }

    pub fn sequence(self, nonce: u64) -> SequencedTx {
        SequencedTx { params: self.params, nonce }
    }
}

/// A transaction with its nonce attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedTx {
    params: TransactionParams,
    nonce: u64,
}

impl SequencedTx {
    pub fn params(&self) -> &TransactionParams {
        &self.params
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Fields in canonical order: nonce, gasPrice, gasLimit, to, value, data, action.
    pub fn canonical_fields(&self) -> Vec<CanonicalField> {
        vec![
            CanonicalField::Uint256(U256::from(self.nonce)),
            CanonicalField::Uint256(self.params.gas_price),
            CanonicalField::Uint256(self.params.gas_limit),
            CanonicalField::Address(self.params.to),
            CanonicalField::Uint256(self.params.value),
            CanonicalField::Bytes(self.params.data.clone()),
            CanonicalField::String(self.params.action.as_str().to_string()),
        ]
    }

    pub fn hash(self) -> HashedTx {
        let digest = encoder::digest(&self.canonical_fields());
        HashedTx { params: self.params, nonce: self.nonce, digest }
    }
}

/// A sequenced transaction together with its canonical digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedTx {
    params: TransactionParams,
    nonce: u64,
    digest: B256,
}

impl HashedTx {
    pub fn params(&self) -> &TransactionParams {
        &self.params
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn digest(&self) -> B256 {
        self.digest
    }

    pub fn sign(self, signature: String) -> SignedTx {
        SignedTx {
            params: self.params,
            nonce: self.nonce,
            digest: self.digest,
            signature,
        }
    }
}

/// A hashed transaction with its serialized signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    params: TransactionParams,
    nonce: u64,
    digest: B256,
    signature: String,
}

impl SignedTx {
    pub fn from(&self) -> Address {
        self.params.from
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn digest(&self) -> B256 {
        self.digest
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Attach the resolved display identity and produce the final envelope.
    pub fn seal(self, username: String) -> MetaTransaction {
        MetaTransaction {
            action: self.params.action,
            signature: self.signature,
            params: MetaTransactionParams {
                gas_price: self.params.gas_price,
                gas_limit: self.params.gas_limit,
                nonce: self.nonce,
                to: self.params.to,
                value: self.params.value,
                data: self.params.data,
                action: self.params.action,
            },
            username,
        }
    }
}

/// Transaction fields carried inside the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTransactionParams {
    pub gas_price: U256,
    pub gas_limit: U256,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub action: Action,
}

/// Signed, self-describing envelope handed to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
    action: Action,
    signature: String,
    params: MetaTransactionParams,
    username: String,
}

impl MetaTransaction {
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn params(&self) -> &MetaTransactionParams {
        &self.params
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// A raw or personal message signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageParams {
    pub from: Address,
    pub data: Bytes,
}

/// An EIP-712 typed data signing request.
#[derive(Debug, Clone)]
pub struct TypedMessageParams {
    pub from: Address,
    pub data: TypedData,
}
