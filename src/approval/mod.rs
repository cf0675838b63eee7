//! Approval gate.
//!
//! Four capability slots, one per request kind. The wallet stage consults the
//! matching slot before any nonce is allocated or key is touched, and rejects
//! the request with `NotApproved` when the verdict is negative.

pub mod policy;

use async_trait::async_trait;

use crate::error::RelayResult;
use crate::signing::types::{MessageParams, TransactionParams, TypedMessageParams};

pub use policy::PolicyGate;

/// Policy hook deciding whether a signing request may proceed.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve_transaction(&self, tx: &TransactionParams) -> RelayResult<bool>;

    async fn approve_message(&self, msg: &MessageParams) -> RelayResult<bool>;

    async fn approve_personal_message(&self, msg: &MessageParams) -> RelayResult<bool>;

    async fn approve_typed_message(&self, msg: &TypedMessageParams) -> RelayResult<bool>;
}

/// Request kinds guarded by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Transaction,
    Message,
    PersonalMessage,
    TypedMessage,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Transaction => "transaction",
            RequestKind::Message => "message",
            RequestKind::PersonalMessage => "personal message",
            RequestKind::TypedMessage => "typed message",
        }
    }
}
