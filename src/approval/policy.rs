//! Config-driven approval policy with atomic hot reload.

use alloy::primitives::Address;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;

use crate::approval::{ApprovalGate, RequestKind};
use crate::config::schema::{ApprovalConfig, ApprovalMode};
use crate::error::RelayResult;
use crate::signing::types::{MessageParams, TransactionParams, TypedMessageParams};

/// Approval gate evaluating the `[approval]` config section.
///
/// The policy lives behind an `ArcSwap` so a config reload replaces it without
/// blocking in-flight evaluations.
#[derive(Clone)]
pub struct PolicyGate {
    policy: Arc<ArcSwap<ApprovalConfig>>,
}

impl PolicyGate {
    pub fn new(config: ApprovalConfig) -> Self {
        Self {
            policy: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Replace the active policy.
    pub fn update(&self, config: ApprovalConfig) {
        tracing::info!(mode = ?config.mode, "Approval policy updated");
        self.policy.store(Arc::new(config));
    }

    pub fn current(&self) -> Arc<ApprovalConfig> {
        self.policy.load_full()
    }

    fn evaluate(&self, kind: RequestKind, from: Address, check: impl FnOnce(&ApprovalConfig) -> bool) -> bool {
        let policy = self.policy.load();
        let approved = match policy.mode {
            ApprovalMode::ApproveAll => true,
            ApprovalMode::DenyAll => false,
            ApprovalMode::Policy => {
                let account_ok =
                    policy.allowed_accounts.is_empty() || policy.allowed_accounts.contains(&from);
                account_ok && check(&policy)
            }
        };
        if !approved {
            tracing::warn!(kind = kind.as_str(), from = %from, "Request denied by approval policy");
        }
        approved
    }
}

#[async_trait]
impl ApprovalGate for PolicyGate {
    async fn approve_transaction(&self, tx: &TransactionParams) -> RelayResult<bool> {
        Ok(self.evaluate(RequestKind::Transaction, tx.from, |p| {
            p.max_value.map_or(true, |max| tx.value <= max)
        }))
    }

    async fn approve_message(&self, msg: &MessageParams) -> RelayResult<bool> {
        Ok(self.evaluate(RequestKind::Message, msg.from, |p| p.allow_raw_messages))
    }

    async fn approve_personal_message(&self, msg: &MessageParams) -> RelayResult<bool> {
        Ok(self.evaluate(RequestKind::PersonalMessage, msg.from, |p| p.allow_personal_messages))
    }

    async fn approve_typed_message(&self, msg: &TypedMessageParams) -> RelayResult<bool> {
        Ok(self.evaluate(RequestKind::TypedMessage, msg.from, |p| p.allow_typed_messages))
    }
}

impl std::fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGate").field("policy", &self.policy.load_full()).finish()
    }
}
