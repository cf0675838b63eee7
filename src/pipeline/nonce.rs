//! Pending transaction count tracker.
//!
//! Answers `eth_getTransactionCount(address, "pending")` from memory once the
//! remote endpoint has answered it, counts transactions this relay published
//! since, and forgets everything when a new block arrives.

use alloy::primitives::Address;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::pipeline::request::{parse_quantity, to_quantity, JsonRpcRequest};
use crate::pipeline::stage::StageOutcome;
use crate::signing::encoder::parse_address;

#[derive(Clone, Default)]
pub struct NonceStage {
    pending: Arc<DashMap<Address, u64>>,
}

/// Address of a pending-count query, if `request` is one.
fn pending_query(request: &JsonRpcRequest) -> Option<Address> {
    if request.method != "eth_getTransactionCount" {
        return None;
    }
    if request.param(1).and_then(Value::as_str) != Some("pending") {
        return None;
    }
    request.param(0).and_then(|v| parse_address(v).ok())
}

impl NonceStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, request: &JsonRpcRequest) -> StageOutcome {
        let Some(address) = pending_query(request) else {
            return StageOutcome::Forward;
        };
        match self.pending.get(&address) {
            Some(count) => StageOutcome::Answer(Value::String(to_quantity(*count))),
            None => StageOutcome::Forward,
        }
    }

    /// Learn from answers produced by later stages.
    pub fn observe(&self, request: &JsonRpcRequest, result: &Value) {
        if let Some(address) = pending_query(request) {
            if let Ok(count) = parse_quantity(result) {
                self.pending.insert(address, count);
            }
            return;
        }

        if request.method == "eth_sendTransaction" {
            let from = request.param(0).and_then(|tx| tx.get("from")).and_then(|v| parse_address(v).ok());
            if let Some(from) = from {
                if let Some(mut count) = self.pending.get_mut(&from) {
                    *count += 1;
                    tracing::debug!(from = %from, pending = *count, "Pending count bumped");
                }
            }
        }
    }

    pub fn on_block(&self) {
        self.pending.clear();
    }

    pub fn pending_count(&self, address: &Address) -> Option<u64> {
        self.pending.get(address).map(|c| *c)
    }
}

impl std::fmt::Debug for NonceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceStage").field("tracked", &self.pending.len()).finish()
    }
}
