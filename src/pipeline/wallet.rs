//! Approval and signing stage.
//!
//! Serves the account list and every signing method. Each signing request is
//! approved first; a denial ends the request before a nonce is allocated or a
//! key is touched.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, Bytes};
use serde_json::Value;
use std::sync::Arc;

use crate::approval::{ApprovalGate, RequestKind};
use crate::config::schema::TimeoutConfig;
use crate::error::{RelayError, RelayResult};
use crate::pipeline::request::JsonRpcRequest;
use crate::pipeline::stage::{RequestState, StageOutcome};
use crate::relay::publisher::Publisher;
use crate::resilience::timeouts::bounded;
use crate::signing::assembler::TransactionAssembler;
use crate::signing::encoder::{parse_address, parse_address_str, parse_bytes_str};
use crate::signing::types::{MessageParams, TransactionParams, TypedMessageParams};

/// Methods this stage answers.
pub const WALLET_METHODS: &[&str] = &[
    "eth_accounts",
    "eth_coinbase",
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

#[derive(Clone)]
pub struct WalletStage {
    approval: Arc<dyn ApprovalGate>,
    assembler: TransactionAssembler,
    publisher: Arc<dyn Publisher>,
    timeouts: TimeoutConfig,
}

impl WalletStage {
    pub fn new(
        approval: Arc<dyn ApprovalGate>,
        assembler: TransactionAssembler,
        publisher: Arc<dyn Publisher>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            approval,
            assembler,
            publisher,
            timeouts,
        }
    }

    /// Final state of a request this stage answered.
    pub fn answered_state(method: &str) -> RequestState {
        match method {
            "eth_sendTransaction" => RequestState::Published,
            "eth_accounts" | "eth_coinbase" => RequestState::AccountsAnswered,
            _ => RequestState::Signed,
        }
    }

    pub async fn handle(&self, request: &JsonRpcRequest) -> RelayResult<StageOutcome> {
        let result = match request.method.as_str() {
            "eth_accounts" => serde_json::to_value(self.accounts()).unwrap_or(Value::Null),
            "eth_coinbase" => self.accounts().first().map(|a| Value::String(a.to_string())).unwrap_or(Value::Null),
            "eth_sendTransaction" => self.send_transaction(request).await?,
            "eth_signTransaction" => self.sign_transaction(request).await?,
            "eth_sign" => self.sign_message(request).await?,
            "personal_sign" => self.sign_personal_message(request).await?,
            "eth_signTypedData" | "eth_signTypedData_v3" | "eth_signTypedData_v4" => {
                self.sign_typed_message(request).await?
            }
            _ => return Ok(StageOutcome::Forward),
        };
        Ok(StageOutcome::Answer(result))
    }

    fn accounts(&self) -> Vec<Address> {
        self.assembler.signer().key_holder().accounts()
    }

    async fn approve<F>(&self, kind: RequestKind, method: &str, verdict: F) -> RelayResult<()>
    where
        F: std::future::Future<Output = RelayResult<bool>>,
    {
        tracing::debug!(method, kind = kind.as_str(), state = RequestState::ApprovalPending.as_str(), "Awaiting approval");
        if bounded("approval gate", self.timeouts.approval(), verdict).await? {
            Ok(())
        } else {
            Err(RelayError::NotApproved(method.to_string()))
        }
    }

    async fn send_transaction(&self, request: &JsonRpcRequest) -> RelayResult<Value> {
        let params = TransactionParams::from_json(request.required_param(0)?)?;
        self.approve(RequestKind::Transaction, &request.method, self.approval.approve_transaction(&params))
            .await?;

        let from = params.from;
        let envelope = self.assembler.sign_transaction(params).await?;
        let nonce = envelope.params().nonce;

        match bounded("publisher", self.timeouts.publish(), self.publisher.publish(&envelope)).await {
            Ok(tx_hash) => {
                tracing::info!(from = %from, nonce, tx_hash = %tx_hash, "Meta-transaction published");
                Ok(Value::String(tx_hash.to_string()))
            }
            Err(e) => {
                let e = match e {
                    RelayError::Timeout { .. } | RelayError::Publish(_) | RelayError::NotDelivered(_) => e,
                    other => RelayError::Publish(other.to_string()),
                };
                // The relayer may hold the envelope unless delivery definitely failed.
                if matches!(e, RelayError::NotDelivered(_)) {
                    self.assembler.release_unused(from, nonce, &e).await;
                } else {
                    tracing::warn!(from = %from, nonce, error = %e, "Publish outcome unknown, keeping nonce");
                }
                Err(e)
            }
        }
    }

    async fn sign_transaction(&self, request: &JsonRpcRequest) -> RelayResult<Value> {
        let params = TransactionParams::from_json(request.required_param(0)?)?;
        self.approve(RequestKind::Transaction, &request.method, self.approval.approve_transaction(&params))
            .await?;
        let envelope = self.assembler.sign_transaction(params).await?;
        serde_json::to_value(&envelope).map_err(|e| RelayError::Encoding(e.to_string()))
    }

    async fn sign_message(&self, request: &JsonRpcRequest) -> RelayResult<Value> {
        let msg = MessageParams {
            from: parse_address(request.required_param(0)?)?,
            data: message_bytes(request.str_param(1)?)?,
        };
        self.approve(RequestKind::Message, &request.method, self.approval.approve_message(&msg)).await?;
        Ok(Value::String(self.assembler.signer().sign_message(&msg).await?))
    }

    async fn sign_personal_message(&self, request: &JsonRpcRequest) -> RelayResult<Value> {
        let first = request.str_param(0)?;
        let second = request.str_param(1)?;
        // Canonical order is [data, address]; some callers send [address, data].
        let (data, address) = if is_address(first) && !is_address(second) {
            (second, first)
        } else {
            (first, second)
        };
        let msg = MessageParams {
            from: parse_address_str(address)?,
            data: message_bytes(data)?,
        };
        self.approve(RequestKind::PersonalMessage, &request.method, self.approval.approve_personal_message(&msg))
            .await?;
        Ok(Value::String(self.assembler.signer().sign_personal_message(&msg).await?))
    }

    async fn sign_typed_message(&self, request: &JsonRpcRequest) -> RelayResult<Value> {
        let first = request.required_param(0)?;
        let second = request.required_param(1)?;
        let (address, payload) = if first.as_str().is_some_and(is_address) {
            (first, second)
        } else {
            (second, first)
        };
        let data: TypedData = match payload {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| RelayError::Encoding(format!("typed data: {}", e)))?;

        let msg = TypedMessageParams {
            from: parse_address(address)?,
            data,
        };
        self.approve(RequestKind::TypedMessage, &request.method, self.approval.approve_typed_message(&msg))
            .await?;
        Ok(Value::String(self.assembler.signer().sign_typed_message(&msg).await?))
    }
}

fn is_address(s: &str) -> bool {
    parse_address_str(s).is_ok()
}

/// Hex payloads are decoded; anything else is signed as its UTF-8 bytes.
fn message_bytes(data: &str) -> RelayResult<Bytes> {
    if data.starts_with("0x") {
        parse_bytes_str(data)
    } else {
        Ok(Bytes::copy_from_slice(data.as_bytes()))
    }
}

impl std::fmt::Debug for WalletStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStage")
            .field("assembler", &self.assembler)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_bytes() {
        assert_eq!(message_bytes("0x6869").unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(message_bytes("hi").unwrap(), Bytes::from_static(b"hi"));
        assert!(message_bytes("0x123").is_err());
    }

    #[test]
    fn test_answered_state() {
        assert_eq!(WalletStage::answered_state("eth_sendTransaction"), RequestState::Published);
        assert_eq!(WalletStage::answered_state("personal_sign"), RequestState::Signed);
        assert_eq!(WalletStage::answered_state("eth_accounts"), RequestState::AccountsAnswered);
    }
}
