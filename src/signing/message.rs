//! Message signing over the key-holder boundary.

use alloy::primitives::{eip191_hash_message, keccak256, Address, B256};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};
use crate::observability::metrics;
use crate::resilience::timeouts::bounded;
use crate::signing::keys::KeyHolder;
use crate::signing::signature::{concat_sig_bytes, V_OFFSET};
use crate::signing::types::{MessageParams, TypedMessageParams};

/// Signs raw, personal and typed messages and returns the serialized signature.
#[derive(Clone)]
pub struct MessageSigner {
    keys: Arc<dyn KeyHolder>,
    timeout: Duration,
}

impl MessageSigner {
    pub fn new(keys: Arc<dyn KeyHolder>, timeout: Duration) -> Self {
        Self { keys, timeout }
    }

    pub fn key_holder(&self) -> &Arc<dyn KeyHolder> {
        &self.keys
    }

    /// keccak-256 of the payload, no prefix.
    pub async fn sign_message(&self, msg: &MessageParams) -> RelayResult<String> {
        let digest = keccak256(&msg.data);
        self.sign(msg.from, digest, "raw").await
    }

    /// EIP-191 personal message hash.
    pub async fn sign_personal_message(&self, msg: &MessageParams) -> RelayResult<String> {
        let digest = eip191_hash_message(&msg.data);
        self.sign(msg.from, digest, "personal").await
    }

    /// EIP-712 signing hash (domain separator + struct hash).
    pub async fn sign_typed_message(&self, msg: &TypedMessageParams) -> RelayResult<String> {
        let digest = msg
            .data
            .eip712_signing_hash()
            .map_err(|e| RelayError::Encoding(format!("typed data: {}", e)))?;
        self.sign(msg.from, digest, "typed").await
    }

    async fn sign(&self, account: Address, digest: B256, kind: &'static str) -> RelayResult<String> {
        let signature = bounded("key holder", self.timeout, self.keys.sign_digest(account, digest)).await?;
        let serialized = concat_sig_bytes(
            V_OFFSET + signature.v() as u64,
            &signature.r().to_be_bytes::<32>(),
            &signature.s().to_be_bytes::<32>(),
        )?;
        metrics::record_signature(kind);
        tracing::debug!(account = %account, digest = %digest, kind, "Message signed");
        Ok(serialized)
    }
}

impl std::fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSigner")
            .field("timeout", &self.timeout)
            .finish()
    }
}
