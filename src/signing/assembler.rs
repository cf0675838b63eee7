//! Transaction assembly: nonce, canonical hash, signature, identity, envelope.
//!
//! # Flow
//! ```text
//! TransactionParams
//!     → NonceSource::next_nonce(from)      (Unsequenced → Sequenced)
//!     → encoder::digest(7 fields)          (Sequenced → Hashed)
//!     → MessageSigner::sign_message        (Hashed → Signed)
//!     → IdentityResolver::username(from)
//!     → MetaTransaction                    (Signed → Sealed)
//! ```
//!
//! Any failing step short-circuits; no partial envelope escapes. With
//! `serialize_per_account` a per-address lock spans nonce acquisition and
//! hashing so concurrent requests for one account get distinct nonces.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::schema::{SigningConfig, TimeoutConfig};
use crate::error::{RelayError, RelayResult};
use crate::resilience::timeouts::bounded;
use crate::signing::message::MessageSigner;
use crate::signing::types::{HashedTx, MessageParams, MetaTransaction, TransactionParams, UnsequencedTx};

/// External authority allocating per-account sequence numbers.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Allocate the next nonce for `address`.
    async fn next_nonce(&self, address: Address) -> RelayResult<u64>;

    /// Hand back a nonce that was allocated but never attached to a published
    /// transaction. Sources that cannot rewind ignore this.
    async fn release(&self, _address: Address, _nonce: u64) -> RelayResult<()> {
        Ok(())
    }
}

/// External authority mapping accounts to display identities.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn username(&self, address: Address) -> RelayResult<String>;
}

/// Builds signed meta-transaction envelopes.
#[derive(Clone)]
pub struct TransactionAssembler {
    nonces: Arc<dyn NonceSource>,
    signer: MessageSigner,
    identities: Arc<dyn IdentityResolver>,
    timeouts: TimeoutConfig,
    signing: SigningConfig,
    account_locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
}

impl TransactionAssembler {
    pub fn new(
        nonces: Arc<dyn NonceSource>,
        signer: MessageSigner,
        identities: Arc<dyn IdentityResolver>,
        timeouts: TimeoutConfig,
        signing: SigningConfig,
    ) -> Self {
        Self {
            nonces,
            signer,
            identities,
            timeouts,
            signing,
            account_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn signer(&self) -> &MessageSigner {
        &self.signer
    }

    /// Produce the signed envelope for `params`.
    pub async fn sign_transaction(&self, params: TransactionParams) -> RelayResult<MetaTransaction> {
        let from = params.from;
        let hashed = self.sequence_and_hash(UnsequencedTx::new(params)).await?;
        let nonce = hashed.nonce();

        match self.finish(hashed).await {
            Ok(envelope) => {
                tracing::info!(from = %from, nonce, username = %envelope.username(), "Meta-transaction assembled");
                Ok(envelope)
            }
            Err(e) => {
                self.release_unused(from, nonce, &e).await;
                Err(e)
            }
        }
    }

    async fn sequence_and_hash(&self, tx: UnsequencedTx) -> RelayResult<HashedTx> {
        let from = tx.params().from;
        let _guard = if self.signing.serialize_per_account {
            let lock = self.account_locks.entry(from).or_default().clone();
            Some(lock.lock_owned().await)
        } else {
            None
        };

        let nonce = bounded("nonce source", self.timeouts.nonce(), self.nonces.next_nonce(from))
            .await
            .map_err(|e| match e {
                RelayError::Timeout { .. } | RelayError::NonceUnavailable(_) => e,
                other => RelayError::NonceUnavailable(other.to_string()),
            })?;
        tracing::debug!(from = %from, nonce, "Nonce acquired");

        Ok(tx.sequence(nonce).hash())
    }

    async fn finish(&self, hashed: HashedTx) -> RelayResult<MetaTransaction> {
        let from = hashed.params().from;
        let msg = MessageParams {
            from,
            data: Bytes::copy_from_slice(hashed.digest().as_slice()),
        };
        let signature = self.signer.sign_message(&msg).await?;
        let signed = hashed.sign(signature);

        let username = bounded("identity resolver", self.timeouts.identity(), self.identities.username(from))
            .await
            .map_err(|e| match e {
                RelayError::Timeout { .. } | RelayError::IdentityUnavailable(_) => e,
                other => RelayError::IdentityUnavailable(other.to_string()),
            })?;

        Ok(signed.seal(username))
    }

    /// Hand `nonce` back after a failure that kept it from being used.
    ///
    /// Never fails: the release outcome is logged and `cause` stays the
    /// error the caller sees.
    pub async fn release_unused(&self, from: Address, nonce: u64, cause: &RelayError) {
        if !self.signing.release_unused_nonce {
            tracing::warn!(from = %from, nonce, error = %cause, "Discarding unused nonce");
            return;
        }
        match bounded("nonce release", self.timeouts.nonce(), self.nonces.release(from, nonce)).await {
            Ok(()) => tracing::info!(from = %from, nonce, error = %cause, "Released unused nonce"),
            Err(e) => tracing::warn!(from = %from, nonce, error = %e, "Failed to release unused nonce"),
        }
    }
}

impl std::fmt::Debug for TransactionAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionAssembler")
            .field("signing", &self.signing)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
