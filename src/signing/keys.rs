//! Key-holder seam and the in-process key registry.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, Signer};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{RelayError, RelayResult};

/// Environment variable holding comma-separated hex private keys.
pub const PRIVATE_KEYS_ENV_VAR: &str = "META_RELAY_PRIVATE_KEYS";

/// An authority that signs 32-byte digests on behalf of accounts it controls.
#[async_trait]
pub trait KeyHolder: Send + Sync {
    /// Accounts this key-holder can sign for.
    fn accounts(&self) -> Vec<Address>;

    /// Sign `digest` with the key of `account`.
    async fn sign_digest(&self, account: Address, digest: B256) -> RelayResult<Signature>;
}

/// Key-holder backed by local private keys.
#[derive(Clone, Default)]
pub struct LocalKeyHolder {
    signers: Arc<DashMap<Address, PrivateKeySigner>>,
}

impl LocalKeyHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hex-encoded private key (with or without 0x prefix).
    pub fn add_private_key(&self, private_key_hex: &str) -> RelayResult<Address> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| RelayError::KeyUnavailable(format!("Invalid private key format: {}", e)))?;
        let address = signer.address();
        self.signers.insert(address, signer);

        tracing::info!(address = %address, "Signing key registered");
        Ok(address)
    }

    /// Load keys from `META_RELAY_PRIVATE_KEYS`. A missing variable yields an empty holder.
    pub fn from_env() -> RelayResult<Self> {
        let holder = Self::new();
        match std::env::var(PRIVATE_KEYS_ENV_VAR) {
            Ok(keys) => {
                for key in keys.split(',').filter(|k| !k.trim().is_empty()) {
                    holder.add_private_key(key)?;
                }
            }
            Err(_) => {
                tracing::warn!(
                    env = PRIVATE_KEYS_ENV_VAR,
                    "No signing keys configured; signing requests will fail"
                );
            }
        }
        Ok(holder)
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

#[async_trait]
impl KeyHolder for LocalKeyHolder {
    fn accounts(&self) -> Vec<Address> {
        let mut accounts: Vec<Address> = self.signers.iter().map(|r| *r.key()).collect();
        accounts.sort();
        accounts
    }

    async fn sign_digest(&self, account: Address, digest: B256) -> RelayResult<Signature> {
        // Clone out so no map guard is held across the await.
        let signer = self
            .signers
            .get(&account)
            .map(|r| r.value().clone())
            .ok_or_else(|| RelayError::KeyUnavailable(format!("no key for {}", account)))?;

        signer
            .sign_hash(&digest)
            .await
            .map_err(|e| RelayError::KeyUnavailable(format!("Signing failed: {}", e)))
    }
}

impl std::fmt::Debug for LocalKeyHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyHolder")
            .field("accounts", &self.accounts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    // Anvil's first account; publicly known, never use for real funds.
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_add_private_key() {
        let holder = LocalKeyHolder::new();
        let address = holder.add_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(
            address.to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(holder.accounts(), vec![address]);
    }

    #[test]
    fn test_invalid_private_key() {
        let holder = LocalKeyHolder::new();
        let err = holder.add_private_key("invalid_key").unwrap_err();
        assert!(matches!(err, RelayError::KeyUnavailable(_)));
        assert!(holder.is_empty());
    }

    #[tokio::test]
    async fn test_sign_digest_recovers() {
        let holder = LocalKeyHolder::new();
        let address = holder.add_private_key(TEST_PRIVATE_KEY).unwrap();
        let digest = keccak256(b"digest");

        let sig = holder.sign_digest(address, digest).await.unwrap();
        assert_eq!(sig.recover_address_from_prehash(&digest).unwrap(), address);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let holder = LocalKeyHolder::new();
        let err = holder.sign_digest(Address::ZERO, B256::ZERO).await.unwrap_err();
        assert!(matches!(err, RelayError::KeyUnavailable(_)));
    }
}
