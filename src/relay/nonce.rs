//! Local nonce source.
//!
//! Seeds each account from the remote pending transaction count on first use
//! and counts up locally after that.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{RelayError, RelayResult};
use crate::pipeline::request::parse_quantity;
use crate::pipeline::transport::Transport;
use crate::signing::assembler::NonceSource;

#[derive(Clone)]
pub struct LocalNonceSource {
    transport: Arc<dyn Transport>,
    /// Next nonce to hand out per account; `None` until seeded.
    next: Arc<DashMap<Address, Arc<Mutex<Option<u64>>>>>,
}

impl LocalNonceSource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next: Arc::new(DashMap::new()),
        }
    }

    fn slot(&self, address: Address) -> Arc<Mutex<Option<u64>>> {
        self.next.entry(address).or_default().clone()
    }

    async fn remote_pending_count(&self, address: Address) -> RelayResult<u64> {
        let count = self
            .transport
            .request("eth_getTransactionCount", json!([address, "pending"]))
            .await
            .map_err(|e| RelayError::NonceUnavailable(e.to_string()))?;
        parse_quantity(&count).map_err(|e| RelayError::NonceUnavailable(e.to_string()))
    }
}

#[async_trait]
impl NonceSource for LocalNonceSource {
    async fn next_nonce(&self, address: Address) -> RelayResult<u64> {
        let slot = self.slot(address);
        let mut next = slot.lock().await;
        let nonce = match *next {
            Some(n) => n,
            None => {
                let seeded = self.remote_pending_count(address).await?;
                tracing::debug!(address = %address, nonce = seeded, "Nonce seeded from remote");
                seeded
            }
        };
        *next = Some(nonce + 1);
        Ok(nonce)
    }

    /// Rewinds only if `nonce` is the latest one handed out for `address`.
    async fn release(&self, address: Address, nonce: u64) -> RelayResult<()> {
        let slot = self.slot(address);
        let mut next = slot.lock().await;
        if *next == Some(nonce + 1) {
            *next = Some(nonce);
        } else {
            tracing::debug!(address = %address, nonce, "Nonce already superseded, not rewinding");
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalNonceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNonceSource").field("accounts", &self.next.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Remote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Remote {
        async fn request(&self, method: &str, params: Value) -> RelayResult<Value> {
            assert_eq!(method, "eth_getTransactionCount");
            assert_eq!(params[1], "pending");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("0x7"))
        }
    }

    #[tokio::test]
    async fn test_seeds_once_then_counts() {
        let remote = Arc::new(Remote::default());
        let source = LocalNonceSource::new(remote.clone());
        let alice = Address::repeat_byte(1);

        assert_eq!(source.next_nonce(alice).await.unwrap(), 7);
        assert_eq!(source.next_nonce(alice).await.unwrap(), 8);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_seeds_once() {
        let remote = Arc::new(Remote::default());
        let source = LocalNonceSource::new(remote.clone());
        let alice = Address::repeat_byte(1);

        let (a, b) = tokio::join!(source.next_nonce(alice), source.next_nonce(alice));
        let mut got = vec![a.unwrap(), b.unwrap()];
        got.sort();
        assert_eq!(got, vec![7, 8]);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_rewinds_only_latest() {
        let source = LocalNonceSource::new(Arc::new(Remote::default()));
        let alice = Address::repeat_byte(1);

        let first = source.next_nonce(alice).await.unwrap();
        let second = source.next_nonce(alice).await.unwrap();

        source.release(alice, first).await.unwrap();
        assert_eq!(source.next_nonce(alice).await.unwrap(), 9);

        source.release(alice, 9).await.unwrap();
        assert_eq!(source.next_nonce(alice).await.unwrap(), 9);
        assert_eq!(second, 8);
    }

    struct Down;

    #[async_trait]
    impl Transport for Down {
        async fn request(&self, _method: &str, _params: Value) -> RelayResult<Value> {
            Err(RelayError::Transport("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_remote_failure_is_nonce_unavailable() {
        let source = LocalNonceSource::new(Arc::new(Down));
        let err = source.next_nonce(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, RelayError::NonceUnavailable(_)));
    }
}
