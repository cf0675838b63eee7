//! Response cache.
//!
//! Reads whose answer can never change (lookups by hash, explicit block
//! numbers) are kept until evicted by capacity; reads tied to the chain head
//! are dropped on every new block. `pending` reads and `null` answers are
//! never stored.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::config::schema::CacheConfig;
use crate::pipeline::request::JsonRpcRequest;
use crate::pipeline::stage::StageOutcome;

/// How long a cached answer stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    Permanent,
    Block,
}

/// Cache scope for `request`, or `None` if it must not be cached.
pub fn cache_scope(request: &JsonRpcRequest) -> Option<CacheScope> {
    let block_param = match request.method.as_str() {
        "web3_sha3"
        | "eth_chainId"
        | "net_version"
        | "eth_getTransactionByHash"
        | "eth_getTransactionReceipt"
        | "eth_getBlockByHash"
        | "eth_getBlockTransactionCountByHash"
        | "eth_getUncleCountByBlockHash"
        | "eth_getTransactionByBlockHashAndIndex"
        | "eth_getUncleByBlockHashAndIndex" => return Some(CacheScope::Permanent),

        "eth_blockNumber" | "eth_gasPrice" | "eth_estimateGas" | "eth_getLogs" => {
            return Some(CacheScope::Block)
        }

        "eth_getBlockByNumber"
        | "eth_getBlockTransactionCountByNumber"
        | "eth_getUncleCountByBlockNumber"
        | "eth_getTransactionByBlockNumberAndIndex"
        | "eth_getUncleByBlockNumberAndIndex" => 0,
        "eth_getBalance" | "eth_getCode" | "eth_getTransactionCount" | "eth_call" => 1,
        "eth_getStorageAt" => 2,
        _ => return None,
    };

    match request.param(block_param).and_then(Value::as_str) {
        None | Some("latest") => Some(CacheScope::Block),
        Some("pending") => None,
        // "earliest" and explicit numbers never change.
        Some(_) => Some(CacheScope::Permanent),
    }
}

struct CacheEntry {
    scope: CacheScope,
    value: Value,
}

#[derive(Clone)]
pub struct CacheStage {
    entries: Arc<DashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl CacheStage {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries: config.max_entries,
        }
    }

    pub fn handle(&self, request: &JsonRpcRequest) -> StageOutcome {
        if cache_scope(request).is_none() {
            return StageOutcome::Forward;
        }
        match self.entries.get(&request.cache_key()) {
            Some(entry) => {
                tracing::trace!(method = %request.method, "Cache hit");
                StageOutcome::Answer(entry.value.clone())
            }
            None => StageOutcome::Forward,
        }
    }

    /// Store an answer produced by a later stage.
    pub fn observe(&self, request: &JsonRpcRequest, result: &Value) {
        if result.is_null() {
            return;
        }
        let Some(scope) = cache_scope(request) else {
            return;
        };
        let key = request.cache_key();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            tracing::debug!(max_entries = self.max_entries, "Cache full, skipping insert");
            return;
        }
        self.entries.insert(key, CacheEntry { scope, value: result.clone() });
    }

    /// Drop every entry tied to the previous chain head.
    pub fn on_block(&self) {
        self.entries.retain(|_, entry| entry.scope == CacheScope::Permanent);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CacheStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStage")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
