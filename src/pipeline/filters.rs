//! Locally served filters.
//!
//! Block filters are fed by the block poller, pending-transaction filters by
//! hashes of transactions this relay published, and log filters query the
//! remote endpoint's `eth_getLogs` over the blocks they have not seen yet.
//! A filter nobody polls for [`FILTER_IDLE_TIMEOUT`] is dropped on the next
//! block.

use alloy::primitives::B256;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::events::BlockEvent;
use crate::error::{RelayError, RelayResult};
use crate::pipeline::request::{parse_quantity, to_quantity, JsonRpcRequest};
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::transport::Transport;

const NO_BLOCK: u64 = u64::MAX;

/// How long an unpolled filter is kept.
pub const FILTER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
enum Filter {
    Block { hashes: Vec<B256> },
    PendingTransaction { hashes: Vec<Value> },
    Log { criteria: Value, next_block: u64 },
}

#[derive(Debug)]
struct Installed {
    filter: Filter,
    last_poll: Instant,
}

impl Installed {
    fn touch(&mut self) -> &mut Filter {
        self.last_poll = Instant::now();
        &mut self.filter
    }
}

#[derive(Clone)]
pub struct FilterStage {
    transport: Arc<dyn Transport>,
    filters: Arc<DashMap<u64, Installed>>,
    next_id: Arc<AtomicU64>,
    latest_block: Arc<AtomicU64>,
    idle_timeout: Duration,
}

impl FilterStage {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_idle_timeout(transport, FILTER_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(transport: Arc<dyn Transport>, idle_timeout: Duration) -> Self {
        Self {
            transport,
            filters: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            latest_block: Arc::new(AtomicU64::new(NO_BLOCK)),
            idle_timeout,
        }
    }

    pub async fn handle(&self, request: &JsonRpcRequest) -> RelayResult<StageOutcome> {
        let result = match request.method.as_str() {
            "eth_newBlockFilter" => self.install(Filter::Block { hashes: Vec::new() }),
            "eth_newPendingTransactionFilter" => self.install(Filter::PendingTransaction { hashes: Vec::new() }),
            "eth_newFilter" => {
                let criteria = request.required_param(0)?.clone();
                if !criteria.is_object() {
                    return Err(RelayError::InvalidParams("filter criteria must be an object".to_string()));
                }
                let next_block = match block_number(&criteria, "fromBlock")? {
                    Some(n) => n,
                    None => self.current_block().await? + 1,
                };
                self.install(Filter::Log { criteria, next_block })
            }
            "eth_getFilterChanges" => self.changes(filter_id(request)?).await?,
            "eth_getFilterLogs" => self.logs(filter_id(request)?).await?,
            "eth_uninstallFilter" => Value::Bool(self.filters.remove(&filter_id(request)?).is_some()),
            _ => return Ok(StageOutcome::Forward),
        };
        Ok(StageOutcome::Answer(result))
    }

    /// Record transactions published through the wallet stage.
    pub fn observe(&self, request: &JsonRpcRequest, result: &Value) {
        if request.method != "eth_sendTransaction" || result.is_null() {
            return;
        }
        for mut entry in self.filters.iter_mut() {
            if let Filter::PendingTransaction { hashes } = &mut entry.value_mut().filter {
                hashes.push(result.clone());
            }
        }
    }

    pub fn on_block(&self, block: &BlockEvent) {
        self.latest_block.store(block.number, Ordering::SeqCst);
        self.filters.retain(|id, installed| {
            if installed.last_poll.elapsed() > self.idle_timeout {
                tracing::debug!(filter_id = *id, "Idle filter expired");
                return false;
            }
            true
        });
        for mut entry in self.filters.iter_mut() {
            if let Filter::Block { hashes } = &mut entry.value_mut().filter {
                hashes.push(block.hash);
            }
        }
    }

    pub fn installed(&self) -> usize {
        self.filters.len()
    }

    fn install(&self, filter: Filter) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(filter_id = id, ?filter, "Filter installed");
        self.filters.insert(id, Installed { filter, last_poll: Instant::now() });
        Value::String(to_quantity(id))
    }

    async fn current_block(&self) -> RelayResult<u64> {
        match self.latest_block.load(Ordering::SeqCst) {
            NO_BLOCK => parse_quantity(&self.transport.request("eth_blockNumber", json!([])).await?),
            n => Ok(n),
        }
    }

    async fn changes(&self, id: u64) -> RelayResult<Value> {
        let head = match self.peek(id)? {
            FilterKind::Log => Some(self.current_block().await?),
            FilterKind::Queue => None,
        };

        // Drain the queue, or claim the unseen log window, before any await so
        // concurrent polls never hand out the same entries twice.
        let (criteria, from, to) = {
            let mut entry = self
                .filters
                .get_mut(&id)
                .ok_or_else(|| RelayError::FilterNotFound(to_quantity(id)))?;
            match entry.value_mut().touch() {
                Filter::Block { hashes } => {
                    let drained: Vec<Value> = hashes.drain(..).map(|h| json!(h)).collect();
                    return Ok(Value::Array(drained));
                }
                Filter::PendingTransaction { hashes } => return Ok(Value::Array(std::mem::take(hashes))),
                Filter::Log { criteria, next_block } => {
                    let mut to = head.unwrap_or(NO_BLOCK);
                    if let Some(limit) = block_number(criteria, "toBlock")? {
                        to = to.min(limit);
                    }
                    let from = *next_block;
                    if from > to {
                        return Ok(Value::Array(Vec::new()));
                    }
                    *next_block = to + 1;
                    (criteria.clone(), from, to)
                }
            }
        };

        let mut query = criteria;
        query["fromBlock"] = json!(to_quantity(from));
        query["toBlock"] = json!(to_quantity(to));
        match self.transport.request("eth_getLogs", json!([query])).await {
            Ok(logs) => Ok(logs),
            Err(e) => {
                // Hand the window back unless a later poll already moved past it.
                if let Some(mut entry) = self.filters.get_mut(&id) {
                    if let Filter::Log { next_block, .. } = &mut entry.value_mut().filter {
                        if *next_block == to + 1 {
                            *next_block = from;
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn peek(&self, id: u64) -> RelayResult<FilterKind> {
        match self.filters.get(&id).map(|f| matches!(f.filter, Filter::Log { .. })) {
            Some(true) => Ok(FilterKind::Log),
            Some(false) => Ok(FilterKind::Queue),
            None => Err(RelayError::FilterNotFound(to_quantity(id))),
        }
    }

    async fn logs(&self, id: u64) -> RelayResult<Value> {
        let criteria = match self.filters.get_mut(&id).map(|mut f| f.touch().clone()) {
            Some(Filter::Log { criteria, .. }) => criteria,
            Some(_) => return Ok(Value::Array(Vec::new())),
            None => return Err(RelayError::FilterNotFound(to_quantity(id))),
        };
        self.transport.request("eth_getLogs", json!([criteria])).await
    }
}

enum FilterKind {
    Log,
    Queue,
}

fn filter_id(request: &JsonRpcRequest) -> RelayResult<u64> {
    parse_quantity(request.required_param(0)?)
        .map_err(|_| RelayError::InvalidParams(format!("{} expects a filter id", request.method)))
}

/// Block number under `key`; head-relative tags such as `latest` yield `None`.
fn block_number(criteria: &Value, key: &str) -> RelayResult<Option<u64>> {
    match criteria.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(tag)) if tag == "earliest" => Ok(Some(0)),
        Some(Value::String(tag)) if !tag.starts_with("0x") => Ok(None),
        Some(v) => parse_quantity(v).map(Some),
    }
}

impl std::fmt::Debug for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterStage").field("installed", &self.filters.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn request(&self, method: &str, params: Value) -> RelayResult<Value> {
            self.calls.lock().unwrap().push((method.to_string(), params));
            match method {
                "eth_blockNumber" => Ok(json!("0x10")),
                "eth_getLogs" => Ok(json!([{ "logIndex": "0x0" }])),
                _ => Ok(Value::Null),
            }
        }
    }

    fn req(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(1, method, params)
    }

    async fn answer(stage: &FilterStage, request: JsonRpcRequest) -> Value {
        match stage.handle(&request).await.unwrap() {
            StageOutcome::Answer(v) => v,
            StageOutcome::Forward => panic!("{} was forwarded", request.method),
        }
    }

    #[tokio::test]
    async fn test_block_filter_collects_hashes() {
        let stage = FilterStage::new(Arc::new(Recorder::default()));
        let id = answer(&stage, req("eth_newBlockFilter", json!([]))).await;
        assert_eq!(id, json!("0x1"));

        stage.on_block(&BlockEvent { number: 17, hash: B256::repeat_byte(0xaa) });
        let changes = answer(&stage, req("eth_getFilterChanges", json!([id.clone()]))).await;
        assert_eq!(changes, json!([B256::repeat_byte(0xaa)]));

        let again = answer(&stage, req("eth_getFilterChanges", json!([id]))).await;
        assert_eq!(again, json!([]));
    }

    #[tokio::test]
    async fn test_log_filter_queries_unseen_range() {
        let transport = Arc::new(Recorder::default());
        let stage = FilterStage::new(transport.clone());
        let id = answer(&stage, req("eth_newFilter", json!([{ "address": "0x01" }]))).await;

        // Created at head 0x10, so the first window starts at 0x11.
        stage.on_block(&BlockEvent { number: 0x12, hash: B256::ZERO });
        let logs = answer(&stage, req("eth_getFilterChanges", json!([id.clone()]))).await;
        assert_eq!(logs, json!([{ "logIndex": "0x0" }]));

        let calls = transport.calls.lock().unwrap().clone();
        let (method, params) = calls.last().unwrap();
        assert_eq!(method, "eth_getLogs");
        assert_eq!(params[0]["fromBlock"], "0x11");
        assert_eq!(params[0]["toBlock"], "0x12");
        assert_eq!(params[0]["address"], "0x01");

        // Nothing new until the head moves.
        let empty = answer(&stage, req("eth_getFilterChanges", json!([id]))).await;
        assert_eq!(empty, json!([]));
    }

    #[tokio::test]
    async fn test_pending_filter_sees_published_hashes() {
        let stage = FilterStage::new(Arc::new(Recorder::default()));
        let id = answer(&stage, req("eth_newPendingTransactionFilter", json!([]))).await;
        stage.observe(&req("eth_sendTransaction", json!([{}])), &json!("0xbeef"));
        let changes = answer(&stage, req("eth_getFilterChanges", json!([id]))).await;
        assert_eq!(changes, json!(["0xbeef"]));
    }

    #[tokio::test]
    async fn test_uninstall_and_unknown_filter() {
        let stage = FilterStage::new(Arc::new(Recorder::default()));
        let id = answer(&stage, req("eth_newBlockFilter", json!([]))).await;
        assert_eq!(answer(&stage, req("eth_uninstallFilter", json!([id.clone()]))).await, json!(true));
        assert_eq!(answer(&stage, req("eth_uninstallFilter", json!([id.clone()]))).await, json!(false));

        let err = stage.handle(&req("eth_getFilterChanges", json!([id]))).await.unwrap_err();
        assert_eq!(err, RelayError::FilterNotFound("0x1".to_string()));
    }

    #[tokio::test]
    async fn test_idle_filters_expire_on_block() {
        let stage = FilterStage::with_idle_timeout(Arc::new(Recorder::default()), Duration::from_millis(200));
        let idle = answer(&stage, req("eth_newBlockFilter", json!([]))).await;
        let polled = answer(&stage, req("eth_newPendingTransactionFilter", json!([]))).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        answer(&stage, req("eth_getFilterChanges", json!([polled.clone()]))).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        stage.on_block(&BlockEvent { number: 1, hash: B256::ZERO });
        assert_eq!(stage.installed(), 1);
        let err = stage.handle(&req("eth_getFilterChanges", json!([idle]))).await.unwrap_err();
        assert!(matches!(err, RelayError::FilterNotFound(_)));
        assert_eq!(answer(&stage, req("eth_getFilterChanges", json!([polled]))).await, json!([]));
    }

    /// Yields inside `eth_getLogs` so concurrent polls interleave.
    #[derive(Default)]
    struct YieldingLogs {
        log_calls: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Transport for YieldingLogs {
        async fn request(&self, method: &str, params: Value) -> RelayResult<Value> {
            if method == "eth_getLogs" {
                self.log_calls.lock().unwrap().push(params);
                tokio::task::yield_now().await;
                return Ok(json!([{ "logIndex": "0x0" }]));
            }
            Ok(json!("0x10"))
        }
    }

    #[tokio::test]
    async fn test_concurrent_polls_never_share_a_window() {
        let transport = Arc::new(YieldingLogs::default());
        let stage = FilterStage::new(transport.clone());
        let id = answer(&stage, req("eth_newFilter", json!([{ "fromBlock": "0x5" }]))).await;
        stage.on_block(&BlockEvent { number: 0x10, hash: B256::ZERO });

        let (a, b) = tokio::join!(
            answer(&stage, req("eth_getFilterChanges", json!([id.clone()]))),
            answer(&stage, req("eth_getFilterChanges", json!([id.clone()]))),
        );
        let total = a.as_array().unwrap().len() + b.as_array().unwrap().len();
        assert_eq!(total, 1);
        assert_eq!(transport.log_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_earliest_starts_at_genesis() {
        let transport = Arc::new(Recorder::default());
        let stage = FilterStage::new(transport.clone());
        let id = answer(&stage, req("eth_newFilter", json!([{ "fromBlock": "earliest" }]))).await;
        stage.on_block(&BlockEvent { number: 0x12, hash: B256::ZERO });

        answer(&stage, req("eth_getFilterChanges", json!([id]))).await;
        let calls = transport.calls.lock().unwrap().clone();
        let (_, params) = calls.last().unwrap();
        assert_eq!(params[0]["fromBlock"], "0x0");
        assert_eq!(params[0]["toBlock"], "0x12");
    }
}
