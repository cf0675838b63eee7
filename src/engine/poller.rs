//! Block poller.
//!
//! Asks the remote endpoint for the chain head on a fixed interval. A new
//! head is pushed to the pipeline stages first, then published to block
//! subscribers. Polling failures go to error subscribers and never stop the
//! loop.

use alloy::primitives::B256;
use arc_swap::ArcSwapOption;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::engine::events::{BlockEvent, EventHub};
use crate::error::{RelayError, RelayResult};
use crate::observability::metrics;
use crate::pipeline::request::{parse_quantity, to_quantity};
use crate::pipeline::{Pipeline, Transport};

pub struct BlockPoller {
    transport: Arc<dyn Transport>,
    pipeline: Arc<Pipeline>,
    events: EventHub,
    latest: Arc<ArcSwapOption<BlockEvent>>,
    interval: Duration,
}

impl BlockPoller {
    pub fn new(
        transport: Arc<dyn Transport>,
        pipeline: Arc<Pipeline>,
        events: EventHub,
        latest: Arc<ArcSwapOption<BlockEvent>>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            pipeline,
            events,
            latest,
            interval,
        }
    }

    /// Check the chain head once. Returns the new head, if it moved.
    pub async fn poll_once(&self) -> RelayResult<Option<BlockEvent>> {
        let number = parse_quantity(&self.transport.request("eth_blockNumber", json!([])).await?)?;
        if let Some(current) = self.latest.load().as_deref() {
            if number <= current.number {
                return Ok(None);
            }
        }

        let block = self
            .transport
            .request("eth_getBlockByNumber", json!([to_quantity(number), false]))
            .await?;
        let hash = match block.get("hash") {
            Some(Value::String(h)) => h
                .parse::<B256>()
                .map_err(|e| RelayError::Transport(format!("invalid block hash {}: {}", h, e)))?,
            _ => return Err(RelayError::Transport(format!("block {} not available", number))),
        };

        let event = BlockEvent { number, hash };
        self.latest.store(Some(Arc::new(event)));
        self.pipeline.on_block(&event);
        metrics::record_block();
        tracing::info!(block_number = number, block_hash = %hash, "Block changed");
        self.events.emit_block(event);
        Ok(Some(event))
    }

    /// Poll until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Block poller started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Block polling failed");
                        self.events.emit_error(e.to_string());
                    }
                }
            }
        }

        tracing::info!("Block poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Chain {
        head: AtomicU64,
    }

    #[async_trait]
    impl Transport for Chain {
        async fn request(&self, method: &str, params: Value) -> RelayResult<Value> {
            match method {
                "eth_blockNumber" => Ok(json!(to_quantity(self.head.load(Ordering::SeqCst)))),
                "eth_getBlockByNumber" => {
                    let n = parse_quantity(&params[0])?;
                    Ok(json!({ "number": params[0], "hash": B256::with_last_byte(n as u8) }))
                }
                _ => Err(RelayError::Transport("unexpected".into())),
            }
        }
    }

    fn poller(chain: Arc<Chain>, events: EventHub) -> BlockPoller {
        BlockPoller::new(
            chain,
            Arc::new(Pipeline::default()),
            events,
            Arc::new(ArcSwapOption::empty()),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_emits_only_new_heads() {
        let chain = Arc::new(Chain { head: AtomicU64::new(5) });
        let events = EventHub::new();
        let mut blocks = events.subscribe_blocks();
        let poller = poller(chain.clone(), events);

        let first = poller.poll_once().await.unwrap().unwrap();
        assert_eq!(first, BlockEvent { number: 5, hash: B256::with_last_byte(5) });
        assert_eq!(poller.poll_once().await.unwrap(), None);

        chain.head.store(6, Ordering::SeqCst);
        assert_eq!(poller.poll_once().await.unwrap().unwrap().number, 6);

        assert_eq!(blocks.recv().await.unwrap().number, 5);
        assert_eq!(blocks.recv().await.unwrap().number, 6);
        assert_eq!(blocks.try_recv(), None);
    }

    struct Down;

    #[async_trait]
    impl Transport for Down {
        async fn request(&self, _method: &str, _params: Value) -> RelayResult<Value> {
            Err(RelayError::Transport("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_failures_reach_error_subscribers() {
        let events = EventHub::new();
        let mut errors = events.subscribe_errors();
        let poller = BlockPoller::new(
            Arc::new(Down),
            Arc::new(Pipeline::default()),
            events,
            Arc::new(ArcSwapOption::empty()),
            Duration::from_millis(10),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(poller.run(rx));

        let event = errors.recv().await.unwrap();
        assert!(event.message.contains("connection refused"));

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
