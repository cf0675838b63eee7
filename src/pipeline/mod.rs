//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! JsonRpcRequest
//!     → fixture    (static introspection answers)
//!     → cache      (repeated reads)
//!     → filters    (eth_newFilter & friends)
//!     → nonce      (pending transaction count)
//!     → simulator  (eth_call / eth_estimateGas, optional)
//!     → wallet     (approval → sign → publish)
//!     → transport  (remote JSON-RPC)
//! ```
//!
//! The first stage that answers ends the traversal. Stages passed on the way
//! then observe the answer, last to first, so the cache and the nonce
//! tracker learn from the remote endpoint. A failure ends the traversal too
//! and is reported with the stage that produced it.

pub mod cache;
pub mod filters;
pub mod fixture;
pub mod nonce;
pub mod request;
pub mod simulator;
pub mod stage;
pub mod transport;
pub mod wallet;

use serde_json::Value;
use std::time::Instant;

use crate::engine::events::BlockEvent;
use crate::error::{RelayError, StageError, StageKind};
use crate::observability::metrics;

pub use request::{JsonRpcRequest, JsonRpcResponse};
pub use simulator::CallSimulator;
pub use stage::{RequestState, Stage, StageOutcome};
pub use transport::Transport;

/// Result of one traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub state: RequestState,
    pub result: Result<Value, StageError>,
}

/// Ordered stage chain.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// Run `request` through the stages, front to back, at most once.
    pub async fn process(&self, request: &JsonRpcRequest) -> Processed {
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.handle(request).await {
                Ok(StageOutcome::Forward) => continue,
                Ok(StageOutcome::Answer(result)) => {
                    for earlier in self.stages[..index].iter().rev() {
                        earlier.observe(request, &result);
                    }
                    return Processed {
                        state: stage.answered_state(&request.method),
                        result: Ok(result),
                    };
                }
                Err(source) => {
                    let state = match source {
                        RelayError::NotApproved(_) => RequestState::Rejected,
                        _ => RequestState::Errored,
                    };
                    return Processed {
                        state,
                        result: Err(StageError::new(stage.kind(), source)),
                    };
                }
            }
        }

        Processed {
            state: RequestState::Errored,
            result: Err(StageError::new(
                StageKind::Pipeline,
                RelayError::MethodNotFound(request.method.clone()),
            )),
        }
    }

    /// Process `request` and shape the JSON-RPC response.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let start = Instant::now();
        tracing::debug!(method = %request.method, state = RequestState::Received.as_str(), "Request received");

        let processed = self.process(&request).await;
        metrics::record_request(&request.method, processed.state.as_str(), start);

        match processed.result {
            Ok(result) => {
                tracing::debug!(
                    method = %request.method,
                    state = processed.state.as_str(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request answered"
                );
                JsonRpcResponse::success(request.id, result)
            }
            Err(e) => {
                metrics::record_pipeline_error(e.stage.as_str(), e.source.kind());
                tracing::warn!(
                    method = %request.method,
                    stage = %e.stage,
                    state = processed.state.as_str(),
                    error = %e.source,
                    "Request failed"
                );
                JsonRpcResponse::failure(request.id, &e)
            }
        }
    }

    /// Let the stages react to a new chain head.
    pub fn on_block(&self, block: &BlockEvent) {
        for stage in &self.stages {
            stage.on_block(block);
        }
    }
}
