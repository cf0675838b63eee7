//! Remote JSON-RPC data source, the last stage of the pipeline.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::RelayResult;
use crate::pipeline::request::JsonRpcRequest;
use crate::pipeline::stage::StageOutcome;

/// A remote JSON-RPC endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one call and return its `result`.
    async fn request(&self, method: &str, params: Value) -> RelayResult<Value>;
}

/// Forwards everything that reaches it.
#[derive(Clone)]
pub struct TransportStage {
    transport: Arc<dyn Transport>,
}

impl TransportStage {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn handle(&self, request: &JsonRpcRequest) -> RelayResult<StageOutcome> {
        let result = self.transport.request(&request.method, request.params.clone()).await?;
        Ok(StageOutcome::Answer(result))
    }
}

impl std::fmt::Debug for TransportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportStage").finish_non_exhaustive()
    }
}
