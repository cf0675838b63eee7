//! Local call simulation.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::RelayResult;
use crate::pipeline::request::JsonRpcRequest;
use crate::pipeline::stage::StageOutcome;

/// Executes read-only calls without touching the remote endpoint.
#[async_trait]
pub trait CallSimulator: Send + Sync {
    /// `eth_call` semantics: `tx` is the call object, `block` the block tag.
    async fn call(&self, tx: &Value, block: &Value) -> RelayResult<Value>;

    /// `eth_estimateGas` semantics.
    async fn estimate_gas(&self, tx: &Value) -> RelayResult<Value>;
}

#[derive(Clone)]
pub struct SimulatorStage {
    simulator: Arc<dyn CallSimulator>,
}

impl SimulatorStage {
    pub fn new(simulator: Arc<dyn CallSimulator>) -> Self {
        Self { simulator }
    }

    pub async fn handle(&self, request: &JsonRpcRequest) -> RelayResult<StageOutcome> {
        let latest = Value::String("latest".to_string());
        let result = match request.method.as_str() {
            "eth_call" => {
                let tx = request.required_param(0)?;
                let block = request.param(1).unwrap_or(&latest);
                self.simulator.call(tx, block).await?
            }
            "eth_estimateGas" => self.simulator.estimate_gas(request.required_param(0)?).await?,
            _ => return Ok(StageOutcome::Forward),
        };
        Ok(StageOutcome::Answer(result))
    }
}

impl std::fmt::Debug for SimulatorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorStage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CallSimulator for Echo {
        async fn call(&self, _tx: &Value, block: &Value) -> RelayResult<Value> {
            Ok(block.clone())
        }

        async fn estimate_gas(&self, _tx: &Value) -> RelayResult<Value> {
            Ok(json!("0x5208"))
        }
    }

    #[tokio::test]
    async fn test_handles_call_and_estimate() {
        let stage = SimulatorStage::new(Arc::new(Echo));
        let call = JsonRpcRequest::new(1, "eth_call", json!([{ "to": "0x00" }]));
        assert_eq!(stage.handle(&call).await.unwrap(), StageOutcome::Answer(json!("latest")));

        let est = JsonRpcRequest::new(2, "eth_estimateGas", json!([{}]));
        assert_eq!(stage.handle(&est).await.unwrap(), StageOutcome::Answer(json!("0x5208")));

        let other = JsonRpcRequest::new(3, "eth_getBalance", json!([]));
        assert_eq!(stage.handle(&other).await.unwrap(), StageOutcome::Forward);
    }
}
