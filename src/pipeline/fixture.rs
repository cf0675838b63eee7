//! Static answers for introspection methods.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::schema::FixtureConfig;
use crate::pipeline::request::JsonRpcRequest;
use crate::pipeline::stage::StageOutcome;

#[derive(Debug, Clone, Default)]
pub struct FixtureStage {
    answers: BTreeMap<String, Value>,
}

impl FixtureStage {
    pub fn new(config: FixtureConfig) -> Self {
        Self { answers: config.0 }
    }

    pub fn handle(&self, request: &JsonRpcRequest) -> StageOutcome {
        match self.answers.get(&request.method) {
            Some(answer) => StageOutcome::Answer(answer.clone()),
            None => StageOutcome::Forward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_fixtures() {
        let stage = FixtureStage::new(FixtureConfig::default());
        let req = JsonRpcRequest::new(1, "eth_mining", json!([]));
        assert_eq!(stage.handle(&req), StageOutcome::Answer(json!(false)));

        let req = JsonRpcRequest::new(2, "eth_blockNumber", json!([]));
        assert_eq!(stage.handle(&req), StageOutcome::Forward);
    }
}
