//! Tagged stage dispatch.

use serde_json::Value;

use crate::engine::events::BlockEvent;
use crate::error::{RelayResult, StageKind};
use crate::pipeline::cache::CacheStage;
use crate::pipeline::filters::FilterStage;
use crate::pipeline::fixture::FixtureStage;
use crate::pipeline::nonce::NonceStage;
use crate::pipeline::request::JsonRpcRequest;
use crate::pipeline::simulator::SimulatorStage;
use crate::pipeline::transport::TransportStage;
use crate::pipeline::wallet::WalletStage;

/// What a stage did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Terminal answer; later stages never see the request.
    Answer(Value),
    /// Pass the request unchanged to the next stage.
    Forward,
}

/// Where a request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    StaticAnswered,
    CacheAnswered,
    FilterAnswered,
    NonceAnswered,
    SimulatedAnswered,
    AccountsAnswered,
    ApprovalPending,
    Signed,
    Published,
    RemoteAnswered,
    Rejected,
    Errored,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::StaticAnswered => "static_answered",
            RequestState::CacheAnswered => "cache_answered",
            RequestState::FilterAnswered => "filter_answered",
            RequestState::NonceAnswered => "nonce_answered",
            RequestState::SimulatedAnswered => "simulated_answered",
            RequestState::AccountsAnswered => "accounts_answered",
            RequestState::ApprovalPending => "approval_pending",
            RequestState::Signed => "signed",
            RequestState::Published => "published",
            RequestState::RemoteAnswered => "remote_answered",
            RequestState::Rejected => "rejected",
            RequestState::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Received | RequestState::ApprovalPending)
    }
}

/// One pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Fixture(FixtureStage),
    Cache(CacheStage),
    Filter(FilterStage),
    Nonce(NonceStage),
    Simulator(SimulatorStage),
    Wallet(WalletStage),
    Transport(TransportStage),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Fixture(_) => StageKind::Fixture,
            Stage::Cache(_) => StageKind::Cache,
            Stage::Filter(_) => StageKind::Filter,
            Stage::Nonce(_) => StageKind::Nonce,
            Stage::Simulator(_) => StageKind::Simulator,
            Stage::Wallet(_) => StageKind::Wallet,
            Stage::Transport(_) => StageKind::Transport,
        }
    }

    pub async fn handle(&self, request: &JsonRpcRequest) -> RelayResult<StageOutcome> {
        match self {
            Stage::Fixture(s) => Ok(s.handle(request)),
            Stage::Cache(s) => Ok(s.handle(request)),
            Stage::Filter(s) => s.handle(request).await,
            Stage::Nonce(s) => Ok(s.handle(request)),
            Stage::Simulator(s) => s.handle(request).await,
            Stage::Wallet(s) => s.handle(request).await,
            Stage::Transport(s) => s.handle(request).await,
        }
    }

    /// Called, in reverse order, for each stage a request passed through
    /// once a later stage answered it.
    pub fn observe(&self, request: &JsonRpcRequest, result: &Value) {
        match self {
            Stage::Cache(s) => s.observe(request, result),
            Stage::Filter(s) => s.observe(request, result),
            Stage::Nonce(s) => s.observe(request, result),
            _ => {}
        }
    }

    pub fn on_block(&self, block: &BlockEvent) {
        match self {
            Stage::Cache(s) => s.on_block(),
            Stage::Filter(s) => s.on_block(block),
            Stage::Nonce(s) => s.on_block(),
            _ => {}
        }
    }

    /// State of a request this stage answered.
    pub fn answered_state(&self, method: &str) -> RequestState {
        match self {
            Stage::Fixture(_) => RequestState::StaticAnswered,
            Stage::Cache(_) => RequestState::CacheAnswered,
            Stage::Filter(_) => RequestState::FilterAnswered,
            Stage::Nonce(_) => RequestState::NonceAnswered,
            Stage::Simulator(_) => RequestState::SimulatedAnswered,
            Stage::Wallet(_) => WalletStage::answered_state(method),
            Stage::Transport(_) => RequestState::RemoteAnswered,
        }
    }
}
