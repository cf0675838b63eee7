//! Relay engine: the pipeline plus its background lifecycle.
//!
//! # Responsibilities
//! - Assemble the stage chain in its fixed order
//! - Accept single and batched JSON-RPC calls from the host
//! - Run the block poller and surface block / error notifications
//!
//! # Data Flow
//! ```text
//! host ── handle() ──▶ Pipeline ──▶ JsonRpcResponse
//!
//! start() ──▶ BlockPoller ── on_block ──▶ Pipeline stages
//!                         ── emit ──────▶ EventHub ──▶ Subscription<BlockEvent>
//!                                                 ──▶ Subscription<ErrorEvent>
//! ```

pub mod events;
pub mod poller;

use arc_swap::ArcSwapOption;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::approval::ApprovalGate;
use crate::config::schema::{CacheConfig, FixtureConfig, PollingConfig, RelayConfig, SigningConfig, TimeoutConfig};
use crate::error::{RelayError, RelayResult};
use crate::lifecycle::Shutdown;
use crate::pipeline::cache::CacheStage;
use crate::pipeline::filters::FilterStage;
use crate::pipeline::fixture::FixtureStage;
use crate::pipeline::nonce::NonceStage;
use crate::pipeline::simulator::SimulatorStage;
use crate::pipeline::transport::TransportStage;
use crate::pipeline::wallet::WalletStage;
use crate::pipeline::{CallSimulator, JsonRpcRequest, JsonRpcResponse, Pipeline, Stage, Transport};
use crate::relay::{DirectoryIdentity, HttpPublisher, HttpTransport, LocalNonceSource, Publisher};
use crate::signing::assembler::{IdentityResolver, NonceSource, TransactionAssembler};
use crate::signing::keys::KeyHolder;
use crate::signing::message::MessageSigner;

pub use events::{BlockEvent, ErrorEvent, EventHub, Subscription};
pub use poller::BlockPoller;

/// Collaborators for the approval + signing stage.
#[derive(Clone)]
pub struct WalletParts {
    pub keys: Arc<dyn KeyHolder>,
    pub approval: Arc<dyn ApprovalGate>,
    pub nonces: Arc<dyn NonceSource>,
    pub identities: Arc<dyn IdentityResolver>,
    pub publisher: Arc<dyn Publisher>,
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    transport: Option<Arc<dyn Transport>>,
    wallet: Option<WalletParts>,
    simulator: Option<Arc<dyn CallSimulator>>,
    fixtures: FixtureConfig,
    cache: CacheConfig,
    polling: PollingConfig,
    timeouts: TimeoutConfig,
    signing: SigningConfig,
}

impl EngineBuilder {
    /// Wire the HTTP collaborators described by `config`.
    pub fn from_config(
        config: &RelayConfig,
        keys: Arc<dyn KeyHolder>,
        approval: Arc<dyn ApprovalGate>,
    ) -> RelayResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.transport)?);
        let wallet = WalletParts {
            keys,
            approval,
            nonces: Arc::new(LocalNonceSource::new(transport.clone())),
            identities: Arc::new(DirectoryIdentity::new(&config.identities)),
            publisher: Arc::new(HttpPublisher::new(&config.relayer)?),
        };

        Ok(Self::default()
            .transport(transport)
            .wallet(wallet)
            .fixtures(config.fixtures.clone())
            .cache(config.cache.clone())
            .polling(config.polling.clone())
            .timeouts(config.timeouts)
            .signing(config.signing))
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn wallet(mut self, wallet: WalletParts) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn simulator(mut self, simulator: Arc<dyn CallSimulator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn fixtures(mut self, fixtures: FixtureConfig) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn signing(mut self, signing: SigningConfig) -> Self {
        self.signing = signing;
        self
    }

    pub fn build(self) -> RelayResult<Engine> {
        let transport = self
            .transport
            .ok_or_else(|| RelayError::Transport("engine requires a transport".to_string()))?;

        let mut stages = vec![Stage::Fixture(FixtureStage::new(self.fixtures))];
        if self.cache.enabled {
            stages.push(Stage::Cache(CacheStage::new(&self.cache)));
        }
        stages.push(Stage::Filter(FilterStage::new(transport.clone())));
        stages.push(Stage::Nonce(NonceStage::new()));
        if let Some(simulator) = self.simulator {
            stages.push(Stage::Simulator(SimulatorStage::new(simulator)));
        }
        if let Some(parts) = self.wallet {
            let signer = MessageSigner::new(parts.keys, self.timeouts.key_holder());
            let assembler =
                TransactionAssembler::new(parts.nonces, signer, parts.identities, self.timeouts, self.signing);
            stages.push(Stage::Wallet(WalletStage::new(
                parts.approval,
                assembler,
                parts.publisher,
                self.timeouts,
            )));
        }
        stages.push(Stage::Transport(TransportStage::new(transport.clone())));

        let pipeline = Pipeline::new(stages);
        tracing::info!(stages = ?pipeline.stage_kinds(), "Pipeline assembled");

        Ok(Engine {
            pipeline: Arc::new(pipeline),
            transport,
            events: EventHub::new(),
            latest: Arc::new(ArcSwapOption::empty()),
            polling: self.polling,
            shutdown: Arc::new(Shutdown::new()),
        })
    }
}

/// The running relay.
#[derive(Clone)]
pub struct Engine {
    pipeline: Arc<Pipeline>,
    transport: Arc<dyn Transport>,
    events: EventHub,
    latest: Arc<ArcSwapOption<BlockEvent>>,
    polling: PollingConfig,
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handle one JSON-RPC call.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        self.pipeline.handle(request).await
    }

    /// Handle a raw JSON-RPC body: a single call or a batch.
    pub async fn handle_value(&self, body: Value) -> Value {
        match body {
            Value::Array(calls) if calls.is_empty() => {
                to_json(JsonRpcResponse::protocol_error(Value::Null, -32600, "Invalid Request: empty batch"))
            }
            Value::Array(calls) => {
                let mut responses = Vec::with_capacity(calls.len());
                for call in calls {
                    responses.push(self.handle_one(call).await);
                }
                Value::Array(responses)
            }
            call => self.handle_one(call).await,
        }
    }

    async fn handle_one(&self, call: Value) -> Value {
        let id = call.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(call) {
            Ok(request) => to_json(self.handle(request).await),
            Err(e) => to_json(JsonRpcResponse::protocol_error(id, -32600, &format!("Invalid Request: {}", e))),
        }
    }

    /// Spawn the block poller. Returns `None` when polling is disabled.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if !self.polling.enabled {
            tracing::info!("Block polling disabled");
            return None;
        }
        let poller = BlockPoller::new(
            self.transport.clone(),
            self.pipeline.clone(),
            self.events.clone(),
            self.latest.clone(),
            Duration::from_millis(self.polling.block_interval_ms),
        );
        Some(tokio::spawn(poller.run(self.shutdown.subscribe())))
    }

    /// Stop background tasks started by [`Engine::start`].
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    pub fn subscribe_blocks(&self) -> Subscription<BlockEvent> {
        self.events.subscribe_blocks()
    }

    pub fn subscribe_errors(&self) -> Subscription<ErrorEvent> {
        self.events.subscribe_errors()
    }

    /// Most recent chain head seen by the poller.
    pub fn latest_block(&self) -> Option<BlockEvent> {
        self.latest.load_full().map(|b| *b)
    }
}

fn to_json(response: JsonRpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pipeline", &self.pipeline)
            .field("polling", &self.polling)
            .finish()
    }
}
