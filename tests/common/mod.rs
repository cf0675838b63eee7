//! Shared mock collaborators for integration tests.
#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use alloy::signers::Signature;
use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use meta_relay::approval::ApprovalGate;
use meta_relay::config::{CacheConfig, PollingConfig, SigningConfig, TimeoutConfig};
use meta_relay::engine::{Engine, WalletParts};
use meta_relay::error::{RelayError, RelayResult};
use meta_relay::pipeline::Transport;
use meta_relay::relay::Publisher;
use meta_relay::signing::types::{MessageParams, MetaTransaction, TransactionParams, TypedMessageParams};
use meta_relay::signing::{IdentityResolver, KeyHolder, LocalKeyHolder, NonceSource};

pub const ALICE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ALICE: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const BOB: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const TX_HASH: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

pub fn alice() -> Address {
    ALICE.parse().unwrap()
}

/// Remote endpoint answering from a fixed table and logging every call.
#[derive(Default)]
pub struct MockTransport {
    answers: Mutex<HashMap<String, Value>>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, method: &str, result: Value) {
        self.answers.lock().unwrap().insert(method.to_string(), result);
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, method: &str, params: Value) -> RelayResult<Value> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        self.answers
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .ok_or_else(|| RelayError::Transport(format!("no answer for {}", method)))
    }
}

/// Nonce source counting up from `start`, recording releases.
pub struct MockNonces {
    next: AtomicU64,
    pub issued: AtomicUsize,
    pub released: Mutex<Vec<u64>>,
}

impl MockNonces {
    pub fn starting_at(start: u64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU64::new(start),
            issued: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl NonceSource for MockNonces {
    async fn next_nonce(&self, _address: Address) -> RelayResult<u64> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    async fn release(&self, _address: Address, nonce: u64) -> RelayResult<()> {
        self.released.lock().unwrap().push(nonce);
        Ok(())
    }
}

/// Directory answering one fixed name; `None` means the directory is down.
pub struct MockIdentity(pub Option<&'static str>);

#[async_trait]
impl IdentityResolver for MockIdentity {
    async fn username(&self, _address: Address) -> RelayResult<String> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| RelayError::IdentityUnavailable("directory offline".into()))
    }
}

/// Publisher that records envelopes and can be told to fail.
///
/// With `stall_ms` set the envelope is recorded as received before the reply
/// is delayed, like a relayer that accepted it but answers slowly.
#[derive(Default)]
pub struct MockPublisher {
    pub published: Mutex<Vec<MetaTransaction>>,
    pub fail: AtomicBool,
    pub stall_ms: AtomicU64,
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, envelope: &MetaTransaction) -> RelayResult<B256> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::NotDelivered("connection refused".into()));
        }
        self.published.lock().unwrap().push(envelope.clone());
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(stall)).await;
        }
        Ok(TX_HASH.parse().unwrap())
    }
}

/// Approval gate with one fixed verdict, counting consultations.
pub struct MockApproval {
    pub verdict: bool,
    pub asked: AtomicUsize,
}

impl MockApproval {
    pub fn new(verdict: bool) -> Arc<Self> {
        Arc::new(Self { verdict, asked: AtomicUsize::new(0) })
    }

    fn ask(&self) -> RelayResult<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict)
    }
}

#[async_trait]
impl ApprovalGate for MockApproval {
    async fn approve_transaction(&self, _tx: &TransactionParams) -> RelayResult<bool> {
        self.ask()
    }

    async fn approve_message(&self, _msg: &MessageParams) -> RelayResult<bool> {
        self.ask()
    }

    async fn approve_personal_message(&self, _msg: &MessageParams) -> RelayResult<bool> {
        self.ask()
    }

    async fn approve_typed_message(&self, _msg: &TypedMessageParams) -> RelayResult<bool> {
        self.ask()
    }
}

/// Key holder wrapper counting sign requests; `broken` makes every request fail.
pub struct CountingKeys {
    inner: LocalKeyHolder,
    pub signed: AtomicUsize,
    pub broken: bool,
}

impl CountingKeys {
    pub fn alice() -> Arc<Self> {
        let inner = LocalKeyHolder::new();
        inner.add_private_key(ALICE_KEY).unwrap();
        Arc::new(Self { inner, signed: AtomicUsize::new(0), broken: false })
    }

    pub fn broken() -> Arc<Self> {
        let inner = LocalKeyHolder::new();
        inner.add_private_key(ALICE_KEY).unwrap();
        Arc::new(Self { inner, signed: AtomicUsize::new(0), broken: true })
    }
}

#[async_trait]
impl KeyHolder for CountingKeys {
    fn accounts(&self) -> Vec<Address> {
        self.inner.accounts()
    }

    async fn sign_digest(&self, account: Address, digest: B256) -> RelayResult<Signature> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(RelayError::KeyUnavailable("hardware wallet disconnected".into()));
        }
        self.inner.sign_digest(account, digest).await
    }
}

/// All mocks behind one engine.
pub struct Harness {
    pub engine: Engine,
    pub transport: Arc<MockTransport>,
    pub nonces: Arc<MockNonces>,
    pub publisher: Arc<MockPublisher>,
    pub approval: Arc<MockApproval>,
    pub keys: Arc<CountingKeys>,
}

pub struct HarnessOptions {
    pub approve: bool,
    pub keys: Arc<CountingKeys>,
    pub fixtures: Option<meta_relay::config::schema::FixtureConfig>,
    pub polling: PollingConfig,
    pub timeouts: TimeoutConfig,
    pub username: Option<&'static str>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            approve: true,
            keys: CountingKeys::alice(),
            fixtures: None,
            polling: PollingConfig { enabled: false, block_interval_ms: 20 },
            timeouts: TimeoutConfig {
                approval_ms: 500,
                nonce_ms: 500,
                key_holder_ms: 500,
                identity_ms: 500,
                publish_ms: 500,
            },
            username: Some("alice"),
        }
    }
}

pub fn harness(options: HarnessOptions) -> Harness {
    let transport = MockTransport::new();
    let nonces = MockNonces::starting_at(40);
    let publisher = Arc::new(MockPublisher::default());
    let approval = MockApproval::new(options.approve);

    let wallet = WalletParts {
        keys: options.keys.clone(),
        approval: approval.clone(),
        nonces: nonces.clone(),
        identities: Arc::new(MockIdentity(options.username)),
        publisher: publisher.clone(),
    };

    let mut builder = Engine::builder()
        .transport(transport.clone())
        .wallet(wallet)
        .cache(CacheConfig::default())
        .polling(options.polling)
        .timeouts(options.timeouts)
        .signing(SigningConfig::default());
    if let Some(fixtures) = options.fixtures {
        builder = builder.fixtures(fixtures);
    }

    Harness {
        engine: builder.build().unwrap(),
        transport,
        nonces,
        publisher,
        approval,
        keys: options.keys,
    }
}

pub fn send_tx_params() -> Value {
    json!([{
        "from": ALICE,
        "to": BOB,
        "value": "0x64",
        "gasPrice": "0x1",
        "gas": "0x5208",
    }])
}

/// Remote node + relayer in one axum app on an ephemeral port.
///
/// `POST /rpc` answers JSON-RPC from `answers`; `POST /publish` records the
/// envelope and replies with `TX_HASH`.
#[derive(Clone, Default)]
pub struct MockUpstream {
    pub answers: Arc<Mutex<HashMap<String, Value>>>,
    pub envelopes: Arc<Mutex<Vec<Value>>>,
}

pub async fn start_mock_upstream(upstream: MockUpstream) -> SocketAddr {
    async fn rpc(State(state): State<MockUpstream>, Json(call): Json<Value>) -> Json<Value> {
        let method = call["method"].as_str().unwrap_or_default().to_string();
        let answer = state.answers.lock().unwrap().get(&method).cloned();
        Json(match answer {
            Some(result) => json!({ "jsonrpc": "2.0", "id": call["id"], "result": result }),
            None => json!({ "jsonrpc": "2.0", "id": call["id"], "error": { "code": -32601, "message": "method not found" } }),
        })
    }

    async fn publish(State(state): State<MockUpstream>, Json(envelope): Json<Value>) -> Json<Value> {
        state.envelopes.lock().unwrap().push(envelope);
        Json(json!({ "txHash": TX_HASH }))
    }

    let app = Router::new()
        .route("/rpc", post(rpc))
        .route("/publish", post(publish))
        .with_state(upstream);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
