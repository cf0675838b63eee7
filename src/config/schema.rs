//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Host-facing JSON-RPC listener.
    pub listener: ListenerConfig,

    /// Remote JSON-RPC network endpoint.
    pub transport: TransportConfig,

    /// Relayer that receives signed envelopes.
    pub relayer: RelayerConfig,

    /// Per suspension point timeouts.
    pub timeouts: TimeoutConfig,

    /// Transaction signing behaviour.
    pub signing: SigningConfig,

    /// Block polling.
    pub polling: PollingConfig,

    /// Static answers keyed by method name.
    pub fixtures: FixtureConfig,

    /// Response cache.
    pub cache: CacheConfig,

    /// Approval policy (hot reloadable).
    pub approval: ApprovalConfig,

    /// Account display names.
    pub identities: IdentityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8545").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8545".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 120,
        }
    }
}

/// Remote JSON-RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs, tried in order.
    pub failover_urls: Vec<String>,

    /// Per-call timeout in milliseconds.
    pub rpc_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://testrpc.metamask.io/".to_string(),
            failover_urls: Vec::new(),
            rpc_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Relayer (publisher) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayerConfig {
    /// URL receiving `POST`ed meta-transaction envelopes.
    pub publish_url: String,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            publish_url: "http://127.0.0.1:9000/transactions".to_string(),
        }
    }
}

/// Timeouts for each external call, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Approval gate decision.
    pub approval_ms: u64,

    /// Nonce source query.
    pub nonce_ms: u64,

    /// Key-holder signing request.
    pub key_holder_ms: u64,

    /// Identity resolver query.
    pub identity_ms: u64,

    /// Publisher delivery.
    pub publish_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            approval_ms: 60_000,
            nonce_ms: 10_000,
            key_holder_ms: 10_000,
            identity_ms: 5_000,
            publish_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn approval(&self) -> Duration {
        Duration::from_millis(self.approval_ms)
    }

    pub fn nonce(&self) -> Duration {
        Duration::from_millis(self.nonce_ms)
    }

    pub fn key_holder(&self) -> Duration {
        Duration::from_millis(self.key_holder_ms)
    }

    pub fn identity(&self) -> Duration {
        Duration::from_millis(self.identity_ms)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_millis(self.publish_ms)
    }
}

/// Transaction signing behaviour.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SigningConfig {
    /// Hold a per-account lock across nonce acquisition and hashing.
    pub serialize_per_account: bool,

    /// Hand unused nonces back to the nonce source on downstream failure.
    pub release_unused_nonce: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            serialize_per_account: true,
            release_unused_nonce: true,
        }
    }
}

/// Block polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Poll for new blocks in the background.
    pub enabled: bool,

    /// Polling interval in milliseconds.
    pub block_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_interval_ms: 4_000,
        }
    }
}

/// Static method answers served before anything else.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct FixtureConfig(pub BTreeMap<String, Value>);

impl Default for FixtureConfig {
    fn default() -> Self {
        let mut fixtures = BTreeMap::new();
        fixtures.insert(
            "web3_clientVersion".to_string(),
            json!(concat!("MetaRelay/v", env!("CARGO_PKG_VERSION"), "/rust")),
        );
        fixtures.insert("net_listening".to_string(), json!(true));
        fixtures.insert("eth_hashrate".to_string(), json!("0x00"));
        fixtures.insert("eth_mining".to_string(), json!(false));
        fixtures.insert("eth_syncing".to_string(), json!(true));
        Self(fixtures)
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache stage.
    pub enabled: bool,

    /// Maximum cached entries; inserts beyond this are skipped.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

/// How the approval gate decides.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    ApproveAll,
    DenyAll,
    Policy,
}

/// Approval policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalConfig {
    pub mode: ApprovalMode,

    /// Accounts allowed to sign; empty means any account.
    pub allowed_accounts: Vec<Address>,

    /// Largest transaction value (wei) approved in policy mode.
    pub max_value: Option<U256>,

    /// Allow `eth_sign` over raw data.
    pub allow_raw_messages: bool,

    /// Allow `personal_sign`.
    pub allow_personal_messages: bool,

    /// Allow `eth_signTypedData*`.
    pub allow_typed_messages: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::Policy,
            allowed_accounts: Vec::new(),
            max_value: None,
            // Raw digests are unreadable to a human approver.
            allow_raw_messages: false,
            allow_personal_messages: true,
            allow_typed_messages: true,
        }
    }
}

/// Account display names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Address → username.
    pub usernames: BTreeMap<Address, String>,

    /// Use the checksummed address when no username is registered.
    pub fallback_to_address: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            usernames: BTreeMap::new(),
            fallback_to_address: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
