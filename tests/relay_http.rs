//! Engine wired from config against a live upstream node and relayer.

mod common;

use common::*;
use meta_relay::approval::PolicyGate;
use meta_relay::config::schema::{ApprovalConfig, ApprovalMode};
use meta_relay::config::RelayConfig;
use meta_relay::signing::LocalKeyHolder;
use meta_relay::EngineBuilder;
use meta_relay::Engine;
use serde_json::json;
use std::sync::Arc;

fn config_for(rpc_url: String, failover: Vec<String>, publish_url: String) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.transport.rpc_url = rpc_url;
    config.transport.failover_urls = failover;
    config.transport.rpc_timeout_ms = 2_000;
    config.relayer.publish_url = publish_url;
    config.polling.enabled = false;
    config.identities.usernames.insert(alice(), "alice".to_string());
    config
}

fn engine_for(config: &RelayConfig) -> Engine {
    let keys = LocalKeyHolder::new();
    keys.add_private_key(ALICE_KEY).unwrap();
    let approval = PolicyGate::new(ApprovalConfig { mode: ApprovalMode::ApproveAll, ..ApprovalConfig::default() });
    EngineBuilder::from_config(config, Arc::new(keys), Arc::new(approval))
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_send_transaction_reaches_relayer() {
    let upstream = MockUpstream::default();
    upstream.answers.lock().unwrap().insert("eth_getTransactionCount".into(), json!("0x5"));
    let addr = start_mock_upstream(upstream.clone()).await;

    let config = config_for(format!("http://{}/rpc", addr), vec![], format!("http://{}/publish", addr));
    let engine = engine_for(&config);

    let first = engine.handle_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_sendTransaction", "params": send_tx_params() })).await;
    assert_eq!(first["result"], TX_HASH);
    let second = engine.handle_value(json!({ "jsonrpc": "2.0", "id": 2, "method": "eth_sendTransaction", "params": send_tx_params() })).await;
    assert_eq!(second["result"], TX_HASH);

    let envelopes = upstream.envelopes.lock().unwrap();
    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0]["action"], "sendTransaction");
    assert_eq!(envelopes[0]["username"], "alice");
    assert_eq!(envelopes[0]["params"]["nonce"], 5);
    assert_eq!(envelopes[1]["params"]["nonce"], 6);
    assert_ne!(envelopes[0]["signature"], envelopes[1]["signature"]);
}

#[tokio::test]
async fn test_remote_error_is_passed_through() {
    let addr = start_mock_upstream(MockUpstream::default()).await;
    let config = config_for(format!("http://{}/rpc", addr), vec![], format!("http://{}/publish", addr));
    let engine = engine_for(&config);

    let reply = engine.handle_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_unknown" })).await;
    assert_eq!(reply["error"]["data"]["stage"], "transport");
    assert!(reply["error"]["message"].as_str().unwrap().contains("method not found"));
}

#[tokio::test]
async fn test_failover_to_second_endpoint() {
    let upstream = MockUpstream::default();
    upstream.answers.lock().unwrap().insert("eth_chainId".into(), json!("0x7a69"));
    let addr = start_mock_upstream(upstream).await;

    // Reserve a port and close it so the primary refuses connections.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let config = config_for(
        format!("http://{}/rpc", dead_addr),
        vec![format!("http://{}/rpc", addr)],
        format!("http://{}/publish", addr),
    );
    let engine = engine_for(&config);

    let reply = engine.handle_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_chainId" })).await;
    assert_eq!(reply["result"], "0x7a69");
}

#[tokio::test]
async fn test_unreachable_relayer_is_not_delivered() {
    let upstream = MockUpstream::default();
    upstream.answers.lock().unwrap().insert("eth_getTransactionCount".into(), json!("0x5"));
    let addr = start_mock_upstream(upstream).await;

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let config = config_for(format!("http://{}/rpc", addr), vec![], format!("http://{}/publish", dead_addr));
    let engine = engine_for(&config);

    let reply = engine.handle_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_sendTransaction", "params": send_tx_params() })).await;
    assert_eq!(reply["error"]["code"], -32004);
    assert_eq!(reply["error"]["data"]["kind"], "not_delivered");
}
