//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): JSON-RPC requests by method, outcome
//! - `relay_request_duration_seconds` (histogram): pipeline latency by method
//! - `relay_signatures_total` (counter): signatures produced by kind
//! - `relay_blocks_total` (counter): new blocks observed by the poller
//! - `relay_pipeline_errors_total` (counter): failures by stage and error kind
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when `init_metrics` is never called.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Methods reported under their own label; anything else is `other`.
const KNOWN_METHODS: &[&str] = &[
    "web3_clientVersion",
    "web3_sha3",
    "net_version",
    "net_listening",
    "eth_chainId",
    "eth_syncing",
    "eth_mining",
    "eth_hashrate",
    "eth_gasPrice",
    "eth_blockNumber",
    "eth_getBalance",
    "eth_getStorageAt",
    "eth_getCode",
    "eth_getTransactionCount",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getBlockTransactionCountByHash",
    "eth_getBlockTransactionCountByNumber",
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
    "eth_getLogs",
    "eth_call",
    "eth_estimateGas",
    "eth_newFilter",
    "eth_newBlockFilter",
    "eth_newPendingTransactionFilter",
    "eth_getFilterChanges",
    "eth_getFilterLogs",
    "eth_uninstallFilter",
    "eth_accounts",
    "eth_coinbase",
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

/// Bounded label for `method`.
pub fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS.iter().copied().find(|m| *m == method).unwrap_or("other")
}

/// Record a completed JSON-RPC request.
pub fn record_request(method: &str, outcome: &'static str, start: Instant) {
    let method = method_label(method);
    counter!("relay_requests_total", "method" => method, "outcome" => outcome).increment(1);
    histogram!("relay_request_duration_seconds", "method" => method).record(start.elapsed().as_secs_f64());
}

/// Record a signature produced by the message signer.
pub fn record_signature(kind: &'static str) {
    counter!("relay_signatures_total", "kind" => kind).increment(1);
}

/// Record a new block observed by the poller.
pub fn record_block() {
    counter!("relay_blocks_total").increment(1);
}

/// Record a request failure attributed to a pipeline stage.
pub fn record_pipeline_error(stage: &'static str, kind: &'static str) {
    counter!("relay_pipeline_errors_total", "stage" => stage, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_label_is_bounded() {
        assert_eq!(method_label("eth_sendTransaction"), "eth_sendTransaction");
        assert_eq!(method_label("personal_sign"), "personal_sign");
        assert_eq!(method_label("eth_madeUp_1234"), "other");
        assert_eq!(method_label(""), "other");
    }
}
