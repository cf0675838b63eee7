//! JSON-RPC client for the remote network endpoint, with failover.
//!
//! # Responsibilities
//! - POST JSON-RPC calls to the primary endpoint, then each failover in order
//! - Bound every attempt with the configured timeout
//! - Return a remote JSON-RPC error as-is without trying other endpoints

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::config::schema::TransportConfig;
use crate::error::{RelayError, RelayResult};
use crate::pipeline::transport::Transport;

/// Remote JSON-RPC transport over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Primary first, then failovers.
    endpoints: Vec<Url>,
    timeout_duration: Duration,
    next_id: Arc<AtomicU64>,
}

enum Attempt {
    Answered(RelayResult<Value>),
    Failed(RelayError),
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> RelayResult<Self> {
        let primary: Url = config
            .rpc_url
            .parse()
            .map_err(|e| RelayError::Transport(format!("Invalid RPC URL '{}': {}", config.rpc_url, e)))?;
        let mut endpoints = vec![primary];

        for url_str in &config.failover_urls {
            match url_str.parse() {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        tracing::info!(rpc_url = %config.rpc_url, failovers = endpoints.len() - 1, "Remote transport initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            endpoints,
            timeout_duration: config.rpc_timeout(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    async fn attempt(&self, url: &Url, body: &Value) -> Attempt {
        let call = async {
            let response = self.client.post(url.clone()).json(body).send().await?;
            response.error_for_status()?.json::<Value>().await
        };
        match timeout(self.timeout_duration, call).await {
            Ok(Ok(reply)) => Attempt::Answered(unwrap_reply(reply)),
            Ok(Err(e)) => Attempt::Failed(RelayError::Transport(e.to_string())),
            Err(_) => Attempt::Failed(RelayError::Timeout {
                operation: "transport",
                after_ms: self.timeout_duration.as_millis() as u64,
            }),
        }
    }
}

/// Split a JSON-RPC reply into its result or error.
fn unwrap_reply(reply: Value) -> RelayResult<Value> {
    if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(RelayError::Transport(format!("remote error {}: {}", code, message)));
    }
    match reply {
        Value::Object(mut obj) => Ok(obj.remove("result").unwrap_or(Value::Null)),
        other => Err(RelayError::Transport(format!("malformed JSON-RPC reply: {}", other))),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> RelayResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let mut last_error = RelayError::Transport("no RPC endpoints configured".to_string());
        for (i, url) in self.endpoints.iter().enumerate() {
            match self.attempt(url, &body).await {
                Attempt::Answered(result) => return result,
                Attempt::Failed(e) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = e;
                }
            }
        }

        match last_error {
            RelayError::Timeout { .. } => Err(last_error),
            e => Err(RelayError::Transport(format!("All RPC providers failed: {}", e))),
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoints", &self.endpoints.iter().map(Url::as_str).collect::<Vec<_>>())
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}
