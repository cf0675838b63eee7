//! Delivery of signed envelopes to the relayer.

use alloy::primitives::B256;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::schema::RelayerConfig;
use crate::error::{RelayError, RelayResult};
use crate::signing::types::MetaTransaction;

/// Hands a sealed envelope to whoever submits it on-chain.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver `envelope` and return the resulting transaction hash.
    async fn publish(&self, envelope: &MetaTransaction) -> RelayResult<B256>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishReply {
    tx_hash: B256,
}

/// POSTs the envelope JSON to the relayer and reads `{"txHash": "0x…"}` back.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    url: Url,
}

impl HttpPublisher {
    pub fn new(config: &RelayerConfig) -> RelayResult<Self> {
        let url = config
            .publish_url
            .parse()
            .map_err(|e| RelayError::Publish(format!("Invalid publish URL '{}': {}", config.publish_url, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, envelope: &MetaTransaction) -> RelayResult<B256> {
        let response = self
            .client
            .post(self.url.clone())
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                // Only a failed connect proves the request never left.
                if e.is_connect() {
                    RelayError::NotDelivered(e.to_string())
                } else {
                    RelayError::Publish(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::NotDelivered(format!("relayer answered {}: {}", status, body)));
        }

        let reply: PublishReply = response
            .json()
            .await
            .map_err(|e| RelayError::Publish(format!("unreadable relayer reply: {}", e)))?;
        Ok(reply.tx_hash)
    }
}
