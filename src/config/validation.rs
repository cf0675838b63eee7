//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and URLs. Every
//! problem found is returned, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::RelayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `transport.rpc_url`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than zero"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than zero"));
    }

    check_url(&mut errors, "transport.rpc_url", &config.transport.rpc_url);
    for (i, url) in config.transport.failover_urls.iter().enumerate() {
        check_url(&mut errors, &format!("transport.failover_urls[{}]", i), url);
    }
    check_nonzero(&mut errors, "transport.rpc_timeout_ms", config.transport.rpc_timeout_ms);

    check_url(&mut errors, "relayer.publish_url", &config.relayer.publish_url);

    let t = &config.timeouts;
    check_nonzero(&mut errors, "timeouts.approval_ms", t.approval_ms);
    check_nonzero(&mut errors, "timeouts.nonce_ms", t.nonce_ms);
    check_nonzero(&mut errors, "timeouts.key_holder_ms", t.key_holder_ms);
    check_nonzero(&mut errors, "timeouts.identity_ms", t.identity_ms);
    check_nonzero(&mut errors, "timeouts.publish_ms", t.publish_ms);

    if config.polling.enabled {
        check_nonzero(&mut errors, "polling.block_interval_ms", config.polling.block_interval_ms);
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than zero when the cache is enabled"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(field, format!("unsupported scheme '{}'", url.scheme()))),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}
