//! HTTP server exposing the JSON-RPC entry point.
//!
//! # Responsibilities
//! - `POST /`: one JSON-RPC call or a batch, answered by the engine
//! - `GET /health`: liveness plus the latest block seen
//! - Middleware: request ID, body limit, request timeout, tracing

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::Instrument;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::ListenerConfig;
use crate::engine::Engine;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::pipeline::JsonRpcResponse;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// HTTP server for the relay.
pub struct RelayServer {
    router: Router,
    config: ListenerConfig,
}

impl RelayServer {
    pub fn new(config: ListenerConfig, engine: Arc<Engine>) -> Self {
        let router = Self::build_router(&config, AppState { engine });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/", post(rpc_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(
                // Outermost first: the id must exist before tracing sees the request.
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    // The limit layer's body type has no `Default`, so it must wrap the timeout.
                    .layer(RequestBodyLimitLayer::new(config.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn rpc_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = request_id(&headers);

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(request_id = %request_id, error = %e, "Unparseable JSON-RPC body");
            let reply = JsonRpcResponse::protocol_error(Value::Null, -32700, "Parse error");
            return (StatusCode::OK, Json(reply)).into_response();
        }
    };

    let reply = state
        .engine
        .handle_value(payload)
        .instrument(tracing::debug_span!("rpc", request_id = %request_id))
        .await;
    (StatusCode::OK, Json(reply)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let latest = state.engine.latest_block();
    Json(json!({
        "status": "ok",
        "blockNumber": latest.map(|b| b.number),
        "blockHash": latest.map(|b| b.hash),
    }))
}
