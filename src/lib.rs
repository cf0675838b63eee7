//! Signing-and-relay bridge for meta-transactions.
//!
//! Requests enter as JSON-RPC, flow through an ordered stage pipeline, and
//! signing requests are approved, hashed, signed and sealed into a
//! meta-transaction envelope before being handed to a relayer.

// Signing core
pub mod approval;
pub mod error;
pub mod signing;

// Request flow
pub mod engine;
pub mod http;
pub mod pipeline;
pub mod relay;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::RelayConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{RelayError, RelayResult, StageError};
pub use http::RelayServer;
pub use lifecycle::Shutdown;
