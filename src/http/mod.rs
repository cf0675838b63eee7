//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request ID)
//!     → server.rs (Axum router, limits, timeout)
//!     → Engine::handle_value (single call or batch)
//!     → JSON-RPC response
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::RelayServer;
