//! Collaborators the relay talks to over the network or config.
//!
//! - `client.rs`: remote JSON-RPC transport with failover
//! - `publisher.rs`: envelope delivery to the relayer
//! - `nonce.rs`: per-account nonce counter seeded from the remote endpoint
//! - `identity.rs`: address → username directory

pub mod client;
pub mod identity;
pub mod nonce;
pub mod publisher;

pub use client::HttpTransport;
pub use identity::DirectoryIdentity;
pub use nonce::LocalNonceSource;
pub use publisher::{HttpPublisher, Publisher};
