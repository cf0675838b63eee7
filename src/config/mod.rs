//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → sections handed to the subsystems that own them
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → approval policy swapped atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Private keys never appear in the file; see `signing::keys`

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApprovalConfig, ApprovalMode, CacheConfig, IdentityConfig, ListenerConfig, ObservabilityConfig,
    PollingConfig, RelayConfig, RelayerConfig, SigningConfig, TimeoutConfig, TransportConfig,
};
