//! Lifecycle management.
//!
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build engine → Start poller → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → stop accepting → stop poller → exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
