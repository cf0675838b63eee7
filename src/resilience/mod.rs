//! Resilience subsystem.
//!
//! Every external call (key holder, nonce source, identity resolver, approval
//! gate, publisher, remote transport) has a deadline. Retry policy belongs to
//! the collaborators, not to the relay.

pub mod timeouts;
