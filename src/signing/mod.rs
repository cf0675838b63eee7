//! Signing core.
//!
//! # Data Flow
//! ```text
//! TransactionParams
//!     → assembler.rs (nonce, identity, envelope)
//!         → encoder.rs (canonical packed fields → keccak-256 digest)
//!         → message.rs (raw / personal / typed hashing)
//!             → keys.rs (KeyHolder signs the digest)
//!             → signature.rs (v/r/s → 0x{r}{s}{v})
//!     → MetaTransaction
//! ```

pub mod assembler;
pub mod encoder;
pub mod keys;
pub mod message;
pub mod signature;
pub mod types;

pub use assembler::{IdentityResolver, NonceSource, TransactionAssembler};
pub use keys::{KeyHolder, LocalKeyHolder};
pub use message::MessageSigner;
pub use signature::{concat_sig, split_sig, RawSignature};
pub use types::{Action, MessageParams, MetaTransaction, TransactionParams, TypedMessageParams};
