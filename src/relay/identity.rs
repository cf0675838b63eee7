//! Identity directory backed by the `[identities]` config section.

use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::config::schema::IdentityConfig;
use crate::error::{RelayError, RelayResult};
use crate::signing::assembler::IdentityResolver;

#[derive(Debug, Clone)]
pub struct DirectoryIdentity {
    usernames: BTreeMap<Address, String>,
    fallback_to_address: bool,
}

impl DirectoryIdentity {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            usernames: config.usernames.clone(),
            fallback_to_address: config.fallback_to_address,
        }
    }
}

#[async_trait]
impl IdentityResolver for DirectoryIdentity {
    async fn username(&self, address: Address) -> RelayResult<String> {
        if let Some(name) = self.usernames.get(&address) {
            return Ok(name.clone());
        }
        if self.fallback_to_address {
            return Ok(address.to_checksum(None));
        }
        Err(RelayError::IdentityUnavailable(format!("no username registered for {}", address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_fallback() {
        let alice = Address::repeat_byte(0xaa);
        let mut config = IdentityConfig::default();
        config.usernames.insert(alice, "alice".into());

        let directory = DirectoryIdentity::new(&config);
        assert_eq!(directory.username(alice).await.unwrap(), "alice");

        let bob = Address::repeat_byte(0xbb);
        assert_eq!(directory.username(bob).await.unwrap(), bob.to_checksum(None));

        config.fallback_to_address = false;
        let strict = DirectoryIdentity::new(&config);
        assert!(matches!(strict.username(bob).await, Err(RelayError::IdentityUnavailable(_))));
    }
}
