//! Recipient screening
//!
//! The trade builder consults a `SanctionsScreen` before building any
//! transfer. A positive answer, or a screen that cannot answer, blocks the
//! transfer.

use crate::{Error, Result};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait SanctionsScreen: Send + Sync {
    async fn is_sanctioned(&self, address: Address) -> Result<bool>;
}

/// Static denylist loaded from configuration
#[derive(Debug, Default)]
pub struct DenylistScreen {
    denied: HashSet<Address>,
}

impl DenylistScreen {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            denied: addresses.into_iter().collect(),
        }
    }

    /// Parse configured address strings
    pub fn from_config(entries: &[String]) -> Result<Self> {
        let denied = entries
            .iter()
            .map(|entry| {
                entry
                    .trim()
                    .parse::<Address>()
                    .map_err(|e| Error::Config(format!("invalid sanctions entry {}: {}", entry, e)))
            })
            .collect::<Result<HashSet<_>>>()?;
        Ok(Self { denied })
    }

    pub fn len(&self) -> usize {
        self.denied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }
}

#[async_trait]
impl SanctionsScreen for DenylistScreen {
    async fn is_sanctioned(&self, address: Address) -> Result<bool> {
        Ok(self.denied.contains(&address))
    }
}
