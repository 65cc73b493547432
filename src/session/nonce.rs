//! Nonce allocation
//!
//! All submissions for an account go through one allocator so that sessions
//! sharing a signing key never reuse a nonce.

use crate::chain::ChainClient;
use crate::Result;
use alloy::primitives::{Address, B256};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct NonceAllocator {
    /// Last nonce successfully submitted per account
    last_sent: Mutex<HashMap<Address, u64>>,
}

impl NonceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next nonce for `account` and run `send` with it.
    ///
    /// The lock is held across the submission. The nonce is recorded only
    /// when `send` succeeds, so a rejected transaction frees its nonce.
    pub async fn submit<F, Fut>(
        &self,
        chain: &dyn ChainClient,
        account: Address,
        send: F,
    ) -> Result<(u64, B256)>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<B256>>,
    {
        let mut last_sent = self.last_sent.lock().await;
        let pending = chain.get_transaction_count(account).await?;
        let nonce = match last_sent.get(&account) {
            Some(last) => pending.max(last + 1),
            None => pending,
        };

        let hash = send(nonce).await?;
        last_sent.insert(account, nonce);
        tracing::debug!(account = %account, nonce, "Nonce consumed");
        Ok((nonce, hash))
    }

    /// Last nonce recorded for `account`
    pub async fn last_sent(&self, account: Address) -> Option<u64> {
        self.last_sent.lock().await.get(&account).copied()
    }
}
