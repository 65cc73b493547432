//! Per-chat session state
//!
//! A `Session` is the explicit context every dispatcher handler works on:
//! the session's account, its staging queue and the attestation flag.
//! Sessions are owned by the dispatcher and keyed by `SessionId`.

mod nonce;
mod staging;

pub use nonce::NonceAllocator;
pub use staging::{
    PendingTransaction, SentTransaction, StageOutcome, StagingQueue, SwapRequest, TxPurpose,
};

use crate::wallet::SecureWallet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    wallet: Option<Arc<SecureWallet>>,
    pub staging: StagingQueue,
    pub attestation_pending: bool,
}

impl Session {
    pub fn new(id: SessionId, wallet: Option<Arc<SecureWallet>>) -> Self {
        Self {
            id,
            wallet,
            staging: StagingQueue::new(),
            attestation_pending: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn wallet(&self) -> Option<&Arc<SecureWallet>> {
        self.wallet.as_ref()
    }

    /// Return the session account, creating a random one if there is none.
    /// The bool is true when the account was just created.
    pub fn ensure_wallet(&mut self) -> (Arc<SecureWallet>, bool) {
        if let Some(wallet) = &self.wallet {
            return (wallet.clone(), false);
        }
        let wallet = Arc::new(SecureWallet::random());
        tracing::info!(
            session = %self.id,
            address = %wallet.address(),
            "Generated session account"
        );
        self.wallet = Some(wallet.clone());
        (wallet, true)
    }

    /// Drop staged state; the account is kept
    pub fn reset(&mut self) -> Option<StageOutcome> {
        self.attestation_pending = false;
        self.staging.reset()
    }
}
