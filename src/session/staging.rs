//! Transaction staging queue
//!
//! Holds at most one built, unsent transaction bound to the literal message
//! that produced it. Sending requires the user to repeat that message
//! exactly. Despite the name only the most recent stage is confirmable.

use super::NonceAllocator;
use crate::chain::ChainClient;
use crate::dex::TxRequest;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::B256;
use rust_decimal::Decimal;
use serde::Serialize;

/// Swap parameters carried by an approval until its follow-up swap is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub slippage_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxPurpose {
    Transfer,
    Swap,
    /// First half of approve-then-swap
    Approval { follow_up: SwapRequest },
}

impl TxPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            TxPurpose::Transfer => "transfer",
            TxPurpose::Swap => "swap",
            TxPurpose::Approval { .. } => "approval",
        }
    }
}

/// A staged transaction. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    trigger_message: String,
    tx: TxRequest,
    purpose: TxPurpose,
}

impl PendingTransaction {
    pub fn trigger_message(&self) -> &str {
        &self.trigger_message
    }

    pub fn tx(&self) -> &TxRequest {
        &self.tx
    }

    pub fn purpose(&self) -> &TxPurpose {
        &self.purpose
    }
}

/// What happened to an entry that left the stage without being sent
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// Displaced by a newer `stage`
    Replaced(PendingTransaction),
    /// Cleared by `reset`
    Discarded(PendingTransaction),
}

/// Result of a successful broadcast
#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub hash: B256,
    pub nonce: u64,
    pub trigger_message: String,
    pub purpose: TxPurpose,
}

#[derive(Debug, Default)]
pub struct StagingQueue {
    pending: Option<PendingTransaction>,
}

impl StagingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `tx` under `message`, displacing any previous entry
    pub fn stage(
        &mut self,
        message: impl Into<String>,
        tx: TxRequest,
        purpose: TxPurpose,
    ) -> Option<StageOutcome> {
        let entry = PendingTransaction {
            trigger_message: message.into(),
            tx,
            purpose,
        };
        self.pending.replace(entry).map(StageOutcome::Replaced)
    }

    /// Exact, case-sensitive, untrimmed match against the staged trigger.
    /// A miss leaves the stage untouched.
    pub fn confirm_if_matches(&self, message: &str) -> Option<&PendingTransaction> {
        self.pending
            .as_ref()
            .filter(|pending| pending.trigger_message == message)
    }

    pub fn pending(&self) -> Option<&PendingTransaction> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    /// Sign and broadcast the staged transaction exactly once.
    ///
    /// The entry is removed before anything else happens: success, rejection
    /// and timeout all leave the stage empty.
    pub async fn send_staged(
        &mut self,
        chain: &dyn ChainClient,
        wallet: &SecureWallet,
        nonces: &NonceAllocator,
    ) -> Result<SentTransaction> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| Error::InvalidArgument("no transaction is staged".to_string()))?;

        let tx = &pending.tx;
        let (nonce, hash) = nonces
            .submit(chain, wallet.address(), |nonce| async move {
                let (raw, _) = wallet.sign_transaction(tx, nonce)?;
                chain.send_raw_transaction(raw).await
            })
            .await?;

        tracing::info!(
            tx_hash = %hash,
            nonce,
            purpose = pending.purpose.label(),
            "Transaction submitted"
        );
        Ok(SentTransaction {
            hash,
            nonce,
            trigger_message: pending.trigger_message,
            purpose: pending.purpose,
        })
    }

    /// Unconditionally clear the stage
    pub fn reset(&mut self) -> Option<StageOutcome> {
        self.pending.take().map(StageOutcome::Discarded)
    }
}
