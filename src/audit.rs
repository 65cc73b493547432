//! Audit trail
//!
//! Appends one JSON line per transaction lifecycle event. Write failures are
//! logged and never block the request.

use crate::session::{PendingTransaction, SentTransaction, SessionId, StageOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Serialize)]
struct AuditEntry {
    timestamp: DateTime<Utc>,
    entry_type: &'static str,
    session: String,
    details: Value,
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// JSONL audit log; a log without a path records nothing
pub struct AuditLog {
    writer: Option<Mutex<AuditLogWriter>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Some(Mutex::new(AuditLogWriter { path: path.into() })),
        }
    }

    pub fn disabled() -> Self {
        Self { writer: None }
    }

    async fn record(&self, session: SessionId, entry_type: &'static str, details: Value) {
        let Some(writer) = &self.writer else {
            return;
        };
        let entry = AuditEntry {
            timestamp: Utc::now(),
            entry_type,
            session: session.to_string(),
            details,
        };
        let writer = writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(error = %e, "Failed to write audit log entry");
        }
    }

    pub async fn tx_staged(&self, session: SessionId, pending: &PendingTransaction) {
        let details = json!({
            "purpose": pending.purpose(),
            "trigger_message": pending.trigger_message(),
            "tx": pending.tx(),
        });
        self.record(session, "tx_staged", details).await;
    }

    /// An entry that left the stage unsent (`tx_replaced` or `stage_reset`)
    pub async fn stage_cleared(&self, session: SessionId, outcome: &StageOutcome) {
        let (entry_type, pending) = match outcome {
            StageOutcome::Replaced(pending) => ("tx_replaced", pending),
            StageOutcome::Discarded(pending) => ("stage_reset", pending),
        };
        let details = json!({
            "purpose": pending.purpose(),
            "trigger_message": pending.trigger_message(),
        });
        self.record(session, entry_type, details).await;
    }

    pub async fn tx_sent(&self, session: SessionId, sent: &SentTransaction) {
        let details = json!({
            "purpose": &sent.purpose,
            "tx_hash": sent.hash.to_string(),
            "nonce": sent.nonce,
        });
        self.record(session, "tx_sent", details).await;
    }

    pub async fn tx_failed(&self, session: SessionId, purpose: &str, error: &crate::Error) {
        let details = json!({
            "purpose": purpose,
            "error": error.to_string(),
        });
        self.record(session, "tx_failed", details).await;
    }

    /// Records the refused address; the user only sees a generic refusal
    pub async fn sanctioned_recipient(&self, session: SessionId, address: &str) {
        self.record(session, "sanctioned_recipient", json!({ "address": address }))
            .await;
    }
}
