//! Error types for the DeFi agent core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("No liquidity for {0}")]
    NoLiquidity(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Token {0} is the native asset and cannot be approved")]
    NotApprovable(String),

    #[error("Insufficient allowance for {token}: have {current}, need {required}")]
    InsufficientAllowance {
        token: String,
        current: String,
        required: String,
    },

    #[error("RPC call timed out: {0}")]
    RpcTimeout(String),

    #[error("Transaction rejected: {0}")]
    RpcRejected(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Recipient is not allowed")]
    SanctionedRecipient(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Blocked: {0}")]
    Blocked(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Validation failures are terminal for the current message: nothing is
    /// staged and nothing is retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InvalidAddress(_)
                | Error::UnknownToken(_)
                | Error::InvalidArgument(_)
        )
    }

    /// Errors worth retrying for read-only RPC calls.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RpcTimeout(_) | Error::Rpc(_) | Error::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
