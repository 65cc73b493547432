//! Intent classification and parameter extraction
//!
//! The dispatcher consumes these through narrow traits so the natural
//! language side can be swapped out. Two classifiers ship with the crate:
//! an offline keyword grammar and a thin HTTP client for a remote model.

mod http;
mod rules;

pub use http::HttpIntentClassifier;
pub use rules::RuleBasedIntents;

use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Routes the dispatcher knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteLabel {
    GenerateAccount,
    SendToken,
    TokenSwap,
    PriceQuote,
    RequestAttestation,
    CheckLiquidity,
    CheckSanctions,
    Conversation,
}

impl RouteLabel {
    pub const ALL: [RouteLabel; 8] = [
        RouteLabel::GenerateAccount,
        RouteLabel::SendToken,
        RouteLabel::TokenSwap,
        RouteLabel::PriceQuote,
        RouteLabel::RequestAttestation,
        RouteLabel::CheckLiquidity,
        RouteLabel::CheckSanctions,
        RouteLabel::Conversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::GenerateAccount => "GENERATE_ACCOUNT",
            RouteLabel::SendToken => "SEND_TOKEN",
            RouteLabel::TokenSwap => "TOKEN_SWAP",
            RouteLabel::PriceQuote => "PRICE_QUOTE",
            RouteLabel::RequestAttestation => "REQUEST_ATTESTATION",
            RouteLabel::CheckLiquidity => "CHECK_LIQUIDITY",
            RouteLabel::CheckSanctions => "CHECK_SANCTIONS",
            RouteLabel::Conversation => "CONVERSATION",
        }
    }

    /// Parse a label, falling back to `Conversation` for anything unknown
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|route| route.as_str().eq_ignore_ascii_case(label))
            .unwrap_or(RouteLabel::Conversation)
    }
}

impl std::fmt::Display for RouteLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{to, amount}` of a native transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferParams {
    /// Unvalidated; the trade builder enforces the address format
    pub to: String,
    pub amount: Decimal,
}

/// `{from, to, amount}` of a swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    /// Explicit slippage in percent, when the user gave one
    pub slippage_percent: Option<Decimal>,
}

/// Maps free text to a route. Never fails: unknown input is `Conversation`.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> RouteLabel;
}

/// Pulls structured parameters out of a message. `None` means the message
/// did not carry enough information and the user should be asked again.
#[async_trait]
pub trait ParameterExtractor: Send + Sync {
    async fn transfer(&self, text: &str) -> Option<TransferParams>;
    async fn swap(&self, text: &str) -> Option<SwapParams>;
    async fn token_pair(&self, text: &str) -> Option<(String, String)>;
    async fn address(&self, text: &str) -> Option<String>;
}

/// Remote attestation collaborator
#[async_trait]
pub trait Attestor: Send + Sync {
    /// Produce an attestation token bound to the given nonces
    async fn attest(&self, nonces: &[String]) -> Result<String>;
}

/// Free-form reply generation for conversational messages
#[async_trait]
pub trait Conversation: Send + Sync {
    async fn reply(&self, text: &str) -> Result<String>;
}
