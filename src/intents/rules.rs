//! Offline keyword grammar
//!
//! Understands the command shapes the agent documents, e.g.
//! `send 1.5 FLR to 0x…`, `swap 10 FLR for USDT with 1% slippage`,
//! `price of FLR in USDT`, `liquidity FLR/USDT`, `is 0x… sanctioned`.

use super::{IntentClassifier, ParameterExtractor, RouteLabel, SwapParams, TransferParams};
use crate::units::parse_amount;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Words that join the two tokens of a pair
const PAIR_CONNECTORS: [&str; 6] = ["to", "for", "in", "into", "vs", "and"];

#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedIntents;

impl RuleBasedIntents {
    pub fn new() -> Self {
        Self
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|w| w.trim_end_matches(['.', ',', '!', '?', ';', ':']))
        .filter(|w| !w.is_empty())
        .collect()
}

fn amount_of(word: &str) -> Option<Decimal> {
    parse_amount(word).ok()
}

fn slippage_of(words: &[&str]) -> Option<Decimal> {
    words
        .iter()
        .find_map(|w| w.strip_suffix('%'))
        .and_then(amount_of)
}

fn classify_text(text: &str) -> RouteLabel {
    let lower = text.to_lowercase();
    let words = words(&lower);
    let first = words.first().copied().unwrap_or_default();
    let has = |needle: &str| lower.contains(needle);

    if has("attest") {
        RouteLabel::RequestAttestation
    } else if has("sanction") {
        RouteLabel::CheckSanctions
    } else if has("liquidity") || has("reserves") {
        RouteLabel::CheckLiquidity
    } else if (has("account") || has("wallet"))
        && ["create", "generate", "new", "make", "open"]
            .iter()
            .any(|verb| has(verb))
    {
        RouteLabel::GenerateAccount
    } else if matches!(first, "send" | "transfer" | "pay") {
        RouteLabel::SendToken
    } else if matches!(first, "swap" | "trade" | "exchange" | "convert") {
        RouteLabel::TokenSwap
    } else if has("price") || has("quote") || has("rate") || has("worth") {
        RouteLabel::PriceQuote
    } else {
        RouteLabel::Conversation
    }
}

#[async_trait]
impl IntentClassifier for RuleBasedIntents {
    async fn classify(&self, text: &str) -> RouteLabel {
        classify_text(text)
    }
}

#[async_trait]
impl ParameterExtractor for RuleBasedIntents {
    async fn transfer(&self, text: &str) -> Option<TransferParams> {
        let words = words(text);
        let amount = words.iter().find_map(|w| amount_of(w))?;
        let to = words.iter().find(|w| w.starts_with("0x"))?;
        Some(TransferParams {
            to: to.to_string(),
            amount,
        })
    }

    async fn swap(&self, text: &str) -> Option<SwapParams> {
        let words = words(text);
        let at = words.iter().position(|w| amount_of(w).is_some())?;
        let amount = amount_of(words[at])?;
        let from = words.get(at + 1)?;
        let connector = words.get(at + 2)?.to_lowercase();
        if !["to", "for", "into"].contains(&connector.as_str()) {
            return None;
        }
        let to = words.get(at + 3)?;
        Some(SwapParams {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            slippage_percent: slippage_of(&words),
        })
    }

    async fn token_pair(&self, text: &str) -> Option<(String, String)> {
        let words = words(text);
        if let Some((a, b)) = words.iter().find_map(|w| w.split_once('/')) {
            if !a.is_empty() && !b.is_empty() {
                return Some((a.to_string(), b.to_string()));
            }
        }
        let at = words
            .iter()
            .rposition(|w| PAIR_CONNECTORS.contains(&w.to_lowercase().as_str()))?;
        let from = words.get(at.checked_sub(1)?)?;
        let to = words.get(at + 1)?;
        Some((from.to_string(), to.to_string()))
    }

    async fn address(&self, text: &str) -> Option<String> {
        words(text)
            .into_iter()
            .find(|w| w.starts_with("0x"))
            .map(str::to_string)
    }
}
